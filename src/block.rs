//! Block and block header data model, plus the merkle root and block-hash
//! helpers the mining and RPC layers build on.
//!
//! Consensus validation (timestamp rules, difficulty retargeting, the auxPoW
//! proof format itself) is out of scope — see the crate-level Non-goals. This
//! module only carries the shapes and the canonical hash, matching how the
//! teacher's own `v1::block` module separates data from verification
//! (`v1::block_verify`).

use serde::{Deserialize, Serialize};

use crate::hash::Hash256;
use crate::tx::encode::{read_u32, read_var_bytes, write_u32, write_var_bytes, Cursor, Decode, Encode, EncodeResult};
use crate::tx::Transaction;

/// A block header with a detached, opaque auxPoW proof blob. The proof's own
/// wire format (merge-mining coinbase branch, parent block header) is an
/// external collaborator's concern; this crate only needs to carry it and
/// know whether it's present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub height: u32,
    pub nonce: u32,
    /// Empty until a submission seals the template with a solved auxPoW proof.
    pub aux_pow: Vec<u8>,
}

impl BlockHeader {
    /// Encodes every field but `aux_pow` — the pre-seal form a template is
    /// hashed and cached under.
    fn encode_unsealed(&self, out: &mut Vec<u8>) {
        write_u32(out, self.version);
        self.prev_block_hash.0.encode(out);
        self.merkle_root.0.encode(out);
        write_u32(out, self.timestamp);
        write_u32(out, self.bits);
        write_u32(out, self.height);
        write_u32(out, self.nonce);
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.encode_unsealed(out);
        write_var_bytes(out, &self.aux_pow);
    }

    pub fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(BlockHeader {
            version: read_u32(cur)?,
            prev_block_hash: Hash256(<[u8; 32]>::decode(cur)?),
            merkle_root: Hash256(<[u8; 32]>::decode(cur)?),
            timestamp: read_u32(cur)?,
            bits: read_u32(cur)?,
            height: read_u32(cur)?,
            nonce: read_u32(cur)?,
            aux_pow: read_var_bytes(cur)?,
        })
    }

    /// Double-SHA256 of the pre-seal encoding. This is the hash templates are
    /// keyed by in the aux block cache, and the hash a solved auxPoW proof is
    /// checked against.
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode_unsealed(&mut buf);
        Hash256::sha256d(&buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn get_txn(&self, hash: Hash256) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.txid() == hash)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.header.encode(&mut out);
        crate::tx::encode::encode_vec(&self.transactions, &mut out);
        out
    }

    pub fn from_bytes(data: &[u8]) -> EncodeResult<Block> {
        let mut cur = Cursor::new(data);
        let header = BlockHeader::decode(&mut cur)?;
        let transactions = crate::tx::encode::decode_vec(&mut cur)?;
        Ok(Block { header, transactions })
    }
}

/// Bitcoin-style merkle root: pairwise double-SHA256, duplicating the last
/// hash when a level has an odd count. Coinbase-only blocks (one leaf) yield
/// that leaf's own hash, matching the teacher's genesis block convention.
pub fn merkle_root(txids: &[Hash256]) -> Hash256 {
    assert!(!txids.is_empty(), "merkle_root of empty transaction list");

    let mut level: Vec<Hash256> = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(&pair[0].0);
                buf.extend_from_slice(&pair[1].0);
                Hash256::sha256d(&buf)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_merkle_root_is_identity() {
        let leaf = Hash256::sha256d(b"coinbase");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn odd_leaf_count_duplicates_last() {
        let a = Hash256::sha256d(b"a");
        let b = Hash256::sha256d(b"b");
        let c = Hash256::sha256d(b"c");
        let with_three = merkle_root(&[a, b, c]);
        let with_duplicated_last = merkle_root(&[a, b, c, c]);
        assert_eq!(with_three, with_duplicated_last);
    }

    #[test]
    fn header_hash_is_stable_and_ignores_aux_pow() {
        let mut header = BlockHeader {
            version: 1,
            prev_block_hash: Hash256::ZERO,
            merkle_root: Hash256::sha256d(b"root"),
            timestamp: 1_700_000_000,
            bits: 0x1d00_ffff,
            height: 10,
            nonce: 0,
            aux_pow: Vec::new(),
        };
        let before = header.hash();
        header.aux_pow = vec![1, 2, 3];
        assert_eq!(before, header.hash());
    }

    #[test]
    fn block_round_trips_through_canonical_encoding() {
        let header = BlockHeader {
            version: 1,
            prev_block_hash: Hash256::ZERO,
            merkle_root: Hash256::sha256d(b"root"),
            timestamp: 1,
            bits: 0x1d00_ffff,
            height: 0,
            nonce: 7,
            aux_pow: vec![0xaa, 0xbb],
        };
        let block = Block {
            header,
            transactions: Vec::new(),
        };
        let bytes = block.to_bytes();
        let decoded = Block::from_bytes(&bytes).unwrap();
        assert_eq!(block, decoded);
    }
}
