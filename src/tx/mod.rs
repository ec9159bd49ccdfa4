//! Transaction data model and canonical encoding.

pub mod builder;
pub mod contract;
pub mod encode;

use serde::{Deserialize, Serialize};

use crate::fixed64::Fixed64;
use crate::hash::{Hash168, Hash256};
use crate::script::{Program, SignableData};
use encode::{
    decode_vec, encode_vec, read_i64, read_u16, read_u32, read_var_bytes, write_i64, write_u16, write_u32,
    write_var_bytes, Cursor, Decode, Encode, EncodeResult,
};

pub const SEQUENCE_DEFAULT: u32 = 0xFFFF_FFFF;
/// Marks an input as a deliberate spend of an output past its `output_lock` height.
pub const SEQUENCE_TIMELOCK_SPEND: u32 = 0xFFFF_FFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoInput {
    pub refer_tx_hash: Hash256,
    pub output_index: u16,
    pub sequence: u32,
}

impl Encode for UtxoInput {
    fn encode(&self, out: &mut Vec<u8>) {
        self.refer_tx_hash.0.encode(out);
        write_u16(out, self.output_index);
        write_u32(out, self.sequence);
    }
}

impl Decode for UtxoInput {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(UtxoInput {
            refer_tx_hash: Hash256(<[u8; 32]>::decode(cur)?),
            output_index: read_u16(cur)?,
            sequence: read_u32(cur)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub asset_id: Hash256,
    pub value: Fixed64,
    pub program_hash: Hash168,
    pub output_lock: u32,
}

impl Encode for TxOutput {
    fn encode(&self, out: &mut Vec<u8>) {
        self.asset_id.0.encode(out);
        write_i64(out, self.value.raw());
        self.program_hash.0.encode(out);
        write_u32(out, self.output_lock);
    }
}

impl Decode for TxOutput {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(TxOutput {
            asset_id: Hash256(<[u8; 32]>::decode(cur)?),
            value: Fixed64::from_raw(read_i64(cur)?),
            program_hash: Hash168(<[u8; 21]>::decode(cur)?),
            output_lock: read_u32(cur)?,
        })
    }
}

/// Legacy non-UTXO input reference. Carried for wire-format completeness;
/// `TxBuilder` never populates it — ELA's `balanceInputs` mechanism predates the
/// pure-UTXO model and has had no live producers for years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceInput {
    pub asset_id: Hash256,
    pub value: Fixed64,
    pub program_hash: Hash168,
}

impl Encode for BalanceInput {
    fn encode(&self, out: &mut Vec<u8>) {
        self.asset_id.0.encode(out);
        write_i64(out, self.value.raw());
        self.program_hash.0.encode(out);
    }
}

impl Decode for BalanceInput {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(BalanceInput {
            asset_id: Hash256(<[u8; 32]>::decode(cur)?),
            value: Fixed64::from_raw(read_i64(cur)?),
            program_hash: Hash168(<[u8; 21]>::decode(cur)?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttributeUsage {
    Nonce = 0x00,
    Script = 0x01,
    Memo = 0x81,
}

impl AttributeUsage {
    fn from_u8(v: u8) -> EncodeResult<Self> {
        match v {
            0x00 => Ok(AttributeUsage::Nonce),
            0x01 => Ok(AttributeUsage::Script),
            0x81 => Ok(AttributeUsage::Memo),
            _ => Err(encode::EncodeError::Malformed("unknown attribute usage")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAttribute {
    pub usage: AttributeUsage,
    pub data: Vec<u8>,
}

impl Encode for TxAttribute {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.usage as u8);
        write_var_bytes(out, &self.data);
    }
}

impl Decode for TxAttribute {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        let usage = AttributeUsage::from_u8(cur.u8()?)?;
        let data = read_var_bytes(cur)?;
        Ok(TxAttribute { usage, data })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    CoinBase = 0x00,
    TransferAsset = 0x01,
}

impl TxType {
    fn from_u8(v: u8) -> EncodeResult<Self> {
        match v {
            0x00 => Ok(TxType::CoinBase),
            0x01 => Ok(TxType::TransferAsset),
            _ => Err(encode::EncodeError::Malformed("unknown tx type")),
        }
    }
}

/// The only two payload kinds this core exercises. Other ELA payload kinds (side
/// chain governance payloads beyond deposit/withdraw, CR proposals, etc.) are out
/// of scope — see the crate-level Non-goals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    CoinBase { coinbase_data: Vec<u8> },
    TransferAsset,
}

impl Payload {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Payload::CoinBase { coinbase_data } => write_var_bytes(out, coinbase_data),
            Payload::TransferAsset => {}
        }
    }

    fn decode(cur: &mut Cursor, tx_type: TxType) -> EncodeResult<Self> {
        match tx_type {
            TxType::CoinBase => Ok(Payload::CoinBase {
                coinbase_data: read_var_bytes(cur)?,
            }),
            TxType::TransferAsset => Ok(Payload::TransferAsset),
        }
    }
}

/// (txType, payloadVersion, payload, attributes, utxoInputs, balanceInputs, outputs,
/// programs, lockTime) per the data model. `programs` is excluded from the
/// signable hash — see [`Transaction::signable_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_type: TxType,
    pub payload_version: u8,
    pub payload: Payload,
    pub attributes: Vec<TxAttribute>,
    pub utxo_inputs: Vec<UtxoInput>,
    pub balance_inputs: Vec<BalanceInput>,
    pub outputs: Vec<TxOutput>,
    pub programs: Vec<Program>,
    pub lock_time: u32,
}

impl Transaction {
    /// Encodes every field except `programs` — the canonical pre-signature form
    /// that signatures and verification are computed over.
    pub fn encode_unsigned(&self, out: &mut Vec<u8>) {
        out.push(self.tx_type as u8);
        out.push(self.payload_version);
        self.payload.encode(out);
        encode_vec(&self.attributes, out);
        encode_vec(&self.utxo_inputs, out);
        encode_vec(&self.balance_inputs, out);
        encode_vec(&self.outputs, out);
        write_u32(out, self.lock_time);
    }

    pub fn encode_full(&self, out: &mut Vec<u8>) {
        self.encode_unsigned(out);
        encode_vec(&self.programs, out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_full(&mut out);
        out
    }

    pub fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        let tx_type = TxType::from_u8(cur.u8()?)?;
        let payload_version = cur.u8()?;
        let payload = Payload::decode(cur, tx_type)?;
        let attributes = decode_vec(cur)?;
        let utxo_inputs = decode_vec(cur)?;
        let balance_inputs = decode_vec(cur)?;
        let outputs = decode_vec(cur)?;
        let lock_time = read_u32(cur)?;
        let programs = decode_vec(cur)?;
        Ok(Transaction {
            tx_type,
            payload_version,
            payload,
            attributes,
            utxo_inputs,
            balance_inputs,
            outputs,
            programs,
            lock_time,
        })
    }

    pub fn from_bytes(data: &[u8]) -> EncodeResult<Self> {
        let mut cur = Cursor::new(data);
        Transaction::decode(&mut cur)
    }

    /// Double-SHA256 of the pre-signature encoding. Used both as the transaction
    /// id and as the hash `CHECKSIG` verifies signatures against.
    pub fn signable_hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode_unsigned(&mut buf);
        Hash256::sha256d(&buf)
    }

    pub fn txid(&self) -> Hash256 {
        self.signable_hash()
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.tx_type, TxType::CoinBase)
    }
}

/// Pairs a transaction with the ordered, distinct program hashes its inputs must
/// satisfy, so the script VM can verify it without reaching into external UTXO
/// storage. `TxBuilder` already knows these hashes from the coins it selected;
/// a standalone verifier (outside this crate) would resolve them via its own
/// chain/UTXO store before constructing this context.
pub struct SigningContext<'a> {
    pub tx: &'a Transaction,
    pub program_hashes: Vec<Hash168>,
}

impl<'a> SignableData for SigningContext<'a> {
    fn signable_hash(&self) -> Hash256 {
        self.tx.signable_hash()
    }

    fn program_hashes(&self) -> Vec<Hash168> {
        self.program_hashes.clone()
    }

    fn programs(&self) -> &[Program] {
        &self.tx.programs
    }
}

impl Encode for [u8; 32] {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl Decode for [u8; 32] {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(cur.take(32)?.try_into().unwrap())
    }
}

impl Encode for [u8; 21] {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl Decode for [u8; 21] {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(cur.take(21)?.try_into().unwrap())
    }
}

impl Encode for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        self.encode_full(out);
    }
}

impl Decode for Transaction {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Transaction::decode(cur)
    }
}

impl Encode for Program {
    fn encode(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, &self.code);
        write_var_bytes(out, &self.parameter);
    }
}

impl Decode for Program {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self> {
        Ok(Program {
            code: read_var_bytes(cur)?,
            parameter: read_var_bytes(cur)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            tx_type: TxType::TransferAsset,
            payload_version: 0,
            payload: Payload::TransferAsset,
            attributes: vec![TxAttribute {
                usage: AttributeUsage::Nonce,
                data: vec![1, 2, 3, 4],
            }],
            utxo_inputs: vec![UtxoInput {
                refer_tx_hash: Hash256([9u8; 32]),
                output_index: 0,
                sequence: SEQUENCE_DEFAULT,
            }],
            balance_inputs: Vec::new(),
            outputs: vec![TxOutput {
                asset_id: Hash256([1u8; 32]),
                value: Fixed64::from_raw(100),
                program_hash: Hash168::new(0x21, b"redeem"),
                output_lock: 0,
            }],
            programs: vec![Program {
                code: vec![0x21, 0xac],
                parameter: vec![],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn round_trips_through_canonical_encoding() {
        let tx = sample_tx();
        let bytes = tx.to_bytes();
        let decoded = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn signable_hash_excludes_programs() {
        let mut tx = sample_tx();
        let hash_before = tx.signable_hash();
        tx.programs[0].parameter = vec![0xff; 4];
        assert_eq!(hash_before, tx.signable_hash());
    }

    #[test]
    fn signable_hash_changes_with_outputs() {
        let mut tx = sample_tx();
        let hash_before = tx.signable_hash();
        tx.outputs[0].value = Fixed64::from_raw(200);
        assert_ne!(hash_before, tx.signable_hash());
    }
}
