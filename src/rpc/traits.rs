//! Collaborator contracts the RPC layer depends on but doesn't implement:
//! persistent chain/mempool storage and the P2P stack are out of scope per
//! the crate-level Non-goals (see also [`crate::mining::traits`], which
//! `MiningCoordinator` depends on for the narrower append/collect surface
//! block generation needs). These traits cover the read surface `getblock`,
//! `getrawtransaction` and friends need, plus submission/acceptance.

use crate::block::Block;
use crate::hash::Hash256;
use crate::tx::{Transaction, TxOutput, UtxoInput};

/// Read access to confirmed chain state. Implemented by whatever owns
/// persistent block/transaction storage outside this crate.
pub trait ChainQuery: Send + Sync {
    fn height(&self) -> u32;
    fn best_block_hash(&self) -> Hash256;
    fn block_hash_at_height(&self, height: u32) -> Option<Hash256>;
    fn get_block_by_hash(&self, hash: &Hash256) -> Option<Block>;
    /// Returns the transaction plus the height and timestamp of the block that
    /// confirmed it — enrichment needs both without a second full block fetch.
    fn get_transaction(&self, hash: &Hash256) -> Option<(Transaction, u32, u32)>;
    /// Resolves a prior output an input refers to — used to expand
    /// non-coinbase inputs with their spent address/value (`GetReference`).
    fn get_output(&self, input: &UtxoInput) -> Option<TxOutput>;
}

/// Read/write access to the pending-transaction pool.
pub trait MempoolQuery: Send + Sync {
    fn all_transactions(&self) -> Vec<Transaction>;
    /// Admits an already-verified transaction. Failure (duplicate, conflicting
    /// spend, policy rejection) is reported as a message, not a typed error —
    /// mempool admission policy is this crate's collaborator's concern.
    fn accept(&self, tx: Transaction) -> Result<(), String>;
}

/// Stands in for the out-of-scope P2P stack: just enough surface for
/// `getconnectioncount`/`getneighbor`/`getnodestate` to report something
/// without this crate owning a network implementation.
pub trait PeerView: Send + Sync {
    fn connection_count(&self) -> u32;
    /// Peer addresses as the original reports them — opaque strings
    /// (`host:port`), not parsed further by this crate.
    fn neighbors(&self) -> Vec<String>;
    fn node_id(&self) -> u64;
    fn node_version(&self) -> u32;
}
