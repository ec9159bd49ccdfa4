//! Merge-mined (auxPoW) block template cache and the throttled generation
//! path `createauxblock`/`submitauxblock` drive, plus a cooperative native
//! CPU mining worker for `togglecpumining`/`manualmining`.
//!
//! Consensus rules proper — difficulty retargeting, the auxPoW proof's own
//! wire format, reward schedule — are out of scope (crate-level Non-goals);
//! this module only manages *when* a template is (re)built and *what happens*
//! when one comes back solved.

pub mod error;
pub mod traits;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use num_bigint::BigUint;
use num_traits::Zero;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::block::{merkle_root, Block, BlockHeader};
use crate::fixed64::Fixed64;
use crate::hash::{Hash168, Hash256};
use crate::tx::{Payload, Transaction, TxOutput, TxType};

use error::{ErrorKind, MiningResult};
use traits::{ChainView, MempoolView};

/// Regeneration is only reconsidered after a template has been cached for
/// this long — see `MiningCoordinator::generate_aux_block`.
pub const AUXBLOCK_GENERATED_INTERVAL_SECONDS: i64 = 60;

/// An unsealed [`Block`]: header bits fix the target difficulty, `nonce` and
/// `aux_pow` are empty until a submission seals it.
pub type BlockTemplate = Block;

struct ThrottleState {
    pre_chain_height: u32,
    pre_time: i64,
    pre_transaction_count: usize,
}

impl Default for ThrottleState {
    fn default() -> Self {
        ThrottleState {
            pre_chain_height: 0,
            pre_time: 0,
            pre_transaction_count: 0,
        }
    }
}

/// Mutex-guarded template store, keyed by the hex of the template's
/// pre-seal header hash (canonical, non-reversed byte order — this key never
/// reaches a user, so it doesn't follow the RPC layer's reversed-hex
/// convention).
#[derive(Default)]
pub struct AuxBlockCache {
    data: Mutex<HashMap<String, BlockTemplate>>,
}

impl AuxBlockCache {
    pub fn new() -> Self {
        AuxBlockCache::default()
    }

    fn insert(&self, hash_hex: String, template: BlockTemplate) {
        self.data.lock().unwrap().insert(hash_hex, template);
    }

    fn get(&self, hash_hex: &str) -> Option<BlockTemplate> {
        self.data.lock().unwrap().get(hash_hex).cloned()
    }

    /// Drops every cached template. Called once per successful submission —
    /// every outstanding template references a now-stale `prevBlockHash`.
    fn clear(&self) {
        self.data.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Builds the fixed-reward coinbase transaction a template's first slot
/// always carries. Reward amount is a consensus policy this crate doesn't
/// implement (Non-goals) — coinbase value is left at zero, a placeholder in
/// the same spirit as the original's hardcoded `CoinBaseValue: 1`.
fn make_coinbase(pay_to: Hash168, height: u32) -> Transaction {
    Transaction {
        tx_type: TxType::CoinBase,
        payload_version: 0,
        payload: Payload::CoinBase {
            coinbase_data: height.to_le_bytes().to_vec(),
        },
        attributes: Vec::new(),
        utxo_inputs: Vec::new(),
        balance_inputs: Vec::new(),
        outputs: vec![TxOutput {
            asset_id: Hash256::ZERO,
            value: Fixed64::ZERO,
            program_hash: pay_to,
            output_lock: 0,
        }],
        programs: Vec::new(),
        lock_time: 0,
    }
}

/// Compact-bits (Bitcoin-style `nBits`) to target integer: top byte is the
/// exponent, the remaining three bytes are the mantissa.
fn bits_to_target(bits: u32) -> BigUint {
    let exponent = (bits >> 24) as i32;
    let mantissa = BigUint::from(bits & 0x00ff_ffff);
    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    }
}

fn hash_meets_target(hash: &Hash256, target: &BigUint) -> bool {
    if target.is_zero() {
        return false;
    }
    BigUint::from_bytes_be(&hash.0) < *target
}

/// Maintains the auxPoW template cache and throttle state, and a cooperative
/// native mining worker for the non-merge-mined path.
pub struct MiningCoordinator {
    chain: Arc<dyn ChainView>,
    mempool: Arc<dyn MempoolView>,
    cache: AuxBlockCache,
    throttle: Mutex<ThrottleState>,
    /// Target difficulty bits new templates are built with. Retargeting
    /// policy is out of scope — this crate treats it as a fixed coordinator
    /// parameter rather than deriving it from chain history.
    target_bits: u32,
    halt: Arc<AtomicBool>,
    /// Hash of the template last handed out by `generate_aux_block`, whether
    /// freshly built or reused from cache — `createauxblock` needs this to
    /// answer a throttled call with the same hash as the call it's reusing.
    last_hash: Mutex<Option<String>>,
}

impl MiningCoordinator {
    pub fn new(chain: Arc<dyn ChainView>, mempool: Arc<dyn MempoolView>, target_bits: u32) -> Self {
        MiningCoordinator {
            chain,
            mempool,
            cache: AuxBlockCache::new(),
            throttle: Mutex::new(ThrottleState::default()),
            target_bits,
            halt: Arc::new(AtomicBool::new(true)),
            last_hash: Mutex::new(None),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// The template `generate_aux_block` most recently returned or reused,
    /// if any is still cached.
    pub fn current_aux_template(&self) -> Option<(String, BlockTemplate)> {
        let hash_hex = self.last_hash.lock().unwrap().clone()?;
        let template = self.cache.get(&hash_hex)?;
        Some((hash_hex, template))
    }

    fn collect_into_block(&self, pay_to: Hash168) -> MiningResult<Block> {
        let mempool_txs = self.mempool.collect_transactions();
        if mempool_txs.is_empty() {
            return Err(Box::new(ErrorKind::NoTransactions));
        }

        let height = self.chain.height() + 1;
        let mut transactions = Vec::with_capacity(mempool_txs.len() + 1);
        transactions.push(make_coinbase(pay_to, height));
        transactions.extend(mempool_txs);

        let txids: Vec<Hash256> = transactions.iter().map(|t| t.txid()).collect();
        let header = BlockHeader {
            version: 1,
            prev_block_hash: self.chain.best_block_hash(),
            merkle_root: merkle_root(&txids),
            timestamp: now_unix() as u32,
            bits: self.target_bits,
            height,
            nonce: 0,
            aux_pow: Vec::new(),
        };

        Ok(Block { header, transactions })
    }

    /// `generateAuxBlock`: regenerates the template when the chain has
    /// advanced, or when the cached template is stale (older than the
    /// regeneration window) *and* the mempool has moved on. Returns `None`
    /// when the existing cached template still serves.
    pub fn generate_aux_block(&self, pay_to: Hash168) -> MiningResult<Option<(String, BlockTemplate)>> {
        let height = self.chain.height();
        let tx_count = self.mempool.transaction_count();
        let now = now_unix();

        let should_regenerate = {
            let mut throttle = self.throttle.lock().unwrap();
            let stale = height == 0
                || throttle.pre_chain_height != height
                || (now - throttle.pre_time > AUXBLOCK_GENERATED_INTERVAL_SECONDS && tx_count != throttle.pre_transaction_count);

            if stale && throttle.pre_chain_height != height {
                throttle.pre_chain_height = height;
                throttle.pre_time = now;
                throttle.pre_transaction_count = tx_count;
            }
            stale
        };

        if !should_regenerate {
            return Ok(None);
        }

        let template = self.collect_into_block(pay_to)?;
        let hash_hex = hex::encode(template.hash().0);
        self.cache.insert(hash_hex.clone(), template.clone());
        *self.last_hash.lock().unwrap() = Some(hash_hex.clone());

        let mut throttle = self.throttle.lock().unwrap();
        throttle.pre_chain_height = height;
        throttle.pre_time = now;
        throttle.pre_transaction_count = tx_count;

        Ok(Some((hash_hex, template)))
    }

    /// `submitAuxBlock`: seals the cached template with the supplied auxPoW
    /// proof bytes and appends it to the chain. The cache lock is released
    /// across the chain-append call and reacquired only to clear — per the
    /// documented concurrency discipline, a miner never blocks others on I/O.
    pub fn submit_aux_block(&self, hash_hex: &str, aux_pow_hex: &str) -> MiningResult<()> {
        let mut template = self.cache.get(hash_hex).ok_or_else(|| Box::new(ErrorKind::InvalidHash))?;
        let aux_pow = hex::decode(aux_pow_hex).map_err(|_| Box::new(ErrorKind::InvalidHash))?;
        template.header.aux_pow = aux_pow;

        self.chain.append_block(template)?;
        self.cache.clear();
        *self.last_hash.lock().unwrap() = None;
        log::trace!("submitAuxBlock({}) accepted, template cache cleared", hash_hex);
        Ok(())
    }

    /// Grinds nonces for one block and appends it once solved. Used by both
    /// the background worker and `manual_cpu_mining`.
    fn mine_one_block(&self, pay_to: Hash168) -> MiningResult<Hash256> {
        let mut block = self.collect_into_block(pay_to)?;
        let target = bits_to_target(block.header.bits);

        for nonce in 0..=u32::MAX {
            if self.halt.load(Ordering::Relaxed) {
                break;
            }
            block.header.nonce = nonce;
            if hash_meets_target(&block.hash(), &target) {
                let hash = block.hash();
                self.chain.append_block(block)?;
                return Ok(hash);
            }
        }
        Err(Box::new(ErrorKind::ConsensusRejected))
    }

    /// `manualmining`: mines exactly `num_blocks` blocks synchronously,
    /// ignoring the cooperative halt flag (it isn't a background loop).
    pub fn manual_cpu_mining(&self, num_blocks: u32, pay_to: Hash168) -> MiningResult<Vec<Hash256>> {
        let mut hashes = Vec::with_capacity(num_blocks as usize);
        for _ in 0..num_blocks {
            hashes.push(self.mine_one_block(pay_to)?);
        }
        Ok(hashes)
    }

    /// `togglecpumining`: starts or halts the background native mining loop.
    /// `self` must be held behind an `Arc` so the spawned thread can outlive
    /// this call, matching the teacher's `Pow.Start()`/`Pow.Halt()` split
    /// between a long-running goroutine and a cooperative stop flag. The
    /// worker is spawned at `ThreadPriority::Max`, matching the teacher's own
    /// miner thread (`commands/top_level.rs`'s `spawn_with_priority`) so CPU
    /// mining isn't starved by the RPC handler pool on a busy host.
    pub fn toggle_cpu_mining(self: &Arc<Self>, enable: bool, pay_to: Hash168) {
        if enable {
            self.halt.store(false, Ordering::SeqCst);
            let coordinator = Arc::clone(self);
            thread::Builder::new()
                .name("cpu-miner".into())
                .spawn_with_priority(ThreadPriority::Max, move |_| coordinator.mining_loop(pay_to))
                .expect("failed to spawn cpu mining thread");
        } else {
            self.halt.store(true, Ordering::SeqCst);
        }
    }

    fn mining_loop(&self, pay_to: Hash168) {
        while !self.halt.load(Ordering::SeqCst) {
            if let Err(err) = self.mine_one_block(pay_to) {
                log::warn!("cpu mining loop stopping: {}", err);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeChain {
        height: StdMutex<u32>,
        appended: StdMutex<Vec<Block>>,
    }

    impl ChainView for FakeChain {
        fn height(&self) -> u32 {
            *self.height.lock().unwrap()
        }

        fn best_block_hash(&self) -> Hash256 {
            Hash256::ZERO
        }

        fn append_block(&self, block: Block) -> MiningResult<()> {
            self.appended.lock().unwrap().push(block);
            Ok(())
        }
    }

    struct FakeMempool {
        txs: Vec<Transaction>,
    }

    impl MempoolView for FakeMempool {
        fn collect_transactions(&self) -> Vec<Transaction> {
            self.txs.clone()
        }

        fn transaction_count(&self) -> usize {
            self.txs.len()
        }
    }

    fn sample_tx() -> Transaction {
        Transaction {
            tx_type: TxType::TransferAsset,
            payload_version: 0,
            payload: Payload::TransferAsset,
            attributes: Vec::new(),
            utxo_inputs: Vec::new(),
            balance_inputs: Vec::new(),
            outputs: Vec::new(),
            programs: Vec::new(),
            lock_time: 0,
        }
    }

    fn coordinator(height: u32, tx_count: usize) -> MiningCoordinator {
        let chain = Arc::new(FakeChain {
            height: StdMutex::new(height),
            appended: StdMutex::new(Vec::new()),
        });
        let mempool = Arc::new(FakeMempool {
            txs: (0..tx_count).map(|_| sample_tx()).collect(),
        });
        MiningCoordinator::new(chain, mempool, 0x207f_ffff)
    }

    fn sample_addr() -> Hash168 {
        Hash168::new(crate::hash::PREFIX_SINGLE_SIG, b"miner")
    }

    #[test]
    fn first_call_at_zero_height_always_generates() {
        let coord = coordinator(0, 3);
        let result = coord.generate_aux_block(sample_addr()).unwrap();
        assert!(result.is_some());
        assert_eq!(coord.cache_len(), 1);
    }

    #[test]
    fn second_call_with_unchanged_height_and_mempool_reuses_cache() {
        let coord = coordinator(1, 3);
        let first = coord.generate_aux_block(sample_addr()).unwrap().unwrap();
        let second = coord.generate_aux_block(sample_addr()).unwrap();
        assert!(second.is_none());
        assert_eq!(coord.cache_len(), 1);
        let _ = first;
    }

    #[test]
    fn empty_mempool_is_rejected() {
        let coord = coordinator(1, 0);
        let err = coord.generate_aux_block(sample_addr()).unwrap_err();
        assert!(matches!(*err, ErrorKind::NoTransactions));
    }

    #[test]
    fn submit_unknown_hash_is_rejected() {
        let coord = coordinator(1, 2);
        let err = coord.submit_aux_block("deadbeef", "00").unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidHash));
    }

    #[test]
    fn submit_clears_entire_cache() {
        let coord = coordinator(1, 2);
        let (hash_hex, _) = coord.generate_aux_block(sample_addr()).unwrap().unwrap();
        coord.submit_aux_block(&hash_hex, "aabb").unwrap();
        assert_eq!(coord.cache_len(), 0);

        let err = coord.submit_aux_block(&hash_hex, "aabb").unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidHash));
    }
}
