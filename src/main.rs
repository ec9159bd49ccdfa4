//! Binary entry point: wires the library modules into a single in-memory demo
//! node and serves JSON-RPC requests read line-by-line from stdin.
//!
//! Persistent chain/mempool storage and the P2P stack are out of scope (see
//! the crate-level Non-goals) — `MemoryChain`/`MemoryMempool`/`StaticPeers`
//! below are a minimal stand-in for whatever an embedder would plug in
//! instead, just enough for `RpcDispatcher` to have something to answer with.
//! HTTP transport is likewise out of scope: this reads requests from stdin
//! rather than serving them over a socket.

pub mod block;
pub mod config;
pub mod fixed64;
pub mod hash;
pub mod mining;
pub mod rpc;
pub mod script;
pub mod tx;
pub mod wallet;

use std::collections::HashMap;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use block::Block;
use config::NodeConfig;
use hash::Hash256;
use mining::error::MiningResult;
use mining::traits::{ChainView, MempoolView};
use mining::MiningCoordinator;
use rpc::traits::{ChainQuery, MempoolQuery, PeerView};
use rpc::RpcDispatcher;
use tx::{Transaction, TxOutput, UtxoInput};
use wallet::Wallet;

/// In-memory stand-in for persistent block storage.
#[derive(Default)]
struct MemoryChain {
    height: Mutex<Option<u32>>,
    blocks_by_height: Mutex<HashMap<u32, Hash256>>,
    blocks: Mutex<HashMap<Hash256, Block>>,
}

impl ChainQuery for MemoryChain {
    fn height(&self) -> u32 {
        self.height.lock().unwrap().unwrap_or(0)
    }

    fn best_block_hash(&self) -> Hash256 {
        match *self.height.lock().unwrap() {
            Some(height) => self.blocks_by_height.lock().unwrap().get(&height).copied().unwrap_or(Hash256::ZERO),
            None => Hash256::ZERO,
        }
    }

    fn block_hash_at_height(&self, height: u32) -> Option<Hash256> {
        self.blocks_by_height.lock().unwrap().get(&height).copied()
    }

    fn get_block_by_hash(&self, hash: &Hash256) -> Option<Block> {
        self.blocks.lock().unwrap().get(hash).cloned()
    }

    fn get_transaction(&self, hash: &Hash256) -> Option<(Transaction, u32, u32)> {
        let blocks = self.blocks.lock().unwrap();
        for block in blocks.values() {
            if let Some(tx) = block.transactions.iter().find(|t| t.txid() == *hash) {
                return Some((tx.clone(), block.header.height, block.header.timestamp));
            }
        }
        None
    }

    fn get_output(&self, input: &UtxoInput) -> Option<TxOutput> {
        let blocks = self.blocks.lock().unwrap();
        for block in blocks.values() {
            if let Some(tx) = block.transactions.iter().find(|t| t.txid() == input.refer_tx_hash) {
                return tx.outputs.get(input.output_index as usize).cloned();
            }
        }
        None
    }
}

impl ChainView for MemoryChain {
    fn height(&self) -> u32 {
        ChainQuery::height(self)
    }

    fn best_block_hash(&self) -> Hash256 {
        ChainQuery::best_block_hash(self)
    }

    fn append_block(&self, block: Block) -> MiningResult<()> {
        let height = block.header.height;
        let hash = block.hash();
        *self.height.lock().unwrap() = Some(height);
        self.blocks_by_height.lock().unwrap().insert(height, hash);
        self.blocks.lock().unwrap().insert(hash, block);
        Ok(())
    }
}

/// In-memory stand-in for the pending-transaction pool.
#[derive(Default)]
struct MemoryMempool {
    txs: Mutex<Vec<Transaction>>,
}

impl MempoolQuery for MemoryMempool {
    fn all_transactions(&self) -> Vec<Transaction> {
        self.txs.lock().unwrap().clone()
    }

    fn accept(&self, tx: Transaction) -> Result<(), String> {
        self.txs.lock().unwrap().push(tx);
        Ok(())
    }
}

impl MempoolView for MemoryMempool {
    fn collect_transactions(&self) -> Vec<Transaction> {
        self.txs.lock().unwrap().clone()
    }

    fn transaction_count(&self) -> usize {
        self.txs.lock().unwrap().len()
    }
}

/// Stands in for the out-of-scope P2P stack: reports no peers at all.
struct StaticPeers;

impl PeerView for StaticPeers {
    fn connection_count(&self) -> u32 {
        0
    }

    fn neighbors(&self) -> Vec<String> {
        Vec::new()
    }

    fn node_id(&self) -> u64 {
        0
    }

    fn node_version(&self) -> u32 {
        1
    }
}

/// Reads `method [params-json]` lines from stdin, dispatches each through
/// [`RpcDispatcher`], and prints the `{result, error, id}` envelope as JSON.
/// `params-json`, if present, must be a JSON array, e.g. `getblock [0]`.
fn run_repl(dispatcher: &RpcDispatcher) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print!("> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            print!("> ");
            stdout.flush()?;
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        let (method, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let params: Vec<Value> = if rest.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str(rest.trim()) {
                Ok(params) => params,
                Err(e) => {
                    println!("invalid params json: {e}");
                    print!("> ");
                    stdout.flush()?;
                    continue;
                }
            }
        };

        let response = dispatcher.dispatch(method, &params);
        println!("{}", serde_json::to_string_pretty(&response.to_value())?);
        print!("> ");
        stdout.flush()?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let chain = Arc::new(MemoryChain::default());
    let mempool = Arc::new(MemoryMempool::default());
    let wallet = Arc::new(Wallet::new());
    let mining = Arc::new(MiningCoordinator::new(chain.clone(), mempool.clone(), 0x207f_ffff));
    let config = NodeConfig::default();

    let dispatcher = RpcDispatcher::new(chain.clone(), chain, mempool, wallet, mining, Arc::new(StaticPeers), config);

    run_repl(&dispatcher)
}
