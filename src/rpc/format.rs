//! JSON shapes returned to RPC callers: the hex-reversal convention and the
//! block/transaction enrichment rules of spec §4.5 (`timestamp`, `confirminations`,
//! `txSize`, and input expansion via `GetReference`).

use serde_json::{json, Value};

use crate::block::Block;
use crate::tx::Transaction;

use super::traits::ChainQuery;

fn attribute_to_json(attr: &crate::tx::TxAttribute) -> Value {
    json!({
        "usage": attr.usage as u8,
        "data": hex::encode(&attr.data),
    })
}

fn input_to_json(input: &crate::tx::UtxoInput, chain: &dyn ChainQuery) -> Value {
    let reference = chain.get_output(input);
    json!({
        "txid": input.refer_tx_hash.to_hex_reverse(),
        "vout": input.output_index,
        "sequence": input.sequence,
        "address": reference.as_ref().map(|o| o.program_hash.to_address()),
        "value": reference.as_ref().map(|o| o.value.to_string()),
    })
}

fn output_to_json(output: &crate::tx::TxOutput) -> Value {
    json!({
        "assetid": output.asset_id.to_hex_reverse(),
        "value": output.value.to_string(),
        "address": output.program_hash.to_address(),
        "outputlock": output.output_lock,
    })
}

/// `confirminations = bestHeight - blockHeight + 1`, as the dispatcher defines it.
/// `containing` is `None` for a transaction that hasn't confirmed yet (mempool).
pub fn tx_to_json(tx: &Transaction, chain: &dyn ChainQuery, containing: Option<(u32, u32)>, best_height: u32) -> Value {
    let (timestamp, confirminations) = match containing {
        Some((block_height, block_timestamp)) => (block_timestamp, best_height.saturating_sub(block_height) + 1),
        None => (0, 0),
    };

    json!({
        "txid": tx.txid().to_hex_reverse(),
        "txtype": tx.tx_type as u8,
        "iscoinbase": tx.is_coinbase(),
        "attributes": tx.attributes.iter().map(attribute_to_json).collect::<Vec<_>>(),
        "vin": tx.utxo_inputs.iter().map(|i| input_to_json(i, chain)).collect::<Vec<_>>(),
        "vout": tx.outputs.iter().map(output_to_json).collect::<Vec<_>>(),
        "locktime": tx.lock_time,
        "timestamp": timestamp,
        "confirminations": confirminations,
        "txsize": tx.to_bytes().len(),
    })
}

pub fn block_to_json(block: &Block, chain: &dyn ChainQuery, best_height: u32) -> Value {
    let containing = Some((block.header.height, block.header.timestamp));
    json!({
        "hash": block.hash().to_hex_reverse(),
        "version": block.header.version,
        "previousblockhash": block.header.prev_block_hash.to_hex_reverse(),
        "merkleroot": block.header.merkle_root.to_hex_reverse(),
        "time": block.header.timestamp,
        "height": block.header.height,
        "nonce": block.header.nonce,
        "bits": format!("{:08x}", block.header.bits),
        "confirminations": best_height.saturating_sub(block.header.height) + 1,
        "tx": block
            .transactions
            .iter()
            .map(|t| tx_to_json(t, chain, containing, best_height))
            .collect::<Vec<_>>(),
    })
}
