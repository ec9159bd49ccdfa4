//! Transport-agnostic JSON-RPC dispatch: one handler per method named in
//! §6 of the external interface, each built on the collaborator traits in
//! [`traits`] plus the wallet/mining/script machinery the rest of this crate
//! already implements. `dispatch` never panics and never lets a domain error
//! escape — every failure is converted to one of the well-known envelopes in
//! [`error::RpcError`].

pub mod error;
pub mod format;
pub mod params;
pub mod traits;

use std::sync::Arc;

use log::LevelFilter;
use serde_json::{json, Value};

use crate::block::Block;
use crate::config::NodeConfig;
use crate::hash::{Hash168, Hash256};
use crate::mining::traits::ChainView as MiningChainView;
use crate::mining::{self, MiningCoordinator};
use crate::script::{self, crypto::EcdsaCrypto};
use crate::tx::builder::TxBuilder;
use crate::tx::{contract, txbuilder_error, AttributeUsage, SigningContext, Transaction, TxAttribute};
use crate::wallet::Wallet;

pub use error::RpcError;
use params::{as_batch_outs, as_bool, as_string, as_u32};
use traits::{ChainQuery, MempoolQuery, PeerView};

/// `{result, error, id}` mirrors the original's `ElaRpc(...)` envelope. This
/// crate leaves `id` as `Value::Null` — correlating a response with its
/// request's id is a transport-layer concern (JSON-RPC-over-HTTP is itself
/// out of scope; see the crate-level Non-goals), so whatever embeds this
/// dispatcher is expected to fill it in from the original request.
pub struct RpcResponse {
    pub result: Value,
    pub error: Value,
    pub id: Value,
}

impl RpcResponse {
    fn ok(result: Value) -> Self {
        RpcResponse {
            result,
            error: Value::Null,
            id: Value::Null,
        }
    }

    fn err(e: RpcError) -> Self {
        RpcResponse {
            result: Value::Null,
            error: e.to_value(),
            id: Value::Null,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "result": self.result, "error": self.error, "id": self.id })
    }
}

/// Process-wide collaborators an embedder wires together before serving RPC
/// traffic: confirmed-chain storage, the mempool, the wallet, the mining
/// coordinator and whatever stands in for the P2P stack. None of these are
/// owned by this crate — see the crate-level Non-goals.
pub struct RpcDispatcher {
    chain: Arc<dyn ChainQuery>,
    chain_append: Arc<dyn MiningChainView>,
    mempool: Arc<dyn MempoolQuery>,
    wallet: Arc<Wallet>,
    mining: Arc<MiningCoordinator>,
    peers: Arc<dyn PeerView>,
    config: NodeConfig,
}

impl RpcDispatcher {
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        chain_append: Arc<dyn MiningChainView>,
        mempool: Arc<dyn MempoolQuery>,
        wallet: Arc<Wallet>,
        mining: Arc<MiningCoordinator>,
        peers: Arc<dyn PeerView>,
        config: NodeConfig,
    ) -> Self {
        RpcDispatcher {
            chain,
            chain_append,
            mempool,
            wallet,
            mining,
            peers,
            config,
        }
    }

    pub fn dispatch(&self, method: &str, params: &[Value]) -> RpcResponse {
        let outcome = match method {
            "getbestblockhash" => self.h_getbestblockhash(),
            "getblock" => self.h_getblock(params),
            "getblockcount" => self.h_getblockcount(),
            "getblockhash" => self.h_getblockhash(params),
            "getconnectioncount" => self.h_getconnectioncount(),
            "getrawmempool" => self.h_getrawmempool(),
            "getrawtransaction" => self.h_getrawtransaction(params),
            "getneighbor" => self.h_getneighbor(),
            "getnodestate" => self.h_getnodestate(),
            "setdebuginfo" => self.h_setdebuginfo(params),
            "createauxblock" => self.h_createauxblock(params),
            "submitauxblock" => self.h_submitauxblock(params),
            "getinfo" => self.h_getinfo(),
            "getversion" => self.h_getversion(),
            "addaccount" => self.h_addaccount(),
            "deleteaccount" => self.h_deleteaccount(params),
            "togglecpumining" => self.h_togglecpumining(params),
            "manualmining" => self.h_manualmining(params),
            "sendtransaction" => self.h_sendtransaction(params),
            "sendbatchouttransaction" => self.h_sendbatchouttransaction(params),
            "sendrawtransaction" => self.h_sendrawtransaction(params),
            "submitblock" => self.h_submitblock(params),
            "signmultisigntransaction" => self.h_signmultisigntransaction(params),
            "createmultisigntransaction" => self.h_createmultisigntransaction(params),
            "createbatchoutmultisigntransaction" => self.h_createbatchoutmultisigntransaction(params),
            "deposittransaction" => self.h_deposittransaction(params),
            "depositunlocktransaction" => self.h_depositunlocktransaction(params),
            "withdrawtransaction" => self.h_withdrawtransaction(params),
            "withdrawunlocktransaction" => self.h_withdrawunlocktransaction(params),
            "deposittosidetransaction" => self.h_deposittosidetransaction(params),
            _ => {
                log::debug!("rpc: unrecognized method {}", method);
                Err(RpcError::Failed)
            }
        };

        match outcome {
            Ok(result) => RpcResponse::ok(result),
            Err(e) => RpcResponse::err(e),
        }
    }

    // ---- shared helpers --------------------------------------------------

    fn parse_address(s: &str) -> Result<Hash168, RpcError> {
        s.parse().map_err(|_| RpcError::InvalidParameter)
    }

    fn parse_asset(s: &str) -> Result<Hash256, RpcError> {
        Hash256::from_hex_reverse(s).map_err(|_| RpcError::InvalidParameter)
    }

    fn parse_output_lock(s: &str) -> Result<u32, RpcError> {
        s.parse().map_err(|_| RpcError::InvalidParameter)
    }

    fn builder(&self, asset_id: Hash256) -> TxBuilder<'_> {
        TxBuilder::new(self.wallet.as_ref(), asset_id, self.chain.height())
    }

    /// Resolves each input's program hash via `ChainQuery::get_output`, runs
    /// the witness VM, then hands the transaction to the mempool.
    fn verify_and_send(&self, tx: &Transaction) -> Result<Hash256, RpcError> {
        let mut program_hashes = Vec::with_capacity(tx.utxo_inputs.len());
        for input in &tx.utxo_inputs {
            let output = self.chain.get_output(input).ok_or(RpcError::InvalidTransaction)?;
            program_hashes.push(output.program_hash);
        }

        let ctx = SigningContext { tx, program_hashes };
        script::verify_signable(&ctx, &EcdsaCrypto).map_err(|_| RpcError::InvalidTransaction)?;

        self.mempool.accept(tx.clone()).map_err(|_| RpcError::Failed)?;
        Ok(tx.txid())
    }

    fn attach_memo(tx: &mut Transaction, hex_str: &str) -> Result<(), RpcError> {
        let data = hex::decode(hex_str).map_err(|_| RpcError::InvalidParameter)?;
        tx.attributes.push(TxAttribute {
            usage: AttributeUsage::Memo,
            data,
        });
        Ok(())
    }

    /// The single local pubkey a script/multisig contract for `program_hash`
    /// was registered with — deposit/unlock redeem scripts are built over the
    /// same key this wallet already holds a contract for.
    fn owned_pubkey(&self, program_hash: &Hash168) -> Result<Vec<u8>, RpcError> {
        let contract = self.wallet.get_contract(program_hash).ok_or(RpcError::Failed)?;
        contract.owner_pubkeys.first().cloned().ok_or(RpcError::Failed)
    }

    // ---- read-only chain/mempool/peer queries -----------------------------

    fn h_getbestblockhash(&self) -> Result<Value, RpcError> {
        Ok(json!(self.chain.best_block_hash().to_hex_reverse()))
    }

    fn h_getblock(&self, params: &[Value]) -> Result<Value, RpcError> {
        let arg = params::required(params, 0)?;
        let block = match arg {
            Value::Number(n) => {
                let height = n.as_u64().ok_or(RpcError::InvalidParameter)? as u32;
                let hash = self.chain.block_hash_at_height(height).ok_or(RpcError::UnknownBlock)?;
                self.chain.get_block_by_hash(&hash)
            }
            Value::String(s) => {
                let hash = Hash256::from_hex_reverse(s).map_err(|_| RpcError::InvalidHash)?;
                self.chain.get_block_by_hash(&hash)
            }
            _ => return Err(RpcError::InvalidParameter),
        };
        let block = block.ok_or(RpcError::UnknownBlock)?;
        Ok(format::block_to_json(&block, self.chain.as_ref(), self.chain.height()))
    }

    fn h_getblockcount(&self) -> Result<Value, RpcError> {
        Ok(json!(self.chain.height() + 1))
    }

    fn h_getblockhash(&self, params: &[Value]) -> Result<Value, RpcError> {
        let height = as_u32(params, 0)?;
        let hash = self.chain.block_hash_at_height(height).ok_or(RpcError::UnknownBlock)?;
        Ok(json!(hash.to_hex_reverse()))
    }

    fn h_getconnectioncount(&self) -> Result<Value, RpcError> {
        Ok(json!(self.peers.connection_count()))
    }

    fn h_getrawmempool(&self) -> Result<Value, RpcError> {
        let height = self.chain.height();
        let txs = self.mempool.all_transactions();
        Ok(json!(txs
            .iter()
            .map(|t| format::tx_to_json(t, self.chain.as_ref(), None, height))
            .collect::<Vec<_>>()))
    }

    fn h_getrawtransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let hash_str = as_string(params, 0)?;
        let hash = Hash256::from_hex_reverse(&hash_str).map_err(|_| RpcError::InvalidHash)?;
        let (tx, height, timestamp) = self.chain.get_transaction(&hash).ok_or(RpcError::UnknownTransaction)?;
        Ok(format::tx_to_json(&tx, self.chain.as_ref(), Some((height, timestamp)), self.chain.height()))
    }

    fn h_getneighbor(&self) -> Result<Value, RpcError> {
        Ok(json!(self.peers.neighbors()))
    }

    fn h_getnodestate(&self) -> Result<Value, RpcError> {
        Ok(json!({
            "id": self.peers.node_id(),
            "version": self.peers.node_version(),
            "height": self.chain.height(),
            "connections": self.peers.connection_count(),
        }))
    }

    fn h_setdebuginfo(&self, params: &[Value]) -> Result<Value, RpcError> {
        let level = as_u32(params, 0)?;
        let filter = match level {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        log::set_max_level(filter);
        Ok(json!(true))
    }

    // ---- mining -------------------------------------------------------

    fn h_createauxblock(&self, params: &[Value]) -> Result<Value, RpcError> {
        let pay_to = Self::parse_address(&as_string(params, 0)?)?;
        let generated = self.mining.generate_aux_block(pay_to).map_err(|_| RpcError::InternalError)?;
        let (hash_hex, template) = match generated {
            Some(pair) => pair,
            None => self.mining.current_aux_template().ok_or(RpcError::InternalError)?,
        };

        let coinbase_value = template
            .transactions
            .first()
            .and_then(|t| t.outputs.first())
            .map(|o| o.value.to_string())
            .unwrap_or_else(|| "0".to_owned());

        Ok(json!({
            "chainid": 1,
            "height": template.header.height,
            "coinbasevalue": coinbase_value,
            "bits": format!("{:08x}", template.header.bits),
            "hash": hash_hex,
            "previousblockhash": template.header.prev_block_hash.to_hex_reverse(),
        }))
    }

    fn h_submitauxblock(&self, params: &[Value]) -> Result<Value, RpcError> {
        let hash_hex = as_string(params, 0)?;
        let aux_pow_hex = as_string(params, 1)?;
        self.mining
            .submit_aux_block(&hash_hex, &aux_pow_hex)
            .map_err(|e| mining_err_to_rpc(&e))?;
        Ok(json!(true))
    }

    fn h_getinfo(&self) -> Result<Value, RpcError> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "height": self.chain.height(),
            "connections": self.peers.connection_count(),
            "gaslimit": self.config.gas_limit,
        }))
    }

    fn h_getversion(&self) -> Result<Value, RpcError> {
        Ok(json!(env!("CARGO_PKG_VERSION")))
    }

    fn h_addaccount(&self) -> Result<Value, RpcError> {
        let hash = self.wallet.create_account().map_err(|_| RpcError::InternalError)?;
        Ok(json!(hash.to_address()))
    }

    fn h_deleteaccount(&self, params: &[Value]) -> Result<Value, RpcError> {
        let hash = Self::parse_address(&as_string(params, 0)?)?;
        if self.wallet.delete_account(&hash) {
            Ok(json!(true))
        } else {
            Err(RpcError::Failed)
        }
    }

    fn h_togglecpumining(&self, params: &[Value]) -> Result<Value, RpcError> {
        let enable = as_bool(params, 0)?;
        let pay_to = Self::parse_address(&self.config.pay_to_addr)?;
        self.mining.toggle_cpu_mining(enable, pay_to);
        Ok(json!(true))
    }

    fn h_manualmining(&self, params: &[Value]) -> Result<Value, RpcError> {
        let num_blocks = as_u32(params, 0)?;
        if num_blocks == 0 {
            return Err(RpcError::InvalidParameter);
        }
        let pay_to = Self::parse_address(&self.config.pay_to_addr)?;
        let hashes = self.mining.manual_cpu_mining(num_blocks, pay_to).map_err(|_| RpcError::Failed)?;
        Ok(json!(hashes.iter().map(Hash256::to_hex_reverse).collect::<Vec<_>>()))
    }

    // ---- plain transfers -----------------------------------------------

    fn h_sendtransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let address = as_string(params, 1)?;
        let value = as_string(params, 2)?;
        let fee = as_string(params, 3)?;
        let output_lock = Self::parse_output_lock(&as_string(params, 4)?)?;

        let tx = self
            .builder(asset_id)
            .build_transfer(&fee, &[(&address, &value)], output_lock)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        let txid = self.verify_and_send(&tx)?;
        Ok(json!(txid.to_hex_reverse()))
    }

    fn h_sendbatchouttransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let outs = as_batch_outs(params, 1)?;
        let fee = as_string(params, 2)?;
        let output_lock = Self::parse_output_lock(&as_string(params, 3)?)?;

        let outs_ref: Vec<(&str, &str)> = outs.iter().map(|(a, v)| (a.as_str(), v.as_str())).collect();
        let tx = self
            .builder(asset_id)
            .build_transfer(&fee, &outs_ref, output_lock)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        let txid = self.verify_and_send(&tx)?;
        Ok(json!(txid.to_hex_reverse()))
    }

    fn h_sendrawtransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let raw = as_string(params, 0)?;
        let bytes = hex::decode(&raw).map_err(|_| RpcError::InvalidTransaction)?;
        let tx = Transaction::from_bytes(&bytes).map_err(|_| RpcError::InvalidTransaction)?;
        let txid = self.verify_and_send(&tx)?;
        Ok(json!(txid.to_hex_reverse()))
    }

    fn h_submitblock(&self, params: &[Value]) -> Result<Value, RpcError> {
        let raw = as_string(params, 0)?;
        let bytes = hex::decode(&raw).map_err(|_| RpcError::InvalidBlock)?;
        let block = Block::from_bytes(&bytes).map_err(|_| RpcError::InvalidBlock)?;
        self.chain_append.append_block(block).map_err(|_| RpcError::InvalidBlock)?;
        Ok(json!(true))
    }

    // ---- multisig ------------------------------------------------------

    fn h_signmultisigntransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let raw = as_string(params, 0)?;
        let bytes = hex::decode(&raw).map_err(|_| RpcError::InvalidTransaction)?;
        let tx = Transaction::from_bytes(&bytes).map_err(|_| RpcError::InvalidTransaction)?;
        let signed = self
            .builder(Hash256::ZERO)
            .sign_multisig_transaction(tx)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Ok(json!(hex::encode(signed.to_bytes())))
    }

    fn h_createmultisigntransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let address = as_string(params, 2)?;
        let value = as_string(params, 3)?;
        let fee = as_string(params, 4)?;

        let tx = self
            .builder(asset_id)
            .build_multisig_transfer(from, &fee, &[(&address, &value)])
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }

    fn h_createbatchoutmultisigntransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let outs = as_batch_outs(params, 2)?;
        let fee = as_string(params, 3)?;

        let outs_ref: Vec<(&str, &str)> = outs.iter().map(|(a, v)| (a.as_str(), v.as_str())).collect();
        let tx = self
            .builder(asset_id)
            .build_multisig_transfer(from, &fee, &outs_ref)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }

    // ---- deposit/withdraw script transfers ------------------------------
    //
    // These six build a script-transfer whose program is one of the redeem
    // script factories in `tx::contract`, over the single key (or two keys)
    // the call supplies. `from` must already be a script/multisig contract
    // this wallet holds, since only its coins can be spent this way.

    fn h_deposittransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let address = as_string(params, 2)?;
        let value = as_string(params, 3)?;
        let fee = as_string(params, 4)?;
        let secret = as_string(params, 5)?;

        let pubkey = self.owned_pubkey(&from)?;
        let script = contract::create_deposit_script_redeem_script(&pubkey);
        let mut tx = self
            .builder(asset_id)
            .build_script_transfer(from, &fee, &[(&address, &value)], script)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Self::attach_memo(&mut tx, &secret)?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }

    fn h_depositunlocktransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let address = as_string(params, 2)?;
        let key = as_string(params, 3)?;
        let value = as_string(params, 4)?;
        let fee = as_string(params, 5)?;
        let s = as_string(params, 6)?;

        let commitment = Hash256::from_hex_reverse(&key).map_err(|_| RpcError::InvalidParameter)?;
        let pubkey = self.owned_pubkey(&from)?;
        let script = contract::create_unlock_script_redeem_script(&commitment, &pubkey);
        let mut tx = self
            .builder(asset_id)
            .build_script_transfer(from, &fee, &[(&address, &value)], script)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Self::attach_memo(&mut tx, &s)?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }

    fn h_withdrawtransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let address = as_string(params, 2)?;
        let key_a = as_string(params, 3)?;
        let key_s = as_string(params, 4)?;
        let value = as_string(params, 5)?;
        let fee = as_string(params, 6)?;
        let s = as_string(params, 7)?;

        let pubkey_owner = hex::decode(&key_a).map_err(|_| RpcError::InvalidParameter)?;
        let pubkey_arbiter = hex::decode(&key_s).map_err(|_| RpcError::InvalidParameter)?;
        let script = contract::create_withdraw_script_redeem_script(&pubkey_owner, &pubkey_arbiter);
        let mut tx = self
            .builder(asset_id)
            .build_script_transfer(from, &fee, &[(&address, &value)], script)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Self::attach_memo(&mut tx, &s)?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }

    fn h_withdrawunlocktransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let address = as_string(params, 2)?;
        let key_a = as_string(params, 3)?;
        let key_s = as_string(params, 4)?;
        let value = as_string(params, 5)?;
        let fee = as_string(params, 6)?;
        let s = as_string(params, 7)?;

        let commitment = Hash256::from_hex_reverse(&key_a).map_err(|_| RpcError::InvalidParameter)?;
        let pubkey = hex::decode(&key_s).map_err(|_| RpcError::InvalidParameter)?;
        let script = contract::create_withdraw_unlock_script_redeem_script(&commitment, &pubkey);
        let mut tx = self
            .builder(asset_id)
            .build_script_transfer(from, &fee, &[(&address, &value)], script)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Self::attach_memo(&mut tx, &s)?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }

    fn h_deposittosidetransaction(&self, params: &[Value]) -> Result<Value, RpcError> {
        let asset_id = Self::parse_asset(&as_string(params, 0)?)?;
        let from = Self::parse_address(&as_string(params, 1)?)?;
        let address = as_string(params, 2)?;
        let key_a = as_string(params, 3)?;
        let _key_s = as_string(params, 4)?; // reserved: unused by the plain single-key deposit script
        let value = as_string(params, 5)?;
        let fee = as_string(params, 6)?;
        let s = as_string(params, 7)?;

        let pubkey = hex::decode(&key_a).map_err(|_| RpcError::InvalidParameter)?;
        let script = contract::create_deposit_script_redeem_script(&pubkey);
        let mut tx = self
            .builder(asset_id)
            .build_script_transfer(from, &fee, &[(&address, &value)], script)
            .map_err(|e| txbuilder_err_to_rpc(&e))?;
        Self::attach_memo(&mut tx, &s)?;
        Ok(json!(hex::encode(tx.to_bytes())))
    }
}

fn txbuilder_err_to_rpc(e: &txbuilder_error::ErrorKind) -> RpcError {
    match e {
        txbuilder_error::ErrorKind::InvalidFee => RpcError::InvalidParameter,
        txbuilder_error::ErrorKind::InvalidAddress(_) => RpcError::InvalidParameter,
        txbuilder_error::ErrorKind::NilOutputs => RpcError::InvalidParameter,
        txbuilder_error::ErrorKind::InsufficientFunds => RpcError::Failed,
        txbuilder_error::ErrorKind::NoLocalSigner => RpcError::Failed,
    }
}

fn mining_err_to_rpc(e: &mining::error::ErrorKind) -> RpcError {
    match e {
        mining::error::ErrorKind::InvalidHash => RpcError::InvalidHash,
        mining::error::ErrorKind::NoTransactions => RpcError::Failed,
        mining::error::ErrorKind::ConsensusRejected => RpcError::InvalidBlock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::block::{merkle_root, BlockHeader};
    use crate::mining::error::MiningResult;
    use crate::mining::traits::{ChainView, MempoolView};
    use crate::tx::{Payload, TxOutput, TxType, UtxoInput};

    struct FakeStore {
        height: Mutex<u32>,
        blocks_by_height: Mutex<HashMap<u32, Hash256>>,
        blocks: Mutex<HashMap<Hash256, Block>>,
        outputs: Mutex<HashMap<UtxoInput, TxOutput>>,
    }

    impl FakeStore {
        fn new() -> Self {
            FakeStore {
                height: Mutex::new(0),
                blocks_by_height: Mutex::new(HashMap::new()),
                blocks: Mutex::new(HashMap::new()),
                outputs: Mutex::new(HashMap::new()),
            }
        }
    }

    impl ChainQuery for FakeStore {
        fn height(&self) -> u32 {
            *self.height.lock().unwrap()
        }

        fn best_block_hash(&self) -> Hash256 {
            let h = self.height();
            self.blocks_by_height.lock().unwrap().get(&h).copied().unwrap_or(Hash256::ZERO)
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
                if let Some(tx) = block.get_txn(*hash) {
                    return Some((tx.clone(), block.header.height, block.header.timestamp));
                }
            }
            None
        }

        fn get_output(&self, input: &UtxoInput) -> Option<TxOutput> {
            self.outputs.lock().unwrap().get(input).cloned()
        }
    }

    impl ChainView for FakeStore {
        fn height(&self) -> u32 {
            ChainQuery::height(self)
        }

        fn best_block_hash(&self) -> Hash256 {
            ChainQuery::best_block_hash(self)
        }

        fn append_block(&self, block: Block) -> MiningResult<()> {
            let height = block.header.height;
            let hash = block.hash();
            *self.height.lock().unwrap() = height;
            self.blocks_by_height.lock().unwrap().insert(height, hash);
            self.blocks.lock().unwrap().insert(hash, block);
            Ok(())
        }
    }

    /// Shared between the dispatcher and the mining coordinator, like the real
    /// mempool would be — `sendtransaction`/`sendrawtransaction` feed the same
    /// pool `createauxblock` collects from.
    struct FakeMempool {
        txs: Mutex<Vec<Transaction>>,
    }

    impl FakeMempool {
        fn new() -> Self {
            FakeMempool { txs: Mutex::new(Vec::new()) }
        }
    }

    impl MempoolQuery for FakeMempool {
        fn all_transactions(&self) -> Vec<Transaction> {
            self.txs.lock().unwrap().clone()
        }

        fn accept(&self, tx: Transaction) -> Result<(), String> {
            self.txs.lock().unwrap().push(tx);
            Ok(())
        }
    }

    impl MempoolView for FakeMempool {
        fn collect_transactions(&self) -> Vec<Transaction> {
            self.txs.lock().unwrap().clone()
        }

        fn transaction_count(&self) -> usize {
            self.txs.lock().unwrap().len()
        }
    }

    struct FakePeers;

    impl PeerView for FakePeers {
        fn connection_count(&self) -> u32 {
            3
        }

        fn neighbors(&self) -> Vec<String> {
            vec!["127.0.0.1:20866".to_owned()]
        }

        fn node_id(&self) -> u64 {
            42
        }

        fn node_version(&self) -> u32 {
            1
        }
    }

    fn dispatcher() -> (RpcDispatcher, Arc<FakeStore>, Arc<FakeMempool>) {
        let store = Arc::new(FakeStore::new());
        let wallet = Arc::new(Wallet::new());
        let mempool = Arc::new(FakeMempool::new());
        let mining = Arc::new(MiningCoordinator::new(store.clone(), mempool.clone(), 0x207f_ffff));

        let disp = RpcDispatcher::new(
            store.clone(),
            store.clone(),
            mempool.clone(),
            wallet,
            mining,
            Arc::new(FakePeers),
            NodeConfig::default(),
        );
        (disp, store, mempool)
    }

    #[test]
    fn unknown_method_fails_closed() {
        let (disp, _, _) = dispatcher();
        let resp = disp.dispatch("notamethod", &[]);
        assert_eq!(resp.result, Value::Null);
        assert_ne!(resp.error, Value::Null);
    }

    #[test]
    fn getblockcount_is_height_plus_one() {
        let (disp, _, _) = dispatcher();
        let resp = disp.dispatch("getblockcount", &[]);
        assert_eq!(resp.result, json!(1));
    }

    #[test]
    fn addaccount_then_deleteaccount_round_trips() {
        let (disp, _, _) = dispatcher();
        let resp = disp.dispatch("addaccount", &[]);
        let address = resp.result.as_str().unwrap().to_owned();

        let resp = disp.dispatch("deleteaccount", &[json!(address)]);
        assert_eq!(resp.result, json!(true));

        let resp = disp.dispatch("deleteaccount", &[json!(address)]);
        assert!(resp.error.is_object());
    }

    #[test]
    fn sendtransaction_type_mismatch_is_invalid_parameter() {
        let (disp, _, _) = dispatcher();
        let resp = disp.dispatch("sendtransaction", &[json!(1), json!(2), json!(3), json!(4), json!(5)]);
        let err = resp.error.as_object().unwrap();
        assert_eq!(err["message"], "invalid parameter");
    }

    #[test]
    fn createauxblock_then_submitauxblock_clears_cache() {
        let (disp, _store, mempool) = dispatcher();
        let addr = Wallet::new().create_account().unwrap().to_address();

        // seed the mempool so generate_aux_block has something to collect.
        let sample = Transaction {
            tx_type: TxType::TransferAsset,
            payload_version: 0,
            payload: Payload::TransferAsset,
            attributes: Vec::new(),
            utxo_inputs: Vec::new(),
            balance_inputs: Vec::new(),
            outputs: Vec::new(),
            programs: Vec::new(),
            lock_time: 0,
        };
        mempool.accept(sample).unwrap();

        let resp = disp.dispatch("createauxblock", &[json!(addr.clone())]);
        let hash = resp.result["hash"].as_str().unwrap().to_owned();
        assert!(resp.error.is_null());

        let resp = disp.dispatch("submitauxblock", &[json!(hash), json!("aabb")]);
        assert_eq!(resp.result, json!(true));
        assert_eq!(disp.mining.cache_len(), 0);
    }

    #[test]
    fn getblock_unknown_height_is_unknown_block() {
        let (disp, _, _) = dispatcher();
        let resp = disp.dispatch("getblock", &[json!(5)]);
        let err = resp.error.as_object().unwrap();
        assert_eq!(err["message"], "unknown block");
    }

    #[test]
    fn getbestblockhash_reflects_appended_block() {
        let (disp, store, _) = dispatcher();
        let header = BlockHeader {
            version: 1,
            prev_block_hash: Hash256::ZERO,
            merkle_root: merkle_root(&[Hash256::sha256d(b"only-tx")]),
            timestamp: 1,
            bits: 0x207f_ffff,
            height: 1,
            nonce: 0,
            aux_pow: Vec::new(),
        };
        let block = Block {
            header,
            transactions: Vec::new(),
        };
        let expected = block.hash();
        ChainView::append_block(store.as_ref(), block).unwrap();

        let resp = disp.dispatch("getbestblockhash", &[]);
        assert_eq!(resp.result, json!(expected.to_hex_reverse()));
    }
}
