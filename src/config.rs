//! Shape of the configuration an embedder must supply to wire up an
//! [`crate::rpc::RpcDispatcher`] and a [`crate::mining::MiningCoordinator`].
//!
//! Reading this from a file or environment is out of scope (crate-level
//! Non-goals name configuration file loading as an external collaborator) —
//! this struct only fixes the shape callers populate it with, mirroring how
//! the teacher splits CLI argument shape (`command.rs`) from the config
//! loading it never implements beyond flags.

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Default payout address `createauxblock`/mining fall back to when an
    /// RPC call doesn't override it.
    pub pay_to_addr: String,
    /// Minimum spacing, in seconds, `generateAuxBlock` waits before treating
    /// a cached template as stale. Mirrors `AUXBLOCK_GENERATED_INTERVAL_SECONDS`.
    pub aux_interval_secs: u64,
    /// Gas ceiling the script VM enforces per witness program.
    pub gas_limit: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            pay_to_addr: String::new(),
            aux_interval_secs: crate::mining::AUXBLOCK_GENERATED_INTERVAL_SECONDS as u64,
            gas_limit: crate::script::GAS_LIMIT,
        }
    }
}
