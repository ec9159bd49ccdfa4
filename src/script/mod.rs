//! Stack-based witness script VM.
//!
//! Scripts are flat opcode streams, Bitcoin-style: bytes `0x01..=0x4b` push that many
//! literal bytes, `0x4c` (`OP_PUSHDATA1`) pushes a one-byte-length-prefixed blob, and
//! everything `>= 0x51` is a named opcode. This crate's redeem scripts never nest
//! `IF`/`ELSE`, so the branch handling below only needs to skip to the next `ELSE`
//! or `ENDIF` at the same level, not a full control-flow stack.

pub mod crypto;
pub mod error;

use crate::hash::{Hash168, Hash256, PREFIX_SCRIPT, PREFIX_SINGLE_SIG};
use crypto::Crypto;
use error::ErrorKind;

pub use error::{ScriptError, ScriptResult};

/// Opcode gas budget for a single program's code + parameter execution.
pub const GAS_LIMIT: u64 = 1200;
const MAX_STACK_SIZE: usize = 2048;

pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CHECKHEIGHT: u8 = 0xb1;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

pub type StackItem = Vec<u8>;

fn is_truthy(item: &StackItem) -> bool {
    item.iter().any(|&b| b != 0)
}

pub fn push_int(out: &mut Vec<u8>, n: u8) {
    assert!((1..=16).contains(&n));
    out.push(OP_1 + (n - 1));
}

/// Appends a length-prefixed literal push of `data` to `out`.
pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    if data.len() < OP_PUSHDATA1 as usize {
        out.push(data.len() as u8);
    } else if data.len() <= u8::MAX as usize {
        out.push(OP_PUSHDATA1);
        out.push(data.len() as u8);
    } else {
        panic!("script push data too large");
    }
    out.extend_from_slice(data);
}

/// A single witness program: the redeem script plus the data used to satisfy it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub code: Vec<u8>,
    pub parameter: Vec<u8>,
}

/// Contract for anything the VM can verify signatures over: a canonical hash to
/// check signatures against, plus the ordered list of program hashes the
/// transaction's programs must each satisfy.
pub trait SignableData {
    fn signable_hash(&self) -> Hash256;
    fn program_hashes(&self) -> Vec<Hash168>;
    fn programs(&self) -> &[Program];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Halt,
    Fault,
    Break,
}

/// Executes a single program's `parameter` then `code` against a shared stack and
/// gas budget.
pub struct ExecutionEngine<'a> {
    stack: Vec<StackItem>,
    gas: u64,
    signable_hash: Hash256,
    crypto: &'a dyn Crypto,
    current_height: u32,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(signable_hash: Hash256, crypto: &'a dyn Crypto, gas_limit: u64) -> Self {
        ExecutionEngine {
            stack: Vec::new(),
            gas: gas_limit,
            signable_hash,
            crypto,
            current_height: 0,
        }
    }

    /// Loads `parameter` as literal pushes directly onto the stack (it is restricted
    /// to push-only opcodes by construction — signatures and the deposit/withdraw
    /// branch selector).
    pub fn load_parameter(&mut self, parameter: &[u8]) -> ScriptResult<()> {
        for item in parse_pushes(parameter)? {
            self.push(item)?;
            self.spend_gas()?;
        }
        Ok(())
    }

    /// Loads and executes `code` against the current stack.
    pub fn load_code_and_execute(&mut self, code: &[u8]) -> ScriptResult<EngineState> {
        let mut pc = 0;
        while pc < code.len() {
            let op = code[pc];
            self.spend_gas()?;

            if op <= OP_PUSHDATA1 {
                let (item, next) = read_push(code, pc)?;
                self.push(item)?;
                pc = next;
                continue;
            }

            pc += 1;
            match op {
                OP_1..=OP_16 => self.push(vec![op - OP_1 + 1])?,
                OP_NOP => {}
                OP_DROP => {
                    self.pop()?;
                }
                OP_DUP => {
                    let top = self.peek()?.clone();
                    self.push(top)?;
                }
                OP_SWAP => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(Box::new(ErrorKind::Fault("swap on <2 items")));
                    }
                    self.stack.swap(len - 1, len - 2);
                }
                OP_EQUAL => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(vec![(a == b) as u8])?;
                }
                OP_EQUALVERIFY => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    if a != b {
                        return Ok(EngineState::Fault);
                    }
                }
                OP_HASH160 => {
                    let item = self.pop()?;
                    let hash = Hash168::new(PREFIX_SINGLE_SIG, &item);
                    self.push(hash.0.to_vec())?;
                }
                OP_HASH256 => {
                    let item = self.pop()?;
                    let hash = Hash256::sha256d(&item);
                    self.push(hash.0.to_vec())?;
                }
                OP_CHECKHEIGHT => {
                    let item = self.pop()?;
                    let lock_height = read_height(&item)?;
                    self.push(vec![(lock_height <= self.current_height()) as u8])?;
                }
                OP_CHECKSIG => {
                    let pubkey = self.pop()?;
                    let sig = self.pop()?;
                    let ok = self.crypto.check_sig(&pubkey, &self.signable_hash, &sig);
                    self.push(vec![ok as u8])?;
                }
                OP_CHECKMULTISIG => {
                    self.exec_checkmultisig()?;
                }
                OP_VERIFY => {
                    let top = self.pop()?;
                    if !is_truthy(&top) {
                        return Ok(EngineState::Fault);
                    }
                }
                OP_IF => {
                    let cond = is_truthy(&self.pop()?);
                    if !cond {
                        pc = skip_to(code, pc, &[OP_ELSE, OP_ENDIF])?;
                        if code.get(pc) == Some(&OP_ELSE) {
                            pc += 1;
                        }
                    }
                }
                OP_ELSE => {
                    pc = skip_to(code, pc, &[OP_ENDIF])?;
                }
                OP_ENDIF => {}
                _ => return Err(Box::new(ErrorKind::Fault("unknown opcode"))),
            }
        }

        if self.stack.len() != 1 {
            return Ok(EngineState::Fault);
        }
        Ok(EngineState::Halt)
    }

    /// The chain height visible to `CHECKHEIGHT`. Fixed at zero here: this crate's
    /// redeem scripts are always evaluated with the lock height already pushed as a
    /// literal by the caller, and the comparison side (best chain height) is supplied
    /// by whichever `ChainView` constructed this engine — callers needing a live
    /// height should push it via [`ExecutionEngine::set_current_height`] before
    /// executing.
    fn current_height(&self) -> u32 {
        self.current_height
    }

    /// Pops `n`, the `n` candidate pubkeys, `m`, then exactly `m` signatures — this
    /// crate's redeem scripts always have the spender supply exactly the threshold
    /// number of signatures, never more.
    fn exec_checkmultisig(&mut self) -> ScriptResult<()> {
        let n = read_small_int(&self.pop()?)?;
        let mut pubkeys = Vec::with_capacity(n as usize);
        for _ in 0..n {
            pubkeys.push(self.pop()?);
        }
        pubkeys.reverse();

        let m = read_small_int(&self.pop()?)?;
        let mut sigs = Vec::with_capacity(m as usize);
        for _ in 0..m {
            sigs.push(self.pop()?);
        }
        sigs.reverse();

        let ok = crypto::check_multisig(self.crypto, &pubkeys, m as usize, &self.signable_hash, &sigs);
        self.push(vec![ok as u8])
    }

    fn spend_gas(&mut self) -> ScriptResult<()> {
        if self.gas == 0 {
            return Err(Box::new(ErrorKind::OutOfGas));
        }
        self.gas -= 1;
        Ok(())
    }

    fn push(&mut self, item: StackItem) -> ScriptResult<()> {
        if self.stack.len() >= MAX_STACK_SIZE {
            return Err(Box::new(ErrorKind::Fault("stack overflow")));
        }
        self.stack.push(item);
        Ok(())
    }

    fn pop(&mut self) -> ScriptResult<StackItem> {
        self.stack.pop().ok_or_else(|| Box::new(ErrorKind::Fault("pop on empty stack")) as ScriptError)
    }

    fn peek(&self) -> ScriptResult<&StackItem> {
        self.stack.last().ok_or_else(|| Box::new(ErrorKind::Fault("peek on empty stack")) as ScriptError)
    }
}

// `current_height` is read through a plain field so callers (mining/tx-builder
// tests) can construct an engine against a fixed chain height without a trait.
impl<'a> ExecutionEngine<'a> {
    pub fn set_current_height(&mut self, height: u32) {
        self.current_height = height;
    }
}

fn read_height(item: &[u8]) -> ScriptResult<u32> {
    let mut buf = [0u8; 4];
    let n = item.len().min(4);
    buf[..n].copy_from_slice(&item[..n]);
    Ok(u32::from_le_bytes(buf))
}

fn read_small_int(item: &[u8]) -> ScriptResult<u8> {
    item.first().copied().ok_or_else(|| Box::new(ErrorKind::Fault("expected small int")) as ScriptError)
}

/// Reads one push instruction starting at `code[pc]`, returning the pushed bytes
/// and the index just past it.
pub(crate) fn read_push(code: &[u8], pc: usize) -> ScriptResult<(StackItem, usize)> {
    let op = code[pc];
    if op == OP_PUSHDATA1 {
        let len_pos = pc + 1;
        let len = *code.get(len_pos).ok_or_else(|| Box::new(ErrorKind::Fault("truncated PUSHDATA1")) as ScriptError)? as usize;
        let start = len_pos + 1;
        let end = start + len;
        let data = code.get(start..end).ok_or_else(|| Box::new(ErrorKind::Fault("truncated push data")) as ScriptError)?;
        Ok((data.to_vec(), end))
    } else {
        let len = op as usize;
        let start = pc + 1;
        let end = start + len;
        let data = code.get(start..end).ok_or_else(|| Box::new(ErrorKind::Fault("truncated push data")) as ScriptError)?;
        Ok((data.to_vec(), end))
    }
}

/// Decodes a push-only byte string (a `Program::parameter`) into its individual
/// pushed items — used both to seed the VM's initial stack and, outside
/// execution, to count/compare signatures already attached to a multisig
/// program.
pub(crate) fn parse_pushes(data: &[u8]) -> ScriptResult<Vec<StackItem>> {
    let mut items = Vec::new();
    let mut pc = 0;
    while pc < data.len() {
        let (item, next) = read_push(data, pc)?;
        items.push(item);
        pc = next;
    }
    Ok(items)
}

/// Scans forward from an `IF`/`ELSE` at `pc` to the next opcode in `targets`,
/// skipping over any push-data payloads so opcode-valued bytes inside literals
/// aren't mistaken for control flow. Assumes scripts never nest `IF`.
fn skip_to(code: &[u8], pc: usize, targets: &[u8]) -> ScriptResult<usize> {
    let mut i = pc + 1;
    while i < code.len() {
        let op = code[i];
        if targets.contains(&op) {
            return Ok(i);
        }
        if op < OP_PUSHDATA1 {
            i += 1 + op as usize;
        } else if op == OP_PUSHDATA1 {
            let len = *code.get(i + 1).ok_or_else(|| Box::new(ErrorKind::Fault("truncated PUSHDATA1")) as ScriptError)? as usize;
            i += 2 + len;
        } else {
            i += 1;
        }
    }
    Err(Box::new(ErrorKind::Fault("missing ELSE/ENDIF")))
}

/// Implements the prefix-dispatch verification algorithm: for each program hash the
/// data requires, confirm the matching program's redeem script hashes to it, then
/// execute parameter + code and require a single truthy value left on the stack.
pub fn verify_signable(data: &dyn SignableData, crypto: &dyn Crypto) -> ScriptResult<()> {
    let hashes = data.program_hashes();
    let programs = data.programs();
    if hashes.len() != programs.len() {
        return Err(Box::new(ErrorKind::Fault("program count mismatch")));
    }

    for (hash, program) in hashes.iter().zip(programs.iter()) {
        match hash.prefix() {
            PREFIX_SINGLE_SIG | PREFIX_SCRIPT => {}
            other => return Err(Box::new(ErrorKind::InvalidAddressPrefix(other))),
        }

        let code_hash = Hash168::new(hash.prefix(), &program.code);
        if &code_hash != hash {
            return Err(Box::new(ErrorKind::ScriptHashMismatch));
        }

        let mut engine = ExecutionEngine::new(data.signable_hash(), crypto, GAS_LIMIT);
        engine.load_parameter(&program.parameter)?;
        let state = engine.load_code_and_execute(&program.code)?;

        if state != EngineState::Halt {
            return Err(Box::new(ErrorKind::VmVerificationFailed));
        }
        if engine.stack.len() != 1 || !is_truthy(&engine.stack[0]) {
            return Err(Box::new(ErrorKind::VmVerificationFailed));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::crypto::test_support::FakeCrypto;

    struct Fixture {
        hash: Hash256,
        hashes: Vec<Hash168>,
        programs: Vec<Program>,
    }

    impl SignableData for Fixture {
        fn signable_hash(&self) -> Hash256 {
            self.hash
        }
        fn program_hashes(&self) -> Vec<Hash168> {
            self.hashes.clone()
        }
        fn programs(&self) -> &[Program] {
            &self.programs
        }
    }

    fn single_sig_fixture(pubkey: &[u8]) -> Fixture {
        let mut code = Vec::new();
        push_data(&mut code, pubkey);
        code.push(OP_CHECKSIG);
        let hash = Hash168::new(PREFIX_SINGLE_SIG, &code);

        let mut parameter = Vec::new();
        push_data(&mut parameter, pubkey); // FakeCrypto treats sig==pubkey as valid

        Fixture {
            hash: Hash256::sha256d(b"tx"),
            hashes: vec![hash],
            programs: vec![Program { code, parameter }],
        }
    }

    #[test]
    fn single_sig_program_verifies() {
        let fixture = single_sig_fixture(b"pubkey-bytes");
        verify_signable(&fixture, &FakeCrypto).unwrap();
    }

    #[test]
    fn wrong_signature_fails() {
        let mut fixture = single_sig_fixture(b"pubkey-bytes");
        let mut bad_param = Vec::new();
        push_data(&mut bad_param, b"not-the-key");
        fixture.programs[0].parameter = bad_param;
        assert!(verify_signable(&fixture, &FakeCrypto).is_err());
    }

    #[test]
    fn mismatched_redeem_script_is_rejected() {
        let mut fixture = single_sig_fixture(b"pubkey-bytes");
        fixture.hashes[0] = Hash168::new(PREFIX_SINGLE_SIG, b"some other script");
        let err = verify_signable(&fixture, &FakeCrypto).unwrap_err();
        assert!(matches!(*err, ErrorKind::ScriptHashMismatch));
    }

    #[test]
    fn invalid_prefix_is_rejected() {
        let mut fixture = single_sig_fixture(b"pubkey-bytes");
        fixture.hashes[0].0[0] = 0x99;
        let err = verify_signable(&fixture, &FakeCrypto).unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidAddressPrefix(0x99)));
    }

    #[test]
    fn multisig_two_of_three_verifies() {
        let keys: Vec<Vec<u8>> = vec![b"key-a".to_vec(), b"key-b".to_vec(), b"key-c".to_vec()];
        let mut code = Vec::new();
        push_int(&mut code, 2);
        for k in &keys {
            push_data(&mut code, k);
        }
        push_int(&mut code, 3);
        code.push(OP_CHECKMULTISIG);
        let hash = Hash168::new(PREFIX_SCRIPT, &code);

        let mut parameter = Vec::new();
        push_data(&mut parameter, &keys[0]);
        push_data(&mut parameter, &keys[1]);

        let fixture = Fixture {
            hash: Hash256::sha256d(b"tx"),
            hashes: vec![hash],
            programs: vec![Program { code, parameter }],
        };
        verify_signable(&fixture, &FakeCrypto).unwrap();
    }
}
