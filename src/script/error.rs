use std::fmt;

pub type ScriptResult<T> = Result<T, ScriptError>;
pub type ScriptError = Box<ErrorKind>;

/// Failure modes of the witness VM, from shape-check through execution.
#[derive(Debug)]
pub enum ErrorKind {
    /// `toCodeHash(code, sigType)` didn't match the program hash carried by the input.
    ScriptHashMismatch,
    /// The program hash's prefix byte wasn't `0x12` or `0x21`.
    InvalidAddressPrefix(u8),
    /// Engine halted with a falsy or missing top-of-stack result, or didn't reach
    /// exactly one item on the stack.
    VmVerificationFailed,
    /// Gas was exhausted before the engine reached `EngineState::Halt`.
    OutOfGas,
    /// Multisig script was malformed (bad m/n counts, signature count mismatch).
    InvalidMultisig,
    /// Pop/peek against an empty stack, push past the stack depth limit, or a
    /// malformed opcode stream.
    Fault(&'static str),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ScriptHashMismatch => write!(f, "redeem script does not match program hash"),
            ErrorKind::InvalidAddressPrefix(b) => write!(f, "invalid address prefix: {:#04x}", b),
            ErrorKind::VmVerificationFailed => write!(f, "script verification failed"),
            ErrorKind::OutOfGas => write!(f, "script exceeded gas limit"),
            ErrorKind::InvalidMultisig => write!(f, "malformed multisig script"),
            ErrorKind::Fault(msg) => write!(f, "script fault: {}", msg),
        }
    }
}

impl std::error::Error for ErrorKind {}
