use std::fmt;

pub type MiningResult<T> = Result<T, MiningError>;
pub type MiningError = Box<ErrorKind>;

#[derive(Debug)]
pub enum ErrorKind {
    /// `submitAuxBlock` was given a hash that isn't (or is no longer) in the cache.
    InvalidHash,
    /// The mempool had nothing to collect into a fresh template.
    NoTransactions,
    /// The chain rejected an otherwise well-formed sealed block.
    ConsensusRejected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidHash => write!(f, "unknown or already-submitted template hash"),
            ErrorKind::NoTransactions => write!(f, "no transactions available to build a block"),
            ErrorKind::ConsensusRejected => write!(f, "chain rejected the submitted block"),
        }
    }
}

impl std::error::Error for ErrorKind {}
