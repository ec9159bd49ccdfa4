use std::fmt;

pub type TxBuilderResult<T> = Result<T, TxBuilderError>;
pub type TxBuilderError = Box<ErrorKind>;

#[derive(Debug)]
pub enum ErrorKind {
    /// Fee parsed to zero or negative.
    InvalidFee,
    /// An output's address string didn't base58check-decode to a program hash.
    InvalidAddress(String),
    /// Eligible coins summed to less than fee + outputs after exhausting the
    /// selector's stream.
    InsufficientFunds,
    /// No held account matches any program hash this transaction still needs
    /// signed.
    NoLocalSigner,
    /// Caller requested a transaction with zero outputs.
    NilOutputs,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidFee => write!(f, "fee must be a positive amount"),
            ErrorKind::InvalidAddress(addr) => write!(f, "invalid address: {}", addr),
            ErrorKind::InsufficientFunds => write!(f, "insufficient funds"),
            ErrorKind::NoLocalSigner => write!(f, "no local account can sign this transaction"),
            ErrorKind::NilOutputs => write!(f, "transaction must have at least one output"),
        }
    }
}

impl std::error::Error for ErrorKind {}
