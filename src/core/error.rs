use thiserror::Error;

/// Errors raised by the q-gram primitives.
///
/// All of these are configuration or input errors: they are reported at the
/// first violation and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QgramError {
    /// A symbol is not a rank of the alphabet in use.
    #[error("invalid symbol {symbol} at position {position}")]
    InvalidSymbol { symbol: u8, position: usize },
    /// A symbol inside one of the run's input sequences is invalid.
    #[error("invalid symbol {symbol} in sequence {sequence} at position {position}")]
    InvalidSequence {
        sequence: usize,
        position: usize,
        symbol: u8,
    },
    /// A window passed to the codec does not have length `q`.
    #[error("window length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// `alpha_size^q` does not fit into a 64-bit code.
    #[error("alphabet size {alpha_size} with q = {q} exceeds the 64-bit code range")]
    Range { alpha_size: usize, q: usize },
    /// A code lies outside `[0, alpha_size^q)`.
    #[error("code {code} is outside the code space")]
    CodeOutOfRange { code: u64 },
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),
    /// More distinct threads asked for a slot than the registry was sized for.
    #[error("all {capacity} thread slots are already bound")]
    SlotsExhausted { capacity: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
