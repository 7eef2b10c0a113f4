//! Error types for the Tava ABI model

/// Errors produced while decoding a signature-shape key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    /// The shape key was empty
    #[error("empty shape key")]
    EmptyKey,

    /// An unrecognized token was found in the shape key
    #[error("unrecognized shape token at byte {0}")]
    UnknownToken(usize),

    /// An aggregate token had a missing or malformed size
    #[error("aggregate size missing or malformed at byte {0}")]
    BadAggregateSize(usize),

    /// An aggregate token declared a zero size
    #[error("zero-sized aggregate at byte {0}")]
    ZeroSizedAggregate(usize),

    /// `v` (void) appeared in argument position
    #[error("void is only valid as a return type")]
    VoidArgument,
}
