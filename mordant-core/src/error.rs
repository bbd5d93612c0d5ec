/// Error type for codec tree operations.
///
/// Errors are `Clone` so that a failed context construction can be memoized
/// and reported identically to every caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A domain type or schema node is unknown to the runtime context.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Data does not fit the schema shape at this position.
    #[error("incorrect nesting: {0}")]
    IncorrectNesting(String),
    /// A scalar violates the constraints of its type definition.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// The schema or the domain model is inconsistent with itself.
    #[error("programming error: {0}")]
    Programming(String),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = CodecError> = std::result::Result<T, E>;
