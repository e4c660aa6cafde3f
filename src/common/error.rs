use thiserror::Error;

/// Result type for jfluent operations
pub type Result<T> = std::result::Result<T, Error>;

/// The two failure classes of an assembly.
///
/// `InvalidInput` means the caller asked for an ill-typed or impossible construct;
/// retrying with the same input fails the same way. `Internal` means a composed
/// fragment broke a stack-balance invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Internal,
}

/// Error types for method assembly
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("no legal conversion from {from} to {to}")]
    NoConversion { from: String, to: String },

    #[error("illegal cast from {from} to {to}")]
    IllegalCast { from: String, to: String },

    #[error("cannot compare primitive to null ({ty})")]
    NullComparedToPrimitive { ty: String },

    #[error("unresolved local: {name}")]
    UnresolvedLocal { name: String },

    #[error("unresolved member {owner}.{name}({args})")]
    UnresolvedMember {
        owner: String,
        name: String,
        args: String,
    },

    #[error("{member} is not accessible from {from}")]
    Inaccessible { member: String, from: String },

    #[error("static/instance mismatch: {message}")]
    StaticMismatch { message: String },

    #[error("incompatible conditional branch types: {then_ty} and {else_ty}")]
    IncompatibleBranches { then_ty: String, else_ty: String },

    #[error("self type referenced before the class under construction was named")]
    UnresolvedSelfType,

    #[error("invalid descriptor: {descriptor}")]
    InvalidDescriptor { descriptor: String },

    #[error("branch target too far: {offset}")]
    BranchTooFar { offset: i64 },

    #[error("method code too large: {size} bytes")]
    CodeTooLarge { size: usize },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create an internal-invariant error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn static_mismatch(message: impl Into<String>) -> Self {
        Self::StaticMismatch { message: message.into() }
    }

    pub fn no_conversion(from: impl ToString, to: impl ToString) -> Self {
        Self::NoConversion { from: from.to_string(), to: to.to_string() }
    }

    pub fn illegal_cast(from: impl ToString, to: impl ToString) -> Self {
        Self::IllegalCast { from: from.to_string(), to: to.to_string() }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Internal { .. } => ErrorKind::Internal,
            _ => ErrorKind::InvalidInput,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}
