//! Error taxonomy for lifecycle operations
use super::state::Status;

/// Shorthand for results carrying the marketplace error taxonomy.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every expected rule violation maps onto one of these kinds so a caller
/// can tell wrong-state from wrong-role from not-found without parsing
/// message text.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("illegal transition: required state {required}, current state {current}")]
    InvalidState {
        required: &'static str,
        current: Status,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected storage or codec failure. The wrapped error is logged at
    /// the failure site; its detail is not part of the caller-facing message.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<minicbor::decode::Error> for Error {
    fn from(err: minicbor::decode::Error) -> Self {
        Self::Internal(anyhow::anyhow!("cbor decode failed: {err}"))
    }
}

impl<W: std::fmt::Display> From<minicbor::encode::Error<W>> for Error {
    fn from(err: minicbor::encode::Error<W>) -> Self {
        Self::Internal(anyhow::anyhow!("cbor encode failed: {err}"))
    }
}

impl From<sled::transaction::TransactionError<Error>> for Error {
    fn from(err: sled::transaction::TransactionError<Error>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => err.into(),
        }
    }
}
