use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller is not a party to the request, or the request is not in a
    /// state that permits the attempted transition.
    #[error("unauthorized")]
    Unauthorized,

    #[error("not enough tokens: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("no matching record found")]
    NoRecord,

    #[error("record with id already exists: {0}")]
    DuplicateId(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("state error: {0}")]
    StateError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
