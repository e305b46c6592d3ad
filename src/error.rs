use thiserror::Error;

/// Failure of a single page fetch. Always recoverable: the list rolls back
/// to idle and the next `request_next_page` retries the same cursor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("timed out")]
    Timeout,
    #[error("server responded {0}")]
    Status(u16),
    #[error("decode: {0}")]
    Decode(String),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// A create/edit/delete/react attempt that was refused or failed remotely.
/// Local state is never touched when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("not the owner")]
    NotOwner,
    #[error("not found")]
    NotFound,
    #[error("remove the existing reaction first")]
    ReactionConflict,
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("remote: {0}")]
    Remote(#[from] FetchError),
}

pub type MutationResult<T> = Result<T, MutationError>;

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}
