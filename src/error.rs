use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid tenant document: {0}")]
    Document(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed: {0}")]
    Malformed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not provisioned: {0}")]
    NotProvisioned(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Upstream(format!("request timed out: {e}"))
        } else {
            Error::Upstream(e.to_string())
        }
    }
}

impl Error {
    /// Client-facing conditions that should never be retried.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Unauthorized(_)
                | Error::Malformed(_)
                | Error::BadRequest(_)
                | Error::NotProvisioned(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
