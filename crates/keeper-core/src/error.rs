use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("queue is not ready")]
    NotReady,

    #[error("no box available to serve")]
    EmptyPool,

    #[error("box not found: {0}")]
    BoxNotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("operation timed out")]
    Timeout,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KeeperError {
    /// Whether a caller may reasonably retry the same operation later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KeeperError::NotReady
                | KeeperError::EmptyPool
                | KeeperError::StoreUnavailable(_)
                | KeeperError::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;
