use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("nothing left to resume in {0}")]
    NothingToResume(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
