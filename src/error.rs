use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("GPX parse error: {0}")]
    Parse(String),

    #[error("track contains no points")]
    EmptyTrack,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to format timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
}

pub type Result<T> = std::result::Result<T, SplitError>;
