use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("channel stayed closed after {attempts} reopen attempts")]
    Interrupted {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("channel closed underneath an operation and reopening failed: {original}")]
    ReopenFailed {
        /// The closed-channel failure the reopen tried to heal.
        original: io::Error,
        #[source]
        source: Box<SwapError>,
    },

    #[error("could not acquire exclusive lock on {}", path.display())]
    FileLock {
        path: PathBuf,
        #[source]
        source: Option<io::Error>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("page swapper for {} is closed", path.display())]
    Closed { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, SwapError>;
