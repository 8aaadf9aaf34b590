use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IioError>;

#[derive(Debug, Error)]
pub enum IioError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("channel {0} has no decodable scan format")]
    UnsupportedFormat(String),
    #[error("record truncated: needed {needed} bytes, got {got}")]
    TruncatedRecord { needed: usize, got: usize },
    #[error("unparseable value {0:?}")]
    BadValue(String),
    #[error("invalid iio device id {0:?}")]
    InvalidDeviceId(String),
    #[error("no channels enabled for capture")]
    NothingEnabled,
}

impl IioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IioError::Io {
            path: path.into(),
            source,
        }
    }
}
