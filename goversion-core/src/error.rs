//! Error kinds surfaced by an extraction call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every error is terminal for the call that produced it. Binary layout
/// problems are deterministic, so nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// The leading magic bytes match no supported container.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container magic was recognised but its headers are inconsistent.
    #[error("corrupt container: {0}")]
    CorruptContainer(String),

    /// No build metadata record, legacy symbol, or release string was found.
    #[error("no build info found")]
    NoBuildInfoFound,

    /// A record was located but its contents point outside its bounds or are malformed.
    #[error("corrupt build info: {0}")]
    CorruptBuildInfo(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn corrupt_container<S: Into<String>>(msg: S) -> Self {
        Self::CorruptContainer(msg.into())
    }

    pub fn corrupt_build_info<S: Into<String>>(msg: S) -> Self {
        Self::CorruptBuildInfo(msg.into())
    }

    /// True for outcomes that mean "not a binary we can version" rather
    /// than a damaged input file.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::NoBuildInfoFound)
    }
}

impl From<goblin::error::Error> for Error {
    fn from(err: goblin::error::Error) -> Self {
        Error::CorruptContainer(err.to_string())
    }
}
