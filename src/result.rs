//! Error types and the related `Result<T>`

use std::io;

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] io::Error),

    /// The archive contained invalid data per the spec.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// The caller broke the usage contract
    /// (wrote to a finished archive, exceeded a field size cap, ...).
    /// Already-finalized entries remain valid.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// No entry in the collection matched the given name
    #[error("No entry in the collection with the name {0}")]
    NoSuchEntry(String),

    /// The collection was closed
    #[error("Collection is closed")]
    CollectionClosed,
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => e,
            ZipError::InvalidState(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
