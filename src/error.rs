use std::path::PathBuf;

use deku::DekuError;
use thiserror::Error;

use crate::tag::Tag;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    IOError(#[from] std::io::Error),
    #[error("Deku parsing error")]
    DekuError(#[from] DekuError),
    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("Truncated data: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Chunk size mismatch: header says {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Invalid zlib stream")]
    ZlibError(miniz_oxide::inflate::DecompressError),
    #[error("Property {0} is not valid UTF-8")]
    InvalidProperty(Tag),
    #[error("Malformed {0} object: {1}")]
    MalformedObject(Tag, String),
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("Error reading {} as type {tag}", path.display())]
    GrabError { path: PathBuf, tag: Tag },
    #[error("Error updating {name}")]
    UpdateError {
        name: String,
        #[source]
        source: Box<Error>,
    },
    #[error("Error writing {}", path.display())]
    ExportError {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} is not a palette object")]
    NotAPalette(String),
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// True for errors caused by a malformed archive rather than the
    /// filesystem. Callers treat both the same way: the load fails.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::DekuError(_)
                | Error::BadMagic(_)
                | Error::Truncated { .. }
                | Error::SizeMismatch { .. }
                | Error::ZlibError(_)
                | Error::InvalidProperty(_)
                | Error::MalformedObject(..)
                | Error::UnsupportedImage(_)
        )
    }
}
