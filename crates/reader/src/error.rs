//! Reader Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::format::Res;
use derive_more::{Display, Error};
use ptex_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};
use ptex_io::error::Error as InputError;

/// A reader error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file does not start with the expected magic number.
    #[display("not a per-face texture file")]
    BadMagic,
    /// The file was written by a newer, incompatible format revision.
    #[display("unsupported format version: {_0}")]
    UnsupportedVersion(#[error(not(source))] u32),
    /// A table or record is structurally broken.
    #[display("malformed file: {_0}")]
    Malformed(#[error(not(source))] &'static str),
    /// The file ended before a block that the tables promised.
    #[display("short read: wanted {wanted} bytes at offset {offset}, got {got}")]
    ShortRead {
        /// Absolute file offset of the read.
        offset: u64,
        /// Bytes requested.
        wanted: usize,
        /// Bytes actually available.
        got: usize,
    },
    /// The input handler failed to open, seek or read.
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
    /// The file was replaced on disk while its handle was closed.
    #[display("header mismatch on reopen")]
    HeaderMismatch,
    /// A compressed block failed to decode.
    #[display("corrupt block: {_0}")]
    Compression(CompressionErrorKind),
    /// A face id beyond the face table.
    #[display("face id {_0} out of range")]
    FaceOutOfRange(#[error(not(source))] usize),
    /// A tile index beyond the tile grid, or a tile request on an untiled face.
    #[display("tile {_0} out of range")]
    TileOutOfRange(#[error(not(source))] usize),
    /// A texel coordinate outside the face.
    #[display("pixel ({u}, {v}) out of range")]
    PixelOutOfRange {
        /// Texel column.
        u: usize,
        /// Texel row.
        v: usize,
    },
    /// A resolution that can't be produced from the stored data.
    #[display("unsupported resolution {res}: {reason}")]
    UnsupportedResolution {
        /// The requested resolution.
        res: Res,
        /// Why it can't be produced.
        reason: &'static str,
    },
    /// A caller-supplied buffer is too small for the requested data.
    #[display("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes supplied.
        got: usize,
    },
    /// A previous I/O failure invalidated the reader.
    #[display("reader is invalid: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Convert a compression error into a reader error, preserving the
    /// compress crate's `Exn` frame (error tree) as a child in its own
    /// error tree.
    #[track_caller]
    pub fn compression(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Compression(inner))
    }

    /// Convert an input handler error into a reader error, keeping the
    /// handler's frame as a child.
    #[track_caller]
    pub fn io(err: InputError) -> Error {
        let message = (*err).to_string();
        err.raise(ErrorKind::Io(message))
    }

    /// Returns `true` if retrying might succeed.
    ///
    /// I/O failures are usually descriptor pressure; a later reopen may work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Invalid(_))
    }

    /// Returns `true` if the failure invalidates the whole reader rather than
    /// just the operation that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BadMagic
                | Self::UnsupportedVersion(_)
                | Self::ShortRead { .. }
                | Self::Io(_)
                | Self::HeaderMismatch
                | Self::Invalid(_)
        )
    }
}
