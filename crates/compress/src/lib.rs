//! Block codecs for per-face texture payloads.
//!
//! Face, tile, table and metadata blocks are stored either verbatim or as a
//! single zlib stream. This crate wraps both behind a unified [`Compression`]
//! enum, providing:
//!
//! - **In-memory** compression/decompression ([`Compression::compress`],
//!   [`Compression::decompress`])
//! - **Exact-size** inflation ([`Compression::decompress_exact`]) for blocks
//!   whose decoded size is implied by the surrounding tables rather than
//!   stored with the block itself
//!
//! Compression uses the highest zlib level; files are written once and read
//! many times.

pub mod error;
mod ops;
mod util;

/// A supported block encoding.
///
/// Defaults to [`None`](Self::None) (stored verbatim).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Single zlib (RFC 1950) stream
    Zlib,
}
