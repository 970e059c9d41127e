//! Lazy decode-and-cache reader for per-face texture files.
//!
//! A file stores one small raster per mesh face, in mip levels, optionally
//! tiled and zlib-compressed per face. [`Reader`] opens a file by reading its
//! tables only, then decodes faces and tiles on demand:
//!
//! - **Stored levels** are used when they hold the requested resolution
//! - **Reductions** synthesize any smaller resolution and are cached per
//!   face and resolution
//! - **Tiles** decode independently; reduced tiled faces stay lazy
//! - **Edits** appended after the base image replace faces and metadata
//!
//! Memory held by decoded data is tracked in [`Reader::mem_used`] and
//! released with [`Reader::purge`] (decoded data) or [`Reader::prune`]
//! (everything, including the file handle). Handles may be closed at any
//! time with [`Reader::try_close`]; the next read reopens the file.
//!
//! I/O goes through a pluggable [`ptex_io::InputHandler`], set with
//! [`ReaderOptions::with_handler`].

mod directory;
mod edit;
pub mod error;
mod face;
mod file;
pub mod filter;
mod format;
mod level;
mod metadata;
mod options;
mod reader;
mod reduction;
mod source;

pub use crate::face::{ConstantFace, FaceData, PackedFace, TiledFace, TiledReducedFace};
pub use crate::filter::{ReduceFn, Reducer};
pub use crate::format::{
    BorderMode, DataType, EdgeFilterMode, Encoding, ExtHeader, FaceDataHeader, FaceInfo, Header, LevelInfo,
    MeshType, MetaDataType, Res,
};
pub use crate::metadata::{MetaData, MetaValue};
pub use crate::options::ReaderOptions;
pub use crate::reader::{CacheStats, Reader};
