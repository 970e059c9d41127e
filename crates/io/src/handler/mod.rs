//! Input handler trait and implementations.
//!
//! This module defines the [`InputHandler`] trait, which opens byte streams,
//! and the [`InputHandle`] trait, which reads from one. Implementations:
//! the buffered local filesystem ([`FileInputHandler`]) and, behind the
//! `mock` feature, an in-memory handler with access counters.

mod file;
#[cfg(feature = "mock")]
mod mock;

pub use self::file::FileInputHandler;
#[cfg(feature = "mock")]
pub use self::mock::{HandlerStats, MemoryInputHandler};
use crate::error::Result;
use std::path::Path;

/// Opens byte streams for a reader.
///
/// Handlers are shared between every reader that was given them, so all
/// methods take `&self`. A reader may call [`open`](Self::open) many times for
/// the same path over its lifetime: once at open, and again whenever its
/// handle was closed to relieve descriptor pressure.
///
/// # Examples
///
/// ```no_run
/// use ptex_io::{FileInputHandler, InputHandler, error::Result};
/// use std::path::Path;
///
/// fn magic(handler: &dyn InputHandler) -> Result<[u8; 4]> {
///     let mut handle = handler.open(Path::new("textures/body.ptx"))?;
///     let mut magic = [0u8; 4];
///     handle.read(&mut magic)?;
///     handle.close()?;
///     Ok(magic)
/// }
/// # magic(&FileInputHandler::default()).unwrap();
/// ```
pub trait InputHandler: Send + Sync {
    /// Name of the handler (used for logging only).
    fn name(&self) -> &str;

    /// Open `path` for reading, positioned at offset zero.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file does
    /// not exist.
    fn open(&self, path: &Path) -> Result<Box<dyn InputHandle>>;
}

/// An open byte stream.
///
/// Callers serialize access themselves (a reader holds its handle behind a
/// mutex), so methods take `&mut self` and implementations need only be
/// [`Send`].
pub trait InputHandle: Send {
    /// Move to an absolute byte offset.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes, returning how many were read.
    ///
    /// Implementations keep reading until the buffer is full or the stream
    /// ends; a short count therefore means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the handle.
    fn close(self: Box<Self>) -> Result<()>;
}
