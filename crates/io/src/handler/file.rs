//! Local filesystem input handler.

use crate::error::{ErrorKind, Result};
use crate::handler::{InputHandle, InputHandler};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Buffered local filesystem handler.
///
/// Each [`open`](InputHandler::open) returns an independent [`File`] wrapped
/// in a [`BufReader`]; the buffer is released together with the handle.
///
/// # Examples
///
/// ```no_run
/// use ptex_io::FileInputHandler;
///
/// let handler = FileInputHandler::default().with_buffer_size(64 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct FileInputHandler {
    name: String,
    buffer_size: usize,
}
impl FileInputHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), buffer_size: DEFAULT_BUFFER_SIZE }
    }

    /// Change the per-handle read buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }
}
impl Default for FileInputHandler {
    fn default() -> Self {
        Self::new("file")
    }
}

impl InputHandler for FileInputHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn InputHandle>> {
        let file = File::open(path).map_err(|e| ErrorKind::from_open(e, path))?;
        tracing::trace!(handler = %self.name, path = %path.display(), "Opened file handle");
        Ok(Box::new(FileHandle { reader: BufReader::with_capacity(self.buffer_size, file) }))
    }
}

struct FileHandle {
    reader: BufReader<File>,
}

impl InputHandle for FileHandle {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos)).map_err(ErrorKind::Io)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => exn::bail!(ErrorKind::Io(e)),
            }
        }
        Ok(filled)
    }

    fn close(self: Box<Self>) -> Result<()> {
        // `File` reports close errors only on drop, where they are discarded.
        drop(self);
        Ok(())
    }
}
