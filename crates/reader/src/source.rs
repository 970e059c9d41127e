//! State shared between a reader and every face it hands out.
//!
//! Faces that load lazily (tiles, reduced tiles, large metadata) hold an
//! `Arc<Source>` so they can keep reading after the caller has dropped the
//! reader's borrow. The source owns the file cursor, the validity flag, the
//! memory counter and the pixel layout.

use crate::error::{Error, ErrorKind, Result};
use crate::file::FileCursor;
use crate::filter::{self, Reducer};
use crate::format::{DataType, Header, MeshType};
use ptex_compress::Compression;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

/// Sample layout of every texel in a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PixelLayout {
    pub(crate) data_type: DataType,
    pub(crate) num_channels: usize,
    pub(crate) alpha_channel: Option<usize>,
    pub(crate) premultiply: bool,
}

impl PixelLayout {
    pub(crate) fn new(header: &Header, premultiply: bool) -> Self {
        Self {
            data_type: header.data_type,
            num_channels: header.num_channels,
            alpha_channel: header.alpha_channel,
            premultiply,
        }
    }

    pub(crate) fn pixel_size(&self) -> usize {
        self.data_type.size() * self.num_channels
    }

    /// Premultiply freshly decoded texels if the reader was asked to.
    pub(crate) fn finish(&self, data: &mut [u8]) {
        if let (true, Some(alpha)) = (self.premultiply, self.alpha_channel) {
            filter::premultiply(data, self.data_type, self.num_channels, alpha);
        }
    }
}

pub(crate) struct Source {
    pub(crate) file: FileCursor,
    pub(crate) layout: PixelLayout,
    pub(crate) reducer: Reducer,
    pub(crate) mesh_type: MeshType,
    ok: AtomicBool,
    message: Mutex<Option<String>>,
    memory: AtomicUsize,
}

impl Source {
    pub(crate) fn new(file: FileCursor, header: &Header, premultiply: bool, reducer: Reducer) -> Self {
        Self {
            file,
            layout: PixelLayout::new(header, premultiply),
            reducer,
            mesh_type: header.mesh_type,
            ok: AtomicBool::new(true),
            message: Mutex::new(None),
            memory: AtomicUsize::new(0),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read a whole block, invalidating the reader if the file can't supply it.
    pub(crate) fn read(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        self.file.read_vec(pos, len).map_err(|err| self.record(err))
    }

    /// Read up to `buf.len()` bytes; a short count means end of file.
    pub(crate) fn read_partial(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.read_at(pos, buf).map_err(|err| self.record(err))
    }

    /// Decode a block to exactly `len` bytes. The file lock is not held.
    pub(crate) fn inflate(&self, compression: Compression, block: &[u8], len: usize) -> Result<Vec<u8>> {
        compression
            .decompress_exact(block, len)
            .map_err(ErrorKind::compression)
            .map_err(|err| self.record(err))
    }

    /// Read a zlib block and inflate it to `len` bytes.
    pub(crate) fn read_zipped(&self, pos: u64, zip_size: usize, len: usize) -> Result<Vec<u8>> {
        let block = self.read(pos, zip_size)?;
        self.inflate(Compression::Zlib, &block, len)
    }

    /// Remember an error for [`error`](Self::error). Fatal kinds also clear
    /// the validity flag so later data requests fail fast.
    pub(crate) fn record(&self, err: Error) -> Error {
        let message = format!("{} ({})", *err, self.path().display());
        if err.is_fatal() {
            self.ok.store(false, Ordering::SeqCst);
            tracing::error!(path = %self.path().display(), error = %*err, "Texture reader invalidated");
        } else {
            tracing::warn!(path = %self.path().display(), error = %*err, "Texture read failed");
        }
        *self.message.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
        err
    }

    pub(crate) fn ok(&self) -> bool {
        self.ok.load(Ordering::SeqCst)
    }

    pub(crate) fn error(&self) -> Option<String> {
        self.message.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fail fast once the reader has been invalidated.
    pub(crate) fn check(&self) -> Result<()> {
        if self.ok() {
            return Ok(());
        }
        let message = self.error().unwrap_or_else(|| "unknown error".to_string());
        exn::bail!(ErrorKind::Invalid(message))
    }

    /// Forget previous failures.
    pub(crate) fn reset(&self) {
        self.ok.store(true, Ordering::SeqCst);
        *self.message.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub(crate) fn mem_used(&self) -> usize {
        self.memory.load(Ordering::Relaxed)
    }

    pub(crate) fn set_mem_used(&self, bytes: usize) {
        self.memory.store(bytes, Ordering::Relaxed);
    }

    /// Publish `value` into `slot` unless another thread got there first, in
    /// which case the loser is dropped and the winner returned. Only the
    /// winning insert is charged to the memory counter.
    pub(crate) fn install<'a, T>(&self, slot: &'a OnceLock<T>, value: T, size: usize) -> &'a T {
        let mut inserted = false;
        let stored = slot.get_or_init(|| {
            inserted = true;
            value
        });
        if inserted {
            self.memory.fetch_add(size, Ordering::Relaxed);
        }
        stored
    }

    /// Charge memory for a value published outside a [`OnceLock`].
    pub(crate) fn charge(&self, size: usize) {
        self.memory.fetch_add(size, Ordering::Relaxed);
    }
}
