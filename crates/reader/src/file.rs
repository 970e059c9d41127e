//! Serialized access to the underlying input handle.
//!
//! One handle per reader, guarded by a mutex. The handle may be closed at any
//! time between reads; the next read reopens it through the input handler and
//! checks that the file still starts with the bytes seen at first open.

use crate::error::{ErrorKind, Result};
use ptex_io::{HandlerRef, InputHandle};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};

pub(crate) struct FileCursor {
    path: PathBuf,
    handler: HandlerRef,
    state: Mutex<HandleState>,
}

#[derive(Default)]
struct HandleState {
    handle: Option<Box<dyn InputHandle>>,
    /// Offset the handle is positioned at, if known.
    pos: Option<u64>,
    /// Leading file bytes that must match on reopen.
    signature: Vec<u8>,
}

impl FileCursor {
    pub(crate) fn new(path: PathBuf, handler: HandlerRef) -> Self {
        Self { path, handler, state: Mutex::default() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn handler_name(&self) -> &str {
        self.handler.name()
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember the header bytes so a reopen can detect a replaced file.
    pub(crate) fn record_signature(&self, signature: Vec<u8>) {
        self.lock().signature = signature;
    }

    /// Read into `buf` at `pos`, returning the byte count (short at end of file).
    pub(crate) fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        let (mut handle, current) = match state.handle.take() {
            Some(handle) => (handle, state.pos),
            None => self.reopen(&state.signature)?,
        };
        let read = Self::seek_read(handle.as_mut(), current, pos, buf);
        state.pos = read.as_ref().ok().map(|count| pos + *count as u64);
        state.handle = Some(handle);
        read
    }

    /// Read exactly `buf.len()` bytes at `pos`.
    pub(crate) fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let got = self.read_at(pos, buf)?;
        if got < buf.len() {
            exn::bail!(ErrorKind::ShortRead { offset: pos, wanted: buf.len(), got });
        }
        Ok(())
    }

    pub(crate) fn read_vec(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(pos, &mut buf)?;
        Ok(buf)
    }

    fn seek_read(handle: &mut dyn InputHandle, current: Option<u64>, pos: u64, buf: &mut [u8]) -> Result<usize> {
        if current != Some(pos) {
            handle.seek(pos).map_err(ErrorKind::io)?;
        }
        handle.read(buf).map_err(ErrorKind::io)
    }

    fn reopen(&self, signature: &[u8]) -> Result<(Box<dyn InputHandle>, Option<u64>)> {
        let mut handle = self.handler.open(&self.path).map_err(ErrorKind::io)?;
        if signature.is_empty() {
            tracing::debug!(handler = self.handler.name(), path = %self.path.display(), "Opened texture file");
            return Ok((handle, Some(0)));
        }
        let mut head = vec![0u8; signature.len()];
        let got = handle.read(&mut head).map_err(ErrorKind::io)?;
        if got != head.len() || head != signature {
            if let Err(err) = handle.close() {
                tracing::warn!(path = %self.path.display(), error = %*err, "Failed to close replaced file");
            }
            exn::bail!(ErrorKind::HeaderMismatch);
        }
        tracing::debug!(handler = self.handler.name(), path = %self.path.display(), "Reopened texture file");
        Ok((handle, Some(got as u64)))
    }

    /// Make sure a handle is open.
    pub(crate) fn open(&self) -> Result<()> {
        let mut state = self.lock();
        if state.handle.is_none() {
            let (handle, pos) = self.reopen(&state.signature)?;
            state.handle = Some(handle);
            state.pos = pos;
        }
        Ok(())
    }

    /// Close the handle, waiting for any read in progress.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        self.release(&mut state)
    }

    /// Close the handle unless a read is in progress.
    pub(crate) fn try_close(&self) -> bool {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        self.release(&mut state)
    }

    fn release(&self, state: &mut HandleState) -> bool {
        state.pos = None;
        let Some(handle) = state.handle.take() else {
            return false;
        };
        if let Err(err) = handle.close() {
            tracing::warn!(path = %self.path.display(), error = %*err, "Failed to close texture file");
        }
        tracing::debug!(path = %self.path.display(), "Closed texture file");
        true
    }

    pub(crate) fn is_open(&self) -> bool {
        self.lock().handle.is_some()
    }
}
