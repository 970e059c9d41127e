//! In-memory input handler for testing.

use crate::error::{ErrorKind, Result};
use crate::handler::{InputHandle, InputHandler};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Access counters shared by a [`MemoryInputHandler`] and its handles.
#[derive(Debug, Default)]
pub struct HandlerStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    bytes_read: AtomicUsize,
}
impl HandlerStats {
    /// Successful opens.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Explicit closes.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Calls to [`InputHandle::read`].
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Bytes returned by all reads.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }
}

/// In-memory input handler for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so contents can be
/// replaced or removed while readers hold the handler. Open handles keep the
/// contents they were opened with, like a descriptor to an unlinked file.
pub struct MemoryInputHandler {
    name: String,
    files: RwLock<HashMap<PathBuf, Arc<[u8]>>>,
    stats: Arc<HandlerStats>,
    fail_opens: AtomicBool,
}

impl MemoryInputHandler {
    /// Create a handler pre-populated with files.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let files = files
            .into_iter()
            .map(|(path, data)| {
                let data: Vec<u8> = data.into();
                (path.into(), Arc::<[u8]>::from(data))
            })
            .collect();
        Self {
            name: "memory".to_string(),
            files: RwLock::new(files),
            stats: Arc::default(),
            fail_opens: AtomicBool::new(false),
        }
    }

    /// Change the name of the mock handler.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let data: Vec<u8> = data.into();
        files.insert(path.into(), Arc::from(data));
    }

    /// Remove a file, returning whether it existed.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(path.as_ref()).is_some()
    }

    /// Make every subsequent open fail (simulating descriptor exhaustion).
    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }
}
impl Default for MemoryInputHandler {
    fn default() -> Self {
        let files: [(&str, Vec<u8>); 0] = [];
        Self::with_files(files)
    }
}

impl InputHandler for MemoryInputHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &Path) -> Result<Box<dyn InputHandle>> {
        if self.fail_opens.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::HandlerError("too many open files".to_string()));
        }
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let data = files.get(path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.to_path_buf())))?;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle { data, pos: 0, stats: Arc::clone(&self.stats) }))
    }
}

struct MemoryHandle {
    data: Arc<[u8]>,
    pos: usize,
    stats: Arc<HandlerStats>,
}

impl InputHandle for MemoryHandle {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = usize::try_from(pos).unwrap_or(usize::MAX);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = self.pos.min(self.data.len());
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.pos = start + count;
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        self.stats.bytes_read.fetch_add(count, Ordering::SeqCst);
        Ok(count)
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
