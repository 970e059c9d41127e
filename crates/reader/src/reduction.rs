//! Memo of synthesized resolutions, keyed by face and resolution.

use crate::face::FaceData;
use crate::format::Res;
use crate::source::Source;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::mem::size_of;
use std::sync::{Arc, Mutex, MutexGuard};

/// Face id and resolution packed into one word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ReductionKey(u64);

impl ReductionKey {
    pub(crate) fn new(face_id: usize, res: Res) -> Self {
        Self(((face_id as u64) << 16) | ((res.ulog2 as u8 as u64) << 8) | res.vlog2 as u8 as u64)
    }
}

#[derive(Default)]
pub(crate) struct ReductionCache {
    entries: Mutex<HashMap<ReductionKey, Arc<FaceData>>>,
}

impl ReductionCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<ReductionKey, Arc<FaceData>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn get(&self, key: ReductionKey) -> Option<Arc<FaceData>> {
        self.lock().get(&key).cloned()
    }

    /// Insert unless present. Returns whichever face ends up cached; only a
    /// fresh insert is charged to the memory counter.
    pub(crate) fn insert(&self, source: &Source, key: ReductionKey, face: Arc<FaceData>) -> Arc<FaceData> {
        match self.lock().entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                source.charge(face.mem_used() + size_of::<(ReductionKey, Arc<FaceData>)>());
                Arc::clone(entry.insert(face))
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.get_mut().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
