//! One mip level: the face header table plus lazily decoded face slots.

use crate::edit::FaceEdit;
use crate::error::{ErrorKind, Result};
use crate::face::{self, FaceData};
use crate::format::{FACE_DATA_HEADER_SIZE, FaceDataHeader, LevelInfo, Res};
use crate::source::Source;
use exn::OptionExt;
use std::mem::size_of;
use std::sync::{Arc, OnceLock};
use tracing::instrument;

pub(crate) struct Level {
    headers: Vec<FaceDataHeader>,
    offsets: Vec<u64>,
    faces: Vec<OnceLock<Arc<FaceData>>>,
}

impl Level {
    /// Read the level's face header table. Face blocks follow the table
    /// back to back. Edited faces on level 0 point into the edit journal.
    #[instrument(level = "debug", skip(source, info, edits), fields(faces = info.num_faces))]
    pub(crate) fn read(source: &Source, id: usize, pos: u64, info: &LevelInfo, edits: &[FaceEdit]) -> Result<Self> {
        let raw = source.read_zipped(pos, info.level_header_size, info.num_faces * FACE_DATA_HEADER_SIZE)?;
        let mut headers = FaceDataHeader::parse_all(&raw, info.num_faces)?;
        let mut next = pos + info.level_header_size as u64;
        let mut offsets: Vec<u64> = headers
            .iter()
            .map(|header| {
                let offset = next;
                next += header.block_size() as u64;
                offset
            })
            .collect();
        if id == 0 {
            let count = headers.len();
            for edit in edits.iter().filter(|edit| edit.face_id < count) {
                headers[edit.face_id] = edit.header;
                offsets[edit.face_id] = edit.pos;
            }
        }
        let faces = (0..headers.len()).map(|_| OnceLock::new()).collect();
        Ok(Self { headers, offsets, faces })
    }

    pub(crate) fn len(&self) -> usize {
        self.headers.len()
    }

    pub(crate) fn header(&self, index: usize) -> Option<FaceDataHeader> {
        self.headers.get(index).copied()
    }

    /// Face `index` of this level at resolution `res`, decoding on first use.
    pub(crate) fn face(&self, source: &Arc<Source>, index: usize, res: Res) -> Result<Arc<FaceData>> {
        let slot = self.faces.get(index).ok_or_raise(|| ErrorKind::FaceOutOfRange(index))?;
        if let Some(face) = slot.get() {
            return Ok(Arc::clone(face));
        }
        let face = Arc::new(face::decode(source, self.offsets[index], self.headers[index], res)?);
        let size = face.mem_used();
        Ok(Arc::clone(source.install(slot, face, size)))
    }

    pub(crate) fn loaded_faces(&self) -> usize {
        self.faces.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Bytes held by the header table itself (not by decoded faces).
    pub(crate) fn mem_used(&self) -> usize {
        size_of::<Self>()
            + self.headers.len()
                * (size_of::<FaceDataHeader>() + size_of::<u64>() + size_of::<OnceLock<Arc<FaceData>>>())
    }

    /// Drop every decoded face; the header table stays.
    pub(crate) fn purge(&mut self) {
        for slot in &mut self.faces {
            slot.take();
        }
    }
}
