//! The edit journal appended after the main sections.
//!
//! Each record replaces a face (its info, constant pixel and data block) or
//! adds a metadata block. Records apply in file order, so a later edit of the
//! same face wins.

use crate::error::Result;
use crate::format::{
    EDIT_PREFIX_SIZE, FACE_EDIT_HEADER_SIZE, FaceDataHeader, FaceInfo, Fields, META_EDIT_HEADER_SIZE,
};
use crate::source::Source;
use tracing::instrument;

const EDIT_FACE: u8 = 0;
const EDIT_META: u8 = 1;

/// Replacement data block for a level 0 face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FaceEdit {
    pub(crate) face_id: usize,
    pub(crate) pos: u64,
    pub(crate) header: FaceDataHeader,
}

/// An additional zipped metadata block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MetaEdit {
    pub(crate) pos: u64,
    pub(crate) zip_size: usize,
    pub(crate) mem_size: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Edits {
    pub(crate) faces: Vec<FaceEdit>,
    pub(crate) metas: Vec<MetaEdit>,
    /// Any record was found, including ones that only touched constant faces.
    pub(crate) found: bool,
}

impl Edits {
    /// Walk the journal from `start` to `end` (or to end of file when the
    /// writer didn't record the journal's extent), applying face records to
    /// the face and constant tables as it goes.
    #[instrument(level = "debug", skip(source, face_info, const_data))]
    pub(crate) fn scan(
        source: &Source,
        start: u64,
        end: Option<u64>,
        face_info: &mut [FaceInfo],
        const_data: &mut [u8],
    ) -> Result<Self> {
        let mut edits = Self::default();
        let mut pos = start;
        loop {
            if end.is_some_and(|end| pos + EDIT_PREFIX_SIZE as u64 > end) {
                break;
            }
            let mut prefix = [0u8; EDIT_PREFIX_SIZE];
            if source.read_partial(pos, &mut prefix)? < EDIT_PREFIX_SIZE {
                break;
            }
            let mut fields = Fields::new(&prefix);
            let kind = fields.u8()?;
            let size = fields.u32()? as u64;
            if size == 0 {
                break;
            }
            let body = pos + EDIT_PREFIX_SIZE as u64;
            let complete = match kind {
                EDIT_FACE => edits.read_face_edit(source, body, face_info, const_data)?,
                EDIT_META => edits.read_meta_edit(source, body)?,
                other => {
                    tracing::debug!(kind = other, offset = pos, "Skipping unknown edit record");
                    true
                },
            };
            if !complete {
                tracing::warn!(offset = pos, "Edit journal truncated");
                break;
            }
            edits.found = true;
            pos = body + size;
        }
        if edits.found {
            tracing::debug!(faces = edits.faces.len(), metas = edits.metas.len(), "Applied edit journal");
        }
        Ok(edits)
    }

    fn read_face_edit(
        &mut self,
        source: &Source,
        body: u64,
        face_info: &mut [FaceInfo],
        const_data: &mut [u8],
    ) -> Result<bool> {
        let ps = source.layout.pixel_size();
        let mut bytes = vec![0u8; FACE_EDIT_HEADER_SIZE + ps];
        if source.read_partial(body, &mut bytes)? < bytes.len() {
            return Ok(false);
        }
        let mut fields = Fields::new(&bytes);
        let face_id = fields.u32()? as usize;
        let mut info = FaceInfo::parse(&mut fields)?;
        let header = FaceDataHeader(fields.u32()?);
        let pixel = fields.take(ps)?;
        if face_id >= face_info.len() || !info.res.is_valid() {
            tracing::warn!(face_id, "Ignoring edit of a face outside the face table");
            return Ok(true);
        }

        info.flags |= FaceInfo::FLAG_HAS_EDITS;
        face_info[face_id] = info;
        let texel = &mut const_data[face_id * ps..(face_id + 1) * ps];
        texel.copy_from_slice(pixel);
        source.layout.finish(texel);
        if !info.is_constant() {
            self.faces.push(FaceEdit { face_id, pos: body + bytes.len() as u64, header });
        }
        Ok(true)
    }

    fn read_meta_edit(&mut self, source: &Source, body: u64) -> Result<bool> {
        let mut bytes = [0u8; META_EDIT_HEADER_SIZE];
        if source.read_partial(body, &mut bytes)? < bytes.len() {
            return Ok(false);
        }
        let mut fields = Fields::new(&bytes);
        let zip_size = fields.u32()? as usize;
        let mem_size = fields.u32()? as usize;
        self.metas.push(MetaEdit { pos: body + bytes.len() as u64, zip_size, mem_size });
        Ok(true)
    }
}
