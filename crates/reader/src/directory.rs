//! The in-memory directory built from a file's tables.
//!
//! Built at open and again after a prune. Holds everything needed to locate
//! any face block: the face and level tables, constant pixels, section
//! offsets, the edit journal, and lazily the per-level face headers and the
//! metadata store. Decoded faces hang off the levels and the reduction cache.

use crate::edit::Edits;
use crate::error::{ErrorKind, Result};
use crate::format::{ExtHeader, FACE_INFO_SIZE, FaceInfo, HEADER_SIZE, Header, LEVEL_INFO_SIZE, LevelInfo};
use crate::level::Level;
use crate::metadata::MetaData;
use crate::reduction::ReductionCache;
use crate::source::Source;
use exn::OptionExt;
use std::cmp::Reverse;
use std::mem::size_of;
use std::sync::{Arc, OnceLock};
use tracing::instrument;

/// Absolute offsets of every section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Sections {
    pub(crate) face_info: u64,
    pub(crate) const_data: u64,
    pub(crate) level_info: u64,
    pub(crate) level_data: u64,
    pub(crate) meta_data: u64,
    pub(crate) lmd_header: u64,
    pub(crate) lmd_data: u64,
    pub(crate) edit_data: u64,
    /// End of the edit journal, if the writer recorded it.
    pub(crate) edit_end: Option<u64>,
}

impl Sections {
    pub(crate) fn new(header: &Header, ext: &ExtHeader) -> Self {
        let face_info = (HEADER_SIZE + header.ext_header_size) as u64;
        let const_data = face_info + header.face_info_size as u64;
        let level_info = const_data + header.const_data_size as u64;
        let level_data = level_info + header.level_info_size as u64;
        let meta_data = level_data + header.level_data_size;
        let lmd_header = meta_data + header.meta_data_zip_size as u64;
        let lmd_data = lmd_header + ext.lmd_header_zip_size as u64;
        let (edit_data, edit_end) = if ext.edit_data_pos > 0 {
            (ext.edit_data_pos, Some(ext.edit_data_pos + ext.edit_data_size))
        } else {
            (lmd_data + ext.lmd_data_size, None)
        };
        Self { face_info, const_data, level_info, level_data, meta_data, lmd_header, lmd_data, edit_data, edit_end }
    }
}

pub(crate) struct Directory {
    pub(crate) face_info: Vec<FaceInfo>,
    pub(crate) const_data: Vec<u8>,
    pub(crate) level_info: Vec<LevelInfo>,
    /// Position of each face in reduction order.
    pub(crate) rface_ids: Vec<usize>,
    pub(crate) sections: Sections,
    pub(crate) edits: Edits,
    pub(crate) reductions: ReductionCache,
    level_pos: Vec<u64>,
    levels: Vec<OnceLock<Level>>,
    metadata: OnceLock<MetaData>,
    meta_sizes: MetaSizes,
}

#[derive(Clone, Copy, Debug)]
struct MetaSizes {
    zip_size: usize,
    mem_size: usize,
    lmd_zip_size: usize,
    lmd_mem_size: usize,
}

impl Directory {
    #[instrument(skip_all, fields(path = %source.path().display(), faces = header.num_faces, levels = header.num_levels))]
    pub(crate) fn load(source: &Arc<Source>, header: &Header, ext: &ExtHeader) -> Result<Self> {
        source.file.open().map_err(|err| source.record(err))?;
        let sections = Sections::new(header, ext);
        let ps = source.layout.pixel_size();

        let raw = source.read_zipped(sections.face_info, header.face_info_size, header.num_faces * FACE_INFO_SIZE)?;
        let mut face_info = FaceInfo::parse_all(&raw, header.num_faces).map_err(|err| source.record(err))?;
        let mut const_data = source.read_zipped(sections.const_data, header.const_data_size, header.num_faces * ps)?;
        source.layout.finish(&mut const_data);

        let raw = source.read(sections.level_info, header.num_levels * LEVEL_INFO_SIZE)?;
        let level_info = LevelInfo::parse_all(&raw, header.num_levels)?;
        if level_info.first().is_some_and(|level| level.num_faces != header.num_faces) {
            return Err(source.record(exn::Exn::from(ErrorKind::Malformed("level 0 face count differs from header"))));
        }
        let mut next = sections.level_data;
        let level_pos = level_info
            .iter()
            .map(|level| {
                let pos = next;
                next += level.level_data_size;
                pos
            })
            .collect();

        // Stored levels follow the order of the base face table.
        let rface_ids = reduction_order(&face_info);
        let edits = Edits::scan(source, sections.edit_data, sections.edit_end, &mut face_info, &mut const_data)?;
        tracing::debug!(edits = edits.found, "Read texture directory");
        Ok(Self {
            levels: (0..level_info.len()).map(|_| OnceLock::new()).collect(),
            face_info,
            const_data,
            level_info,
            rface_ids,
            sections,
            edits,
            reductions: ReductionCache::default(),
            level_pos,
            metadata: OnceLock::new(),
            meta_sizes: MetaSizes {
                zip_size: header.meta_data_zip_size,
                mem_size: header.meta_data_mem_size,
                lmd_zip_size: ext.lmd_header_zip_size,
                lmd_mem_size: ext.lmd_header_mem_size,
            },
        })
    }

    /// Level `id`, reading its face header table on first use.
    pub(crate) fn level(&self, source: &Source, id: usize) -> Result<&Level> {
        let slot = self.levels.get(id).ok_or_raise(|| ErrorKind::Malformed("level out of range"))?;
        if let Some(level) = slot.get() {
            return Ok(level);
        }
        let level = Level::read(source, id, self.level_pos[id], &self.level_info[id], &self.edits.faces)?;
        let size = level.mem_used();
        Ok(source.install(slot, level, size))
    }

    /// The metadata store, built on first use.
    pub(crate) fn metadata(&self, source: &Arc<Source>) -> Result<&MetaData> {
        if let Some(metadata) = self.metadata.get() {
            return Ok(metadata);
        }
        let sizes = self.meta_sizes;
        let mut metadata = MetaData::new(Arc::clone(source));
        metadata.read_block(self.sections.meta_data, sizes.zip_size, sizes.mem_size)?;
        metadata.read_large_headers(self.sections.lmd_header, sizes.lmd_zip_size, sizes.lmd_mem_size, self.sections.lmd_data)?;
        for edit in &self.edits.metas {
            metadata.read_block(edit.pos, edit.zip_size, edit.mem_size)?;
        }
        let size = metadata.mem_used();
        Ok(source.install(&self.metadata, metadata, size))
    }

    pub(crate) fn loaded_levels(&self) -> impl Iterator<Item = (usize, &Level)> {
        self.levels.iter().enumerate().filter_map(|(id, slot)| slot.get().map(|level| (id, level)))
    }

    /// Bytes that survive a purge: tables, loaded level directories and
    /// resident metadata.
    pub(crate) fn mem_used(&self) -> usize {
        let tables = size_of::<Self>()
            + self.face_info.len() * (size_of::<FaceInfo>() + size_of::<usize>())
            + self.const_data.len()
            + self.level_info.len() * (size_of::<LevelInfo>() + size_of::<u64>() + size_of::<OnceLock<Level>>());
        let levels: usize = self.loaded_levels().map(|(_, level)| level.mem_used()).sum();
        let metadata = self.metadata.get().map_or(0, MetaData::mem_used);
        tables + levels + metadata
    }

    /// Drop decoded faces, reductions and large metadata payloads.
    pub(crate) fn purge(&mut self) {
        for level in self.levels.iter_mut().filter_map(OnceLock::get_mut) {
            level.purge();
        }
        if let Some(metadata) = self.metadata.get_mut() {
            metadata.purge();
        }
        self.reductions.clear();
    }
}

/// Rank faces by descending smallest dimension; constant faces rank as if
/// their smallest dimension were 2 texels. Ties keep face order.
fn reduction_order(face_info: &[FaceInfo]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..face_info.len()).collect();
    order.sort_by_key(|&face| {
        let info = &face_info[face];
        Reverse(if info.is_constant() { 1 } else { info.res.ulog2.min(info.res.vlog2) })
    });
    let mut rface_ids = vec![0; face_info.len()];
    for (rank, &face) in order.iter().enumerate() {
        rface_ids[face] = rank;
    }
    rface_ids
}
