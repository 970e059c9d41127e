use crate::directory::Directory;
use crate::error::{ErrorKind, Result};
use crate::face::{self, FaceData};
use crate::file::FileCursor;
use crate::filter;
use crate::format::{
    BorderMode, DataType, EXT_HEADER_SIZE, EdgeFilterMode, ExtHeader, FaceInfo, HEADER_SIZE, Header, LevelInfo,
    MeshType, Res,
};
use crate::metadata::MetaData;
use crate::options::ReaderOptions;
use crate::reduction::ReductionKey;
use crate::source::Source;
use exn::OptionExt;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::instrument;

/// Lazy reader for one per-face texture file.
///
/// Opening reads only the header and the face, constant and level tables.
/// Face data is decoded on first request and cached until [`purge`]; lower
/// resolutions that the file doesn't store are synthesized and memoized.
///
/// The reader is `Send + Sync`: decode requests may run concurrently through
/// a shared reference. [`purge`] and [`prune`] need exclusive access.
///
/// # Examples
///
/// ```no_run
/// use ptex_reader::{Reader, Res};
///
/// let reader = Reader::open("textures/body.ptx").unwrap();
/// let face = reader.data_at(0, Res::new(2, 2)).unwrap();
/// assert_eq!(face.res(), Res::new(2, 2));
/// ```
///
/// [`purge`]: Reader::purge
/// [`prune`]: Reader::prune
pub struct Reader {
    source: Arc<Source>,
    header: Header,
    ext: ExtHeader,
    has_edits: bool,
    directory: OnceLock<Directory>,
}

impl Reader {
    /// Open a file from the local filesystem with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display(), handler = options.handler.name()))]
    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let file = FileCursor::new(path.as_ref().to_path_buf(), Arc::clone(&options.handler));
        let mut signature = file.read_vec(0, HEADER_SIZE)?;
        let header = Header::parse(&signature)?;
        let ext_bytes = file.read_vec(HEADER_SIZE as u64, header.ext_header_size.min(EXT_HEADER_SIZE))?;
        let ext = ExtHeader::parse(&ext_bytes)?;
        signature.extend_from_slice(&ext_bytes);
        file.record_signature(signature);

        let source = Arc::new(Source::new(file, &header, options.premultiply, options.reducer));
        let mut reader = Self { source, header, ext, has_edits: false, directory: OnceLock::new() };
        reader.has_edits = reader.directory()?.edits.found;
        tracing::info!(
            faces = reader.header.num_faces,
            levels = reader.header.num_levels,
            data_type = %reader.header.data_type,
            channels = reader.header.num_channels,
            "Opened texture"
        );
        Ok(reader)
    }

    fn directory(&self) -> Result<&Directory> {
        if let Some(directory) = self.directory.get() {
            return Ok(directory);
        }
        let directory = Directory::load(&self.source, &self.header, &self.ext)?;
        let size = directory.mem_used();
        Ok(self.source.install(&self.directory, directory, size))
    }

    /// Directory for a data request; fails fast once the reader is invalid.
    fn ready(&self) -> Result<&Directory> {
        self.source.check()?;
        self.directory()
    }

    /// `false` once an I/O failure has invalidated the reader.
    pub fn ok(&self) -> bool {
        self.source.ok()
    }

    /// Message of the most recent failure, including the file path.
    pub fn error(&self) -> Option<String> {
        self.source.error()
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn ext_header(&self) -> &ExtHeader {
        &self.ext
    }

    pub fn mesh_type(&self) -> MeshType {
        self.header.mesh_type
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn alpha_channel(&self) -> Option<usize> {
        self.header.alpha_channel
    }

    pub fn num_channels(&self) -> usize {
        self.header.num_channels
    }

    pub fn num_faces(&self) -> usize {
        self.header.num_faces
    }

    pub fn num_levels(&self) -> usize {
        self.header.num_levels
    }

    /// Bytes per texel.
    pub fn pixel_size(&self) -> usize {
        self.header.pixel_size()
    }

    pub fn u_border_mode(&self) -> BorderMode {
        self.ext.u_border_mode
    }

    pub fn v_border_mode(&self) -> BorderMode {
        self.ext.v_border_mode
    }

    pub fn edge_filter_mode(&self) -> EdgeFilterMode {
        self.ext.edge_filter_mode
    }

    /// Whether the file carries an edit journal.
    pub fn has_edits(&self) -> bool {
        self.has_edits
    }

    pub fn has_mipmaps(&self) -> bool {
        self.header.num_levels > 1
    }

    /// Face table entry, with any edits applied.
    pub fn face_info(&self, face_id: usize) -> Result<FaceInfo> {
        let directory = self.directory()?;
        directory.face_info.get(face_id).copied().ok_or_raise(|| ErrorKind::FaceOutOfRange(face_id))
    }

    pub fn level_info(&self, level: usize) -> Result<LevelInfo> {
        let directory = self.directory()?;
        directory.level_info.get(level).copied().ok_or_raise(|| ErrorKind::Malformed("level out of range"))
    }

    /// Face data at native resolution.
    pub fn data(&self, face_id: usize) -> Result<Arc<FaceData>> {
        let res = self.face_info(face_id)?.res;
        self.data_at(face_id, res)
    }

    /// Face data at `res`, which may not exceed the face's native resolution.
    ///
    /// Stored levels are used where they exist; other resolutions are reduced
    /// from the next larger one and cached until [`purge`](Self::purge).
    #[instrument(level = "debug", skip(self), fields(res = %res))]
    pub fn data_at(&self, face_id: usize, res: Res) -> Result<Arc<FaceData>> {
        let directory = self.ready()?;
        let info = directory.face_info.get(face_id).copied().ok_or_raise(|| ErrorKind::FaceOutOfRange(face_id))?;
        if !res.is_valid() {
            exn::bail!(ErrorKind::UnsupportedResolution { res, reason: "negative or oversized" });
        }
        let redu = info.res.ulog2 - res.ulog2;
        let redv = info.res.vlog2 - res.vlog2;
        if redu < 0 || redv < 0 {
            exn::bail!(ErrorKind::UnsupportedResolution { res, reason: "larger than the face" });
        }
        if self.header.mesh_type == MeshType::Triangle && redu != redv {
            exn::bail!(ErrorKind::UnsupportedResolution { res, reason: "triangle faces reduce symmetrically" });
        }

        if info.is_constant() || res == Res::new(0, 0) {
            let ps = self.source.layout.pixel_size();
            let pixel = directory.const_data[face_id * ps..(face_id + 1) * ps].to_vec();
            return Ok(Arc::new(face::constant(pixel)));
        }
        if redu == 0 && redv == 0 {
            return directory.level(&self.source, 0)?.face(&self.source, face_id, res);
        }
        if redu == redv && !info.has_edits() && (redu as usize) < directory.level_info.len() {
            let level = directory.level(&self.source, redu as usize)?;
            let rface_id = directory.rface_ids[face_id];
            if rface_id < level.len() {
                return level.face(&self.source, rface_id, res);
            }
        }

        let key = ReductionKey::new(face_id, res);
        if let Some(face) = directory.reductions.get(key) {
            return Ok(face);
        }
        let reducer = self.source.reducer;
        let (larger, reduce) = if self.header.mesh_type == MeshType::Triangle {
            (Res::new(res.ulog2 + 1, res.vlog2 + 1), reducer.reduce_tri)
        } else if redu == redv {
            (Res::new(res.ulog2 + 1, res.vlog2 + 1), reducer.reduce)
        } else if redu > redv {
            (Res::new(res.ulog2 + 1, res.vlog2), reducer.reduce_u)
        } else {
            (Res::new(res.ulog2, res.vlog2 + 1), reducer.reduce_v)
        };
        let parent = self.data_at(face_id, larger)?;
        let reduced = Arc::new(face::reduce(&parent, &self.source, res, reduce)?);
        Ok(directory.reductions.insert(&self.source, key, reduced))
    }

    /// Copy a face at native resolution into `buffer`. Rows are `stride`
    /// bytes apart; a stride of zero (or less than a row) packs them.
    pub fn copy_data(&self, face_id: usize, buffer: &mut [u8], stride: usize) -> Result<()> {
        let res = self.face_info(face_id)?.res;
        self.copy_data_at(face_id, res, buffer, stride)
    }

    /// Copy a face at `res` into `buffer`, expanding constant faces and
    /// assembling tiles.
    pub fn copy_data_at(&self, face_id: usize, res: Res, buffer: &mut [u8], stride: usize) -> Result<()> {
        let face = self.data_at(face_id, res)?;
        let rowlen = self.pixel_size() * res.u();
        let stride = if stride == 0 { rowlen } else { stride.max(rowlen) };
        let needed = stride * (res.v() - 1) + rowlen;
        if buffer.len() < needed {
            exn::bail!(ErrorKind::BufferTooSmall { needed, got: buffer.len() });
        }
        face.copy_into(res, buffer, stride)
    }

    /// Channels `first_channel..first_channel + out.len()` of one texel at
    /// native resolution, as floats (integer types normalized to `[0, 1]`).
    /// Channels past the last are zero. Constant faces answer any `(u, v)`.
    pub fn pixel(&self, face_id: usize, u: usize, v: usize, out: &mut [f32], first_channel: usize) -> Result<()> {
        let res = self.face_info(face_id)?.res;
        self.pixel_at(face_id, u, v, out, first_channel, res)
    }

    pub fn pixel_at(
        &self,
        face_id: usize,
        u: usize,
        v: usize,
        out: &mut [f32],
        first_channel: usize,
        res: Res,
    ) -> Result<()> {
        let face = self.data_at(face_id, res)?;
        let mut texel = vec![0u8; self.pixel_size()];
        face.pixel(u, v, &mut texel)?;
        filter::to_float(&texel, self.header.data_type, first_channel, out);
        Ok(())
    }

    /// The metadata store, read on first use.
    pub fn metadata(&self) -> Result<&MetaData> {
        self.ready()?.metadata(&self.source)
    }

    /// Drop decoded faces, reductions and large metadata payloads. Tables,
    /// level directories and resident metadata stay.
    pub fn purge(&mut self) {
        if let Some(directory) = self.directory.get_mut() {
            directory.purge();
            self.source.set_mem_used(directory.mem_used());
        }
        tracing::debug!(path = %self.path().display(), mem_used = self.mem_used(), "Purged texture data");
    }

    /// Drop everything and close the file. The next request re-reads the
    /// tables and clears any recorded failure if that succeeds.
    pub fn prune(&mut self) {
        self.directory.take();
        self.source.file.close();
        self.source.set_mem_used(0);
        self.source.reset();
        tracing::debug!(path = %self.path().display(), "Pruned texture reader");
    }

    /// Close the file handle unless a read is in progress. Returns `true`
    /// only if a handle was closed.
    pub fn try_close(&self) -> bool {
        self.source.file.try_close()
    }

    /// Whether the tables must be read again (after a prune).
    pub fn needs_open(&self) -> bool {
        self.directory.get().is_none()
    }

    pub fn is_open(&self) -> bool {
        self.source.file.is_open()
    }

    /// Bytes held by tables, levels, decoded faces, reductions and metadata.
    pub fn mem_used(&self) -> usize {
        self.source.mem_used()
    }

    /// Decoded faces and cached reductions, per loaded level.
    pub fn cache_stats(&self) -> CacheStats {
        let Some(directory) = self.directory.get() else {
            return CacheStats::default();
        };
        CacheStats {
            levels: directory.loaded_levels().map(|(id, level)| (id, level.loaded_faces())).collect(),
            reductions: directory.reductions.len(),
            mem_used: self.mem_used(),
        }
    }
}

/// Snapshot of what a reader currently holds in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `(level, decoded faces)` for every level whose directory is loaded.
    pub levels: Vec<(usize, usize)>,
    /// Cached reductions.
    pub reductions: usize,
    pub mem_used: usize,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("path", &self.path())
            .field("handler", &self.source.file.handler_name())
            .field("faces", &self.header.num_faces)
            .field("ok", &self.ok())
            .field("mem_used", &self.mem_used())
            .finish()
    }
}
