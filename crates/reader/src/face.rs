//! Decoded face payloads.
//!
//! A face is one of four shapes: a single constant pixel, a packed texel
//! array, a tiled face whose tiles decode on demand, or a reduced view of a
//! tiled face whose tiles are synthesized on demand. Faces are shared as
//! `Arc<FaceData>` between level slots, the reduction cache and callers.

use crate::error::{ErrorKind, Result};
use crate::filter::{self, ReduceFn};
use crate::format::{Encoding, FACE_DATA_HEADER_SIZE, FaceDataHeader, Fields, MeshType, Res, TILE_PREFIX_SIZE};
use crate::source::{PixelLayout, Source};
use exn::OptionExt;
use ptex_compress::Compression;
use std::fmt;
use std::mem::size_of;
use std::sync::{Arc, OnceLock};
use tracing::instrument;

type Slot = OnceLock<Arc<FaceData>>;

/// Decoded pixel data of one face at one resolution.
pub enum FaceData {
    Constant(ConstantFace),
    Packed(PackedFace),
    Tiled(TiledFace),
    TiledReduced(TiledReducedFace),
}

/// A face whose every texel has the same value.
#[derive(Clone)]
pub struct ConstantFace {
    pixel: Vec<u8>,
}

/// Texels in row-major order, `u` varying fastest.
pub struct PackedFace {
    res: Res,
    pixel_size: usize,
    data: Vec<u8>,
}

/// A face stored as independently encoded tiles.
pub struct TiledFace {
    grid: TileGrid,
    headers: Vec<FaceDataHeader>,
    offsets: Vec<u64>,
    tiles: Vec<Slot>,
    source: Arc<Source>,
}

/// A reduction of a tiled face; each tile is built from the parent tiles it
/// covers the first time it is requested.
pub struct TiledReducedFace {
    grid: TileGrid,
    parent: Arc<FaceData>,
    reduce: ReduceFn,
    tiles: Vec<Slot>,
    source: Arc<Source>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TileGrid {
    res: Res,
    tile_res: Res,
    ntiles_u: usize,
    ntiles_v: usize,
    pixel_size: usize,
}

impl TileGrid {
    fn new(res: Res, tile_res: Res, pixel_size: usize) -> Self {
        Self { res, tile_res, ntiles_u: res.ntiles_u(tile_res), ntiles_v: res.ntiles_v(tile_res), pixel_size }
    }

    fn len(&self) -> usize {
        self.ntiles_u * self.ntiles_v
    }

    /// Byte offset of tile `i`'s first texel in a face-sized buffer.
    fn offset(&self, i: usize, stride: usize) -> usize {
        let (tu, tv) = (i % self.ntiles_u, i / self.ntiles_u);
        tv * self.tile_res.v() * stride + tu * self.tile_res.u() * self.pixel_size
    }
}

fn slots(count: usize) -> Vec<Slot> {
    (0..count).map(|_| OnceLock::new()).collect()
}

impl FaceData {
    /// Resolution of the face. Constant faces report `(0, 0)`.
    pub fn res(&self) -> Res {
        match self {
            Self::Constant(_) => Res::new(0, 0),
            Self::Packed(face) => face.res,
            Self::Tiled(TiledFace { grid, .. }) | Self::TiledReduced(TiledReducedFace { grid, .. }) => grid.res,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    pub fn is_tiled(&self) -> bool {
        self.grid().is_some()
    }

    /// Resolution of one tile; untiled faces are their own single tile.
    pub fn tile_res(&self) -> Res {
        self.grid().map_or_else(|| self.res(), |grid| grid.tile_res)
    }

    /// Number of tiles. Zero for untiled faces.
    pub fn num_tiles(&self) -> usize {
        self.grid().map_or(0, |grid| grid.len())
    }

    /// Number of tiles decoded so far.
    pub fn loaded_tiles(&self) -> usize {
        match self {
            Self::Tiled(TiledFace { tiles, .. }) | Self::TiledReduced(TiledReducedFace { tiles, .. }) => {
                tiles.iter().filter(|slot| slot.get().is_some()).count()
            },
            _ => 0,
        }
    }

    /// Contiguous texels: the single pixel of a constant face or the packed
    /// array. Tiled faces have no contiguous buffer.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Constant(face) => Some(&face.pixel),
            Self::Packed(face) => Some(&face.data),
            Self::Tiled(_) | Self::TiledReduced(_) => None,
        }
    }

    fn grid(&self) -> Option<TileGrid> {
        match self {
            Self::Tiled(face) => Some(face.grid),
            Self::TiledReduced(face) => Some(face.grid),
            Self::Constant(_) | Self::Packed(_) => None,
        }
    }

    /// Fetch tile `i` of a tiled face, decoding it if needed. Other tiles are
    /// left untouched.
    pub fn tile(&self, i: usize) -> Result<Arc<FaceData>> {
        match self {
            Self::Tiled(face) => face.tile(i),
            Self::TiledReduced(face) => face.tile(i),
            Self::Constant(_) | Self::Packed(_) => exn::bail!(ErrorKind::TileOutOfRange(i)),
        }
    }

    /// Copy the texel at `(u, v)` into `out`.
    pub fn pixel(&self, u: usize, v: usize, out: &mut [u8]) -> Result<()> {
        let res = self.res();
        if !self.is_constant() && (u >= res.u() || v >= res.v()) {
            exn::bail!(ErrorKind::PixelOutOfRange { u, v });
        }
        match self {
            Self::Constant(face) => write_texel(&face.pixel, out),
            Self::Packed(face) => {
                let at = (v * res.u() + u) * face.pixel_size;
                write_texel(&face.data[at..at + face.pixel_size], out)
            },
            Self::Tiled(TiledFace { grid, .. }) | Self::TiledReduced(TiledReducedFace { grid, .. }) => {
                let (tu, tv) = (u >> grid.tile_res.ulog2, v >> grid.tile_res.vlog2);
                let tile = self.tile(tv * grid.ntiles_u + tu)?;
                tile.pixel(u & (grid.tile_res.u() - 1), v & (grid.tile_res.v() - 1), out)
            },
        }
    }

    /// Write the face as `res` texels into a strided buffer. Constant faces
    /// are expanded; tiled faces are assembled tile by tile.
    pub(crate) fn copy_into(&self, res: Res, dst: &mut [u8], stride: usize) -> Result<()> {
        match self {
            Self::Constant(face) => filter::fill(&face.pixel, dst, stride, res.u(), res.v()),
            Self::Packed(face) => {
                let rowlen = face.pixel_size * face.res.u();
                filter::copy(&face.data, rowlen, dst, stride, face.res.v(), rowlen);
            },
            Self::Tiled(TiledFace { grid, .. }) | Self::TiledReduced(TiledReducedFace { grid, .. }) => {
                for i in 0..grid.len() {
                    let tile = self.tile(i)?;
                    tile.copy_into(grid.tile_res, &mut dst[grid.offset(i, stride)..], stride)?;
                }
            },
        }
        Ok(())
    }

    /// Approximate heap and inline bytes held by this face, excluding tiles
    /// (which are charged when they load).
    pub fn mem_used(&self) -> usize {
        size_of::<Self>()
            + match self {
                Self::Constant(face) => face.pixel.len(),
                Self::Packed(face) => face.data.len(),
                Self::Tiled(face) => {
                    face.headers.len() * (size_of::<FaceDataHeader>() + size_of::<u64>() + size_of::<Slot>())
                },
                Self::TiledReduced(face) => face.tiles.len() * size_of::<Slot>(),
            }
    }
}

impl fmt::Debug for FaceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Constant(_) => "Constant",
            Self::Packed(_) => "Packed",
            Self::Tiled(_) => "Tiled",
            Self::TiledReduced(_) => "TiledReduced",
        };
        f.debug_struct(kind)
            .field("res", &self.res())
            .field("tile_res", &self.tile_res())
            .field("loaded_tiles", &self.loaded_tiles())
            .finish()
    }
}

/// A constant face holding `pixel`.
pub(crate) fn constant(pixel: Vec<u8>) -> FaceData {
    FaceData::Constant(ConstantFace { pixel })
}

fn write_texel(texel: &[u8], out: &mut [u8]) -> Result<()> {
    let got = out.len();
    let dst = out.get_mut(..texel.len()).ok_or_raise(|| ErrorKind::BufferTooSmall { needed: texel.len(), got })?;
    dst.copy_from_slice(texel);
    Ok(())
}

/// Decode one face or tile block.
#[instrument(level = "trace", skip(source), fields(encoding = %fdh.encoding(), size = fdh.block_size()))]
pub(crate) fn decode(source: &Arc<Source>, pos: u64, fdh: FaceDataHeader, res: Res) -> Result<FaceData> {
    let ps = source.layout.pixel_size();
    let compression = match fdh.encoding() {
        Encoding::Constant => {
            let mut pixel = source.read(pos, ps)?;
            source.layout.finish(&mut pixel);
            return Ok(FaceData::Constant(ConstantFace { pixel }));
        },
        Encoding::Tiled => return TiledFace::read(source, pos, res).map(FaceData::Tiled),
        Encoding::Zipped => Compression::Zlib,
        Encoding::Raw => Compression::None,
    };
    let block = source.read(pos, fdh.block_size())?;
    let mut data = source.inflate(compression, &block, ps * res.size())?;
    source.layout.finish(&mut data);
    Ok(FaceData::Packed(PackedFace { res, pixel_size: ps, data }))
}

impl PackedFace {
    fn reduce(&self, res: Res, reduce: ReduceFn, layout: PixelLayout) -> PackedFace {
        let ps = self.pixel_size;
        let mut data = vec![0u8; ps * res.size()];
        reduce(
            &self.data,
            ps * self.res.u(),
            self.res.u(),
            self.res.v(),
            &mut data,
            ps * res.u(),
            layout.data_type,
            layout.num_channels,
        );
        PackedFace { res, pixel_size: ps, data }
    }
}

impl TiledFace {
    fn read(source: &Arc<Source>, pos: u64, res: Res) -> Result<Self> {
        let prefix = source.read(pos, TILE_PREFIX_SIZE)?;
        let mut fields = Fields::new(&prefix);
        let tile_res = Res::new(fields.i8()?, fields.i8()?);
        let header_size = fields.u32()? as usize;
        if !tile_res.is_valid() || tile_res.ulog2 > res.ulog2 || tile_res.vlog2 > res.vlog2 {
            return Err(source.record(exn::Exn::from(ErrorKind::Malformed("tile resolution exceeds face"))));
        }

        let grid = TileGrid::new(res, tile_res, source.layout.pixel_size());
        let header_pos = pos + TILE_PREFIX_SIZE as u64;
        let raw = source.read_zipped(header_pos, header_size, grid.len() * FACE_DATA_HEADER_SIZE)?;
        let headers = FaceDataHeader::parse_all(&raw, grid.len())?;
        let mut next = header_pos + header_size as u64;
        let offsets = headers
            .iter()
            .map(|header| {
                let offset = next;
                next += header.block_size() as u64;
                offset
            })
            .collect();
        tracing::trace!(tiles = grid.len(), tile_res = %tile_res, "Read tile directory");
        Ok(Self { grid, headers, offsets, tiles: slots(grid.len()), source: Arc::clone(source) })
    }

    fn tile(&self, i: usize) -> Result<Arc<FaceData>> {
        let slot = self.tiles.get(i).ok_or_raise(|| ErrorKind::TileOutOfRange(i))?;
        if let Some(tile) = slot.get() {
            return Ok(Arc::clone(tile));
        }
        let header = self.headers[i];
        if header.encoding() == Encoding::Tiled {
            return Err(self.source.record(exn::Exn::from(ErrorKind::Malformed("nested tiles"))));
        }
        let tile = Arc::new(decode(&self.source, self.offsets[i], header, self.grid.tile_res)?);
        let size = tile.mem_used();
        Ok(Arc::clone(self.source.install(slot, tile, size)))
    }
}

impl TiledReducedFace {
    fn tile(&self, i: usize) -> Result<Arc<FaceData>> {
        let slot = self.tiles.get(i).ok_or_raise(|| ErrorKind::TileOutOfRange(i))?;
        if let Some(tile) = slot.get() {
            return Ok(Arc::clone(tile));
        }
        let parent = self.parent.grid().ok_or_raise(|| ErrorKind::Malformed("reduced face without tiles"))?;
        let nu = parent.ntiles_u / self.grid.ntiles_u;
        let nv = parent.ntiles_v / self.grid.ntiles_v;
        let (tu, tv) = (i % self.grid.ntiles_u, i / self.grid.ntiles_u);
        let mut tiles = Vec::with_capacity(nu * nv);
        for jv in 0..nv {
            for ju in 0..nu {
                tiles.push(self.parent.tile((tv * nv + jv) * parent.ntiles_u + tu * nu + ju)?);
            }
        }
        let tile = Arc::new(combine(&tiles, nu, nv, self.grid.tile_res, self.reduce, self.source.layout));
        let size = tile.mem_used();
        Ok(Arc::clone(self.source.install(slot, tile, size)))
    }
}

/// Reduce an `nu` x `nv` block of tiles into one face of resolution `res`.
/// Tiles that are all the same constant collapse into a constant face.
fn combine(tiles: &[Arc<FaceData>], nu: usize, nv: usize, res: Res, reduce: ReduceFn, layout: PixelLayout) -> FaceData {
    if let Some(FaceData::Constant(first)) = tiles.first().map(|tile| &**tile) {
        let same = tiles.iter().all(|tile| matches!(&**tile, FaceData::Constant(c) if c.pixel == first.pixel));
        if same {
            return FaceData::Constant(first.clone());
        }
    }
    let ps = layout.pixel_size();
    let stride = ps * res.u();
    let (pu, pv) = (res.u() / nu, res.v() / nv);
    let mut data = vec![0u8; stride * res.v()];
    for (i, tile) in tiles.iter().enumerate() {
        let offset = (i / nu) * pv * stride + (i % nu) * pu * ps;
        match &**tile {
            FaceData::Constant(face) => filter::fill(&face.pixel, &mut data[offset..], stride, pu, pv),
            FaceData::Packed(face) => reduce(
                &face.data,
                ps * face.res.u(),
                face.res.u(),
                face.res.v(),
                &mut data[offset..],
                stride,
                layout.data_type,
                layout.num_channels,
            ),
            // Tile blocks are never themselves tiled.
            FaceData::Tiled(_) | FaceData::TiledReduced(_) => {},
        }
    }
    FaceData::Packed(PackedFace { res, pixel_size: ps, data })
}

/// Produce `face` at the smaller resolution `res` with `reduce`.
///
/// Tiled faces stay tiled (and lazy) when the result still spans more than
/// one tile; otherwise every parent tile is reduced into one packed face.
#[instrument(level = "trace", skip(face, source, reduce), fields(from = %face.res(), to = %res))]
pub(crate) fn reduce(face: &Arc<FaceData>, source: &Arc<Source>, res: Res, reduce: ReduceFn) -> Result<FaceData> {
    let layout = source.layout;
    let grid = match &**face {
        FaceData::Constant(constant) => return Ok(FaceData::Constant(constant.clone())),
        FaceData::Packed(packed) => return Ok(FaceData::Packed(packed.reduce(res, reduce, layout))),
        FaceData::Tiled(TiledFace { grid, .. }) | FaceData::TiledReduced(TiledReducedFace { grid, .. }) => *grid,
    };

    let du = grid.res.ulog2 - res.ulog2;
    let dv = grid.res.vlog2 - res.vlog2;
    if source.mesh_type == MeshType::Triangle || grid.tile_res.ulog2 < du || grid.tile_res.vlog2 < dv {
        // Tiles too small to halve on their own; flatten first.
        let ps = layout.pixel_size();
        let mut data = vec![0u8; ps * grid.res.size()];
        face.copy_into(grid.res, &mut data, ps * grid.res.u())?;
        let whole = PackedFace { res: grid.res, pixel_size: ps, data };
        return Ok(FaceData::Packed(whole.reduce(res, reduce, layout)));
    }

    let tile_res = Res::new(grid.tile_res.ulog2.min(res.ulog2), grid.tile_res.vlog2.min(res.vlog2));
    let reduced = TileGrid::new(res, tile_res, grid.pixel_size);
    if reduced.len() == 1 {
        let tiles = (0..grid.len()).map(|i| face.tile(i)).collect::<Result<Vec<_>>>()?;
        return Ok(combine(&tiles, grid.ntiles_u, grid.ntiles_v, res, reduce, layout));
    }
    Ok(FaceData::TiledReduced(TiledReducedFace {
        grid: reduced,
        parent: Arc::clone(face),
        reduce,
        tiles: slots(reduced.len()),
        source: Arc::clone(source),
    }))
}
