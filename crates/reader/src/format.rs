//! On-disk records and the small value types they carry.
//!
//! Every multi-byte field is little-endian. Records are parsed from byte
//! slices with [`Fields`], which never panics on truncated input.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::OptionExt;

pub(crate) const MAGIC: u32 = u32::from_le_bytes(*b"Ptex");
pub(crate) const VERSION: u32 = 1;
pub(crate) const HEADER_SIZE: usize = 64;
pub(crate) const EXT_HEADER_SIZE: usize = 40;
pub(crate) const FACE_INFO_SIZE: usize = 20;
pub(crate) const LEVEL_INFO_SIZE: usize = 16;
pub(crate) const FACE_DATA_HEADER_SIZE: usize = 4;
/// Tile resolution (2 bytes) plus the zipped tile header size (4 bytes).
pub(crate) const TILE_PREFIX_SIZE: usize = 6;
/// Edit record type (1 byte) plus payload size (4 bytes).
pub(crate) const EDIT_PREFIX_SIZE: usize = 5;
/// Face id, face info and face data header of a face edit.
pub(crate) const FACE_EDIT_HEADER_SIZE: usize = 4 + FACE_INFO_SIZE + FACE_DATA_HEADER_SIZE;
/// Zipped and unzipped sizes of a metadata edit.
pub(crate) const META_EDIT_HEADER_SIZE: usize = 8;

/// Face resolution as a pair of base-2 logarithms.
///
/// Negative logs never describe stored data; they appear only as the result
/// of over-reducing a face, which callers reject.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
#[display("({ulog2}, {vlog2})")]
pub struct Res {
    pub ulog2: i8,
    pub vlog2: i8,
}

impl Res {
    /// Largest supported log2 in either direction.
    pub const MAX_LOG2: i8 = 20;

    pub const fn new(ulog2: i8, vlog2: i8) -> Self {
        Self { ulog2, vlog2 }
    }

    /// Width in texels. Zero for invalid resolutions.
    pub fn u(&self) -> usize {
        if self.is_valid() { 1 << self.ulog2 } else { 0 }
    }

    /// Height in texels. Zero for invalid resolutions.
    pub fn v(&self) -> usize {
        if self.is_valid() { 1 << self.vlog2 } else { 0 }
    }

    /// Number of texels.
    pub fn size(&self) -> usize {
        self.u() * self.v()
    }

    pub fn is_valid(&self) -> bool {
        (0..=Self::MAX_LOG2).contains(&self.ulog2) && (0..=Self::MAX_LOG2).contains(&self.vlog2)
    }

    /// Resolution with `u` and `v` exchanged.
    pub fn swapped(&self) -> Self {
        Self::new(self.vlog2, self.ulog2)
    }

    /// Number of tiles of size `tile` needed to cover this resolution in u.
    pub fn ntiles_u(&self, tile: Res) -> usize {
        1 << (self.ulog2 - tile.ulog2).max(0)
    }

    /// Number of tiles of size `tile` needed to cover this resolution in v.
    pub fn ntiles_v(&self, tile: Res) -> usize {
        1 << (self.vlog2 - tile.vlog2).max(0)
    }

    fn parse(f: &mut Fields<'_>) -> Result<Self> {
        Ok(Self::new(f.i8()?, f.i8()?))
    }
}

/// Storage type of a single channel sample.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum DataType {
    #[display("uint8")]
    U8,
    #[display("uint16")]
    U16,
    #[display("float16")]
    Half,
    #[display("float32")]
    Float,
}

impl DataType {
    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::Half => 2,
            Self::Float => 4,
        }
    }

    /// Sample value that represents full intensity.
    pub fn one_value(&self) -> f32 {
        match self {
            Self::U8 => u8::MAX as f32,
            Self::U16 => u16::MAX as f32,
            Self::Half | Self::Float => 1.0,
        }
    }

    fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::U8,
            1 => Self::U16,
            2 => Self::Half,
            3 => Self::Float,
            _ => exn::bail!(ErrorKind::Malformed("unknown data type")),
        })
    }
}

/// Kind of mesh the faces belong to.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum MeshType {
    #[display("triangle")]
    Triangle,
    #[display("quad")]
    Quad,
}

impl MeshType {
    fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::Triangle,
            1 => Self::Quad,
            _ => exn::bail!(ErrorKind::Malformed("unknown mesh type")),
        })
    }
}

/// How lookups beyond a face edge without a neighbour behave.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum BorderMode {
    #[default]
    #[display("clamp")]
    Clamp,
    #[display("black")]
    Black,
    #[display("periodic")]
    Periodic,
}

impl BorderMode {
    fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::Clamp,
            1 => Self::Black,
            2 => Self::Periodic,
            _ => exn::bail!(ErrorKind::Malformed("unknown border mode")),
        })
    }
}

/// Filtering behaviour across face edges.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum EdgeFilterMode {
    #[default]
    #[display("none")]
    None,
    #[display("tanvec")]
    TangentVector,
}

impl EdgeFilterMode {
    fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::None,
            1 => Self::TangentVector,
            _ => exn::bail!(ErrorKind::Malformed("unknown edge filter mode")),
        })
    }
}

/// Element type of a metadata value.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum MetaDataType {
    #[display("string")]
    String,
    #[display("int8")]
    Int8,
    #[display("int16")]
    Int16,
    #[display("int32")]
    Int32,
    #[display("float")]
    Float,
    #[display("double")]
    Double,
}

impl MetaDataType {
    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            Self::String | Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float => 4,
            Self::Double => 8,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => Self::String,
            1 => Self::Int8,
            2 => Self::Int16,
            3 => Self::Int32,
            4 => Self::Float,
            5 => Self::Double,
            _ => exn::bail!(ErrorKind::Malformed("unknown metadata type")),
        })
    }
}

/// How a face or tile block is stored.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// A single pixel.
    #[display("constant")]
    Constant,
    /// One zlib stream of the whole face.
    #[display("zipped")]
    Zipped,
    /// Uncompressed texels.
    #[display("raw")]
    Raw,
    /// A tile header followed by per-tile blocks.
    #[display("tiled")]
    Tiled,
}

/// Block size and encoding packed into one word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FaceDataHeader(pub u32);

impl FaceDataHeader {
    const SIZE_MASK: u32 = 0x3fff_ffff;

    pub fn new(block_size: u32, encoding: Encoding) -> Self {
        let bits = match encoding {
            Encoding::Constant => 0,
            Encoding::Zipped => 1,
            Encoding::Raw => 2,
            Encoding::Tiled => 3,
        };
        Self((block_size & Self::SIZE_MASK) | (bits << 30))
    }

    pub fn block_size(&self) -> usize {
        (self.0 & Self::SIZE_MASK) as usize
    }

    pub fn encoding(&self) -> Encoding {
        match self.0 >> 30 {
            0 => Encoding::Constant,
            1 => Encoding::Zipped,
            2 => Encoding::Raw,
            _ => Encoding::Tiled,
        }
    }

    /// Parse a packed array of headers.
    pub(crate) fn parse_all(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        let mut f = Fields::new(bytes);
        (0..count).map(|_| f.u32().map(Self)).collect()
    }
}

/// Fixed file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub mesh_type: MeshType,
    pub data_type: DataType,
    /// Alpha channel index, if any.
    pub alpha_channel: Option<usize>,
    pub num_channels: usize,
    pub num_levels: usize,
    pub num_faces: usize,
    pub ext_header_size: usize,
    pub face_info_size: usize,
    pub const_data_size: usize,
    pub level_info_size: usize,
    pub minor_version: u32,
    pub level_data_size: u64,
    pub meta_data_zip_size: usize,
    pub meta_data_mem_size: usize,
}

impl Header {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let mut f = Fields::new(bytes);
        if f.u32()? != MAGIC {
            exn::bail!(ErrorKind::BadMagic);
        }
        let version = f.u32()?;
        if version != VERSION {
            exn::bail!(ErrorKind::UnsupportedVersion(version));
        }
        let mesh_type = MeshType::from_raw(f.u32()?)?;
        let data_type = DataType::from_raw(f.u32()?)?;
        let alpha_channel = f.i32()?;
        let num_channels = f.u16()? as usize;
        let num_levels = f.u16()? as usize;
        let header = Self {
            mesh_type,
            data_type,
            alpha_channel: usize::try_from(alpha_channel).ok(),
            num_channels,
            num_levels,
            num_faces: f.u32()? as usize,
            ext_header_size: f.u32()? as usize,
            face_info_size: f.u32()? as usize,
            const_data_size: f.u32()? as usize,
            level_info_size: f.u32()? as usize,
            minor_version: f.u32()?,
            level_data_size: f.u64()?,
            meta_data_zip_size: f.u32()? as usize,
            meta_data_mem_size: f.u32()? as usize,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.num_channels == 0 {
            exn::bail!(ErrorKind::Malformed("no channels"));
        }
        if self.alpha_channel.is_some_and(|alpha| alpha >= self.num_channels) {
            exn::bail!(ErrorKind::Malformed("alpha channel out of range"));
        }
        if self.num_faces > 0 && self.num_levels == 0 {
            exn::bail!(ErrorKind::Malformed("no levels"));
        }
        if self.level_info_size < self.num_levels * LEVEL_INFO_SIZE {
            exn::bail!(ErrorKind::Malformed("level table smaller than level count"));
        }
        Ok(())
    }

    /// Bytes per texel.
    pub fn pixel_size(&self) -> usize {
        self.data_type.size() * self.num_channels
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha_channel.is_some()
    }
}

/// Extended header. Older files carry a prefix of it; missing fields read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtHeader {
    pub u_border_mode: BorderMode,
    pub v_border_mode: BorderMode,
    pub edge_filter_mode: EdgeFilterMode,
    pub lmd_header_zip_size: usize,
    pub lmd_header_mem_size: usize,
    pub lmd_data_size: u64,
    /// Start of the edit journal, or zero if the writer didn't record it.
    pub edit_data_size: u64,
    pub edit_data_pos: u64,
}

impl ExtHeader {
    /// Parse the first `len` bytes of an extended header.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let mut padded = [0u8; EXT_HEADER_SIZE];
        let len = bytes.len().min(EXT_HEADER_SIZE);
        padded[..len].copy_from_slice(&bytes[..len]);

        let mut f = Fields::new(&padded);
        let u_border_mode = BorderMode::from_raw(f.u16()? as u32)?;
        let edge_filter_mode = EdgeFilterMode::from_raw(f.u16()? as u32)?;
        let v_border_mode = BorderMode::from_raw(f.u16()? as u32)?;
        f.skip(2)?;
        // Writers predating per-direction border modes stored only the u mode.
        let v_border_mode = if len < 6 { u_border_mode } else { v_border_mode };
        let lmd_header_zip_size = f.u32()? as usize;
        let lmd_header_mem_size = f.u32()? as usize;
        let lmd_data_size = f.u64()?;
        let edit_data_size = f.u64()?;
        let edit_data_pos = f.u64()?;
        Ok(Self {
            u_border_mode,
            v_border_mode,
            edge_filter_mode,
            lmd_header_zip_size,
            lmd_header_mem_size,
            lmd_data_size,
            edit_data_size,
            edit_data_pos,
        })
    }
}

/// Per-face record from the face table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FaceInfo {
    /// Native resolution.
    pub res: Res,
    /// Packed adjacent edge ids, two bits per edge.
    pub adj_edges: u8,
    pub flags: u8,
    /// Adjacent face ids, `-1` where there is no neighbour.
    pub adj_faces: [i32; 4],
}

impl FaceInfo {
    pub const FLAG_CONSTANT: u8 = 1;
    pub const FLAG_HAS_EDITS: u8 = 2;
    pub const FLAG_NEIGHBORHOOD_CONSTANT: u8 = 4;
    pub const FLAG_SUBFACE: u8 = 8;

    pub fn is_constant(&self) -> bool {
        self.flags & Self::FLAG_CONSTANT != 0
    }

    pub fn has_edits(&self) -> bool {
        self.flags & Self::FLAG_HAS_EDITS != 0
    }

    pub fn is_neighborhood_constant(&self) -> bool {
        self.flags & Self::FLAG_NEIGHBORHOOD_CONSTANT != 0
    }

    pub fn is_subface(&self) -> bool {
        self.flags & Self::FLAG_SUBFACE != 0
    }

    /// Edge of the neighbour across edge `edge` (0..4).
    pub fn adj_edge(&self, edge: usize) -> u8 {
        (self.adj_edges >> (2 * (edge & 3))) & 3
    }

    /// Neighbour across edge `edge` (0..4), if any.
    pub fn adj_face(&self, edge: usize) -> Option<usize> {
        usize::try_from(self.adj_faces[edge & 3]).ok()
    }

    pub(crate) fn parse(f: &mut Fields<'_>) -> Result<Self> {
        let res = Res::parse(f)?;
        let adj_edges = f.u8()?;
        let flags = f.u8()?;
        let mut adj_faces = [0i32; 4];
        for face in &mut adj_faces {
            *face = f.i32()?;
        }
        Ok(Self { res, adj_edges, flags, adj_faces })
    }

    /// Parse the face table and check every native resolution.
    pub(crate) fn parse_all(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        let mut f = Fields::new(bytes);
        (0..count)
            .map(|_| {
                let info = Self::parse(&mut f)?;
                if !info.res.is_valid() {
                    exn::bail!(ErrorKind::Malformed("face resolution out of range"));
                }
                Ok(info)
            })
            .collect()
    }
}

/// Per-level record from the level table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LevelInfo {
    /// Bytes of the whole level: face header block plus face blocks.
    pub level_data_size: u64,
    /// Zipped size of the level's face header block.
    pub level_header_size: usize,
    /// Faces stored at this level.
    pub num_faces: usize,
}

impl LevelInfo {
    pub(crate) fn parse_all(bytes: &[u8], count: usize) -> Result<Vec<Self>> {
        let mut f = Fields::new(bytes);
        (0..count)
            .map(|_| {
                Ok(Self {
                    level_data_size: f.u64()?,
                    level_header_size: f.u32()? as usize,
                    num_faces: f.u32()? as usize,
                })
            })
            .collect()
    }
}

/// Cursor over a little-endian record.
pub(crate) struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        let end = end.ok_or_raise(|| ErrorKind::Malformed("truncated record"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}
