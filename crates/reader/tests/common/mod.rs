//! Builds texture files in memory for integration tests.

#![allow(dead_code)]

use ptex_compress::Compression;
use ptex_io::MemoryInputHandler;
use ptex_reader::{DataType, Encoding, FaceDataHeader, MeshType, MetaDataType, Reader, ReaderOptions, Res};
use std::sync::Arc;

pub const PATH: &str = "fixture.ptx";

pub fn zip(bytes: &[u8]) -> Vec<u8> {
    Compression::Zlib.compress(bytes).unwrap()
}

/// How a face's texels are stored.
#[derive(Clone, Debug)]
pub enum Body {
    Constant(Vec<u8>),
    Packed { data: Vec<u8>, zipped: bool },
    Tiled { tile_res: Res, data: Vec<u8> },
    /// A zipped block that fails to inflate.
    Corrupt(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct Face {
    pub res: Res,
    pub body: Body,
}

impl Face {
    pub fn constant(pixel: Vec<u8>) -> Self {
        Self { res: Res::new(0, 0), body: Body::Constant(pixel) }
    }

    pub fn zipped(res: Res, data: Vec<u8>) -> Self {
        Self { res, body: Body::Packed { data, zipped: true } }
    }

    pub fn raw(res: Res, data: Vec<u8>) -> Self {
        Self { res, body: Body::Packed { data, zipped: false } }
    }

    pub fn tiled(res: Res, tile_res: Res, data: Vec<u8>) -> Self {
        Self { res, body: Body::Tiled { tile_res, data } }
    }

    pub fn corrupt(res: Res) -> Self {
        Self { res, body: Body::Corrupt(vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x11]) }
    }

    fn is_constant(&self) -> bool {
        matches!(self.body, Body::Constant(_))
    }

    /// The constant-table entry: the pixel of a constant face, else the
    /// first texel.
    fn const_pixel(&self, ps: usize) -> Vec<u8> {
        match &self.body {
            Body::Constant(pixel) => pixel.clone(),
            Body::Packed { data, .. } | Body::Tiled { data, .. } => data[..ps].to_vec(),
            Body::Corrupt(_) => vec![0; ps],
        }
    }

    fn info(&self) -> Vec<u8> {
        let mut out = vec![self.res.ulog2 as u8, self.res.vlog2 as u8, 0, u8::from(self.is_constant())];
        for _ in 0..4 {
            out.extend_from_slice(&(-1i32).to_le_bytes());
        }
        out
    }

    fn encode(&self, ps: usize) -> (FaceDataHeader, Vec<u8>) {
        let (encoding, block) = match &self.body {
            Body::Constant(pixel) => (Encoding::Constant, pixel.clone()),
            Body::Packed { data, zipped: true } => (Encoding::Zipped, zip(data)),
            Body::Packed { data, zipped: false } => (Encoding::Raw, data.clone()),
            Body::Tiled { tile_res, data } => (Encoding::Tiled, encode_tiles(self.res, *tile_res, data, ps)),
            Body::Corrupt(bytes) => (Encoding::Zipped, bytes.clone()),
        };
        (FaceDataHeader::new(block.len() as u32, encoding), block)
    }
}

fn encode_tiles(res: Res, tile_res: Res, data: &[u8], ps: usize) -> Vec<u8> {
    let (ntiles_u, ntiles_v) = (res.u() / tile_res.u(), res.v() / tile_res.v());
    let rowlen = tile_res.u() * ps;
    let mut headers = Vec::new();
    let mut blocks = Vec::new();
    for tv in 0..ntiles_v {
        for tu in 0..ntiles_u {
            let mut tile = Vec::with_capacity(rowlen * tile_res.v());
            for row in 0..tile_res.v() {
                let start = ((tv * tile_res.v() + row) * res.u() + tu * tile_res.u()) * ps;
                tile.extend_from_slice(&data[start..start + rowlen]);
            }
            let first = tile[..ps].to_vec();
            let (encoding, block) = if tile.chunks_exact(ps).all(|texel| texel == first.as_slice()) {
                (Encoding::Constant, first)
            } else {
                (Encoding::Zipped, zip(&tile))
            };
            headers.extend_from_slice(&FaceDataHeader::new(block.len() as u32, encoding).0.to_le_bytes());
            blocks.extend_from_slice(&block);
        }
    }
    let headers = zip(&headers);
    let mut out = vec![tile_res.ulog2 as u8, tile_res.vlog2 as u8];
    out.extend_from_slice(&(headers.len() as u32).to_le_bytes());
    out.extend_from_slice(&headers);
    out.extend_from_slice(&blocks);
    out
}

#[derive(Clone, Debug)]
pub struct Meta {
    pub key: String,
    pub kind: MetaDataType,
    pub data: Vec<u8>,
}

impl Meta {
    pub fn string(key: &str, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self { key: key.to_string(), kind: MetaDataType::String, data }
    }

    pub fn int32(key: &str, values: &[i32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self { key: key.to_string(), kind: MetaDataType::Int32, data }
    }

    pub fn double(key: &str, values: &[f64]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self { key: key.to_string(), kind: MetaDataType::Double, data }
    }

    fn key_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.key.len() as u8 + 1);
        out.extend_from_slice(self.key.as_bytes());
        out.push(0);
        out.push(self.kind as u8);
    }

    fn entry(&self, out: &mut Vec<u8>) {
        self.key_bytes(out);
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.data);
    }
}

fn meta_block(entries: &[Meta]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        entry.entry(&mut out);
    }
    out
}

#[derive(Clone, Debug)]
pub enum Edit {
    Face { face_id: u32, face: Face },
    Meta(Vec<Meta>),
    /// A record of unknown type carrying `len` filler bytes.
    Unknown(usize),
}

/// A texture file under construction.
#[derive(Clone, Debug)]
pub struct Fixture {
    mesh_type: MeshType,
    data_type: DataType,
    num_channels: usize,
    alpha_channel: Option<usize>,
    border_modes: (u16, u16),
    ext_header_size: usize,
    faces: Vec<Face>,
    levels: Vec<Vec<Face>>,
    meta: Vec<Meta>,
    large_meta: Vec<Meta>,
    edits: Vec<Edit>,
    record_edit_pos: bool,
    truncate_edits: usize,
}

impl Fixture {
    pub fn new(data_type: DataType, num_channels: usize) -> Self {
        Self {
            mesh_type: MeshType::Quad,
            data_type,
            num_channels,
            alpha_channel: None,
            border_modes: (0, 0),
            ext_header_size: 40,
            faces: Vec::new(),
            levels: Vec::new(),
            meta: Vec::new(),
            large_meta: Vec::new(),
            edits: Vec::new(),
            record_edit_pos: true,
            truncate_edits: 0,
        }
    }

    pub fn triangles(mut self) -> Self {
        self.mesh_type = MeshType::Triangle;
        self
    }

    pub fn alpha(mut self, channel: usize) -> Self {
        self.alpha_channel = Some(channel);
        self
    }

    pub fn border_modes(mut self, u: u16, v: u16) -> Self {
        self.border_modes = (u, v);
        self
    }

    /// Write only the first `size` bytes of the extension header.
    pub fn ext_header_size(mut self, size: usize) -> Self {
        self.ext_header_size = size;
        self
    }

    pub fn face(mut self, face: Face) -> Self {
        self.faces.push(face);
        self
    }

    /// A stored reduction level, faces in reduction order.
    pub fn level(mut self, faces: Vec<Face>) -> Self {
        self.levels.push(faces);
        self
    }

    pub fn meta(mut self, entry: Meta) -> Self {
        self.meta.push(entry);
        self
    }

    pub fn large_meta(mut self, entry: Meta) -> Self {
        self.large_meta.push(entry);
        self
    }

    pub fn edit(mut self, edit: Edit) -> Self {
        self.edits.push(edit);
        self
    }

    /// Leave the journal extent out of the extension header.
    pub fn without_edit_pos(mut self) -> Self {
        self.record_edit_pos = false;
        self
    }

    /// Cut `bytes` off the end of the file.
    pub fn truncate(mut self, bytes: usize) -> Self {
        self.truncate_edits = bytes;
        self
    }

    pub fn pixel_size(&self) -> usize {
        self.data_type.size() * self.num_channels
    }

    pub fn build(&self) -> Vec<u8> {
        let ps = self.pixel_size();
        let face_info = zip(&self.faces.iter().flat_map(Face::info).collect::<Vec<_>>());
        let const_data = zip(&self.faces.iter().flat_map(|face| face.const_pixel(ps)).collect::<Vec<_>>());

        let mut level_info = Vec::new();
        let mut level_data = Vec::new();
        for faces in std::iter::once(&self.faces).chain(&self.levels) {
            let mut headers = Vec::new();
            let mut blocks = Vec::new();
            for face in faces {
                let (fdh, block) = face.encode(ps);
                headers.extend_from_slice(&fdh.0.to_le_bytes());
                blocks.extend_from_slice(&block);
            }
            let headers = zip(&headers);
            level_info.extend_from_slice(&((headers.len() + blocks.len()) as u64).to_le_bytes());
            level_info.extend_from_slice(&(headers.len() as u32).to_le_bytes());
            level_info.extend_from_slice(&(faces.len() as u32).to_le_bytes());
            level_data.extend_from_slice(&headers);
            level_data.extend_from_slice(&blocks);
        }

        let meta_mem = meta_block(&self.meta);
        let meta_zip = if self.meta.is_empty() { Vec::new() } else { zip(&meta_mem) };

        let mut lmd_header = Vec::new();
        let mut lmd_data = Vec::new();
        for entry in &self.large_meta {
            let payload = zip(&entry.data);
            entry.key_bytes(&mut lmd_header);
            lmd_header.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            lmd_header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            lmd_data.extend_from_slice(&payload);
        }
        let lmd_zip = if self.large_meta.is_empty() { Vec::new() } else { zip(&lmd_header) };

        let mut edits = Vec::new();
        for edit in &self.edits {
            let (kind, payload) = match edit {
                Edit::Face { face_id, face } => {
                    let (fdh, block) = face.encode(ps);
                    let mut payload = face_id.to_le_bytes().to_vec();
                    payload.extend_from_slice(&face.info());
                    payload.extend_from_slice(&fdh.0.to_le_bytes());
                    payload.extend_from_slice(&face.const_pixel(ps));
                    payload.extend_from_slice(&block);
                    (0u8, payload)
                },
                Edit::Meta(entries) => {
                    let mem = meta_block(entries);
                    let zipped = zip(&mem);
                    let mut payload = (zipped.len() as u32).to_le_bytes().to_vec();
                    payload.extend_from_slice(&(mem.len() as u32).to_le_bytes());
                    payload.extend_from_slice(&zipped);
                    (1u8, payload)
                },
                Edit::Unknown(len) => (7u8, vec![0xaa; *len]),
            };
            edits.push(kind);
            edits.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            edits.extend_from_slice(&payload);
        }

        let ext_size = self.ext_header_size;
        let tables = 64 + ext_size + face_info.len() + const_data.len() + level_info.len();
        let edit_pos =
            tables + level_data.len() + meta_zip.len() + lmd_zip.len() + lmd_data.len();
        let (edit_data_pos, edit_data_size) =
            if self.record_edit_pos { (edit_pos as u64, edits.len() as u64) } else { (0, 0) };

        let mut out = Vec::new();
        out.extend_from_slice(b"Ptex");
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(self.mesh_type as u32).to_le_bytes());
        out.extend_from_slice(&(self.data_type as u32).to_le_bytes());
        out.extend_from_slice(&self.alpha_channel.map_or(-1, |alpha| alpha as i32).to_le_bytes());
        out.extend_from_slice(&(self.num_channels as u16).to_le_bytes());
        out.extend_from_slice(&((1 + self.levels.len()) as u16).to_le_bytes());
        out.extend_from_slice(&(self.faces.len() as u32).to_le_bytes());
        out.extend_from_slice(&(ext_size as u32).to_le_bytes());
        out.extend_from_slice(&(face_info.len() as u32).to_le_bytes());
        out.extend_from_slice(&(const_data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(level_info.len() as u32).to_le_bytes());
        out.extend_from_slice(&4u32.to_le_bytes());
        out.extend_from_slice(&(level_data.len() as u64).to_le_bytes());
        out.extend_from_slice(&(meta_zip.len() as u32).to_le_bytes());
        out.extend_from_slice(&(meta_mem.len() as u32).to_le_bytes());

        let mut ext = Vec::new();
        ext.extend_from_slice(&self.border_modes.0.to_le_bytes());
        ext.extend_from_slice(&0u16.to_le_bytes());
        ext.extend_from_slice(&self.border_modes.1.to_le_bytes());
        ext.extend_from_slice(&0u16.to_le_bytes());
        ext.extend_from_slice(&(lmd_zip.len() as u32).to_le_bytes());
        ext.extend_from_slice(&(lmd_header.len() as u32).to_le_bytes());
        ext.extend_from_slice(&(lmd_data.len() as u64).to_le_bytes());
        ext.extend_from_slice(&edit_data_size.to_le_bytes());
        ext.extend_from_slice(&edit_data_pos.to_le_bytes());
        ext.resize(ext_size, 0);
        out.extend_from_slice(&ext);

        for section in [&face_info, &const_data, &level_info, &level_data, &meta_zip, &lmd_zip, &lmd_data, &edits] {
            out.extend_from_slice(section);
        }
        out.truncate(out.len() - self.truncate_edits);
        out
    }

    pub fn handler(&self) -> Arc<MemoryInputHandler> {
        Arc::new(MemoryInputHandler::with_files([(PATH, self.build())]))
    }

    pub fn open(&self) -> (Arc<MemoryInputHandler>, Reader) {
        self.open_with(ReaderOptions::default())
    }

    pub fn open_with(&self, options: ReaderOptions) -> (Arc<MemoryInputHandler>, Reader) {
        let handler = self.handler();
        let reader = Reader::open_with(PATH, options.with_handler(handler.clone())).unwrap();
        (handler, reader)
    }
}

/// `res.size()` texels of `ps` bytes; texel `i` byte `c` is `f(i, c)`.
pub fn texels(res: Res, ps: usize, f: impl Fn(usize, usize) -> u8) -> Vec<u8> {
    (0..res.size()).flat_map(|i| (0..ps).map(move |c| (i, c))).map(|(i, c)| f(i, c)).collect()
}
