//! Text dumps of a texture file's tables and data.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use ptex_reader::{FaceInfo, Reader, Res};
use std::io::Write;

macro_rules! emit {
    ($out:expr, $($arg:tt)*) => {
        writeln!($out, $($arg)*).or_raise(|| ErrorKind::Output)?
    };
}

pub fn header(reader: &Reader, out: &mut impl Write) -> Result<()> {
    let alpha = reader.alpha_channel().map_or_else(|| "(none)".to_string(), |alpha| alpha.to_string());
    emit!(out, "meshType: {}", reader.mesh_type());
    emit!(out, "dataType: {}", reader.data_type());
    emit!(out, "numChannels: {}", reader.num_channels());
    emit!(out, "alphaChannel: {alpha}");
    emit!(out, "numFaces: {}", reader.num_faces());
    emit!(out, "numLevels: {}", reader.num_levels());
    emit!(out, "hasEdits: {}", reader.has_edits());
    emit!(out, "hasMipMaps: {}", reader.has_mipmaps());
    emit!(out, "uBorderMode: {}", reader.u_border_mode());
    emit!(out, "vBorderMode: {}", reader.v_border_mode());
    emit!(out, "edgeFilterMode: {}", reader.edge_filter_mode());
    Ok(())
}

pub fn metadata(reader: &Reader, out: &mut impl Write) -> Result<()> {
    let metadata = reader.metadata().or_raise(|| ErrorKind::Read)?;
    emit!(out, "metaData: {} keys", metadata.num_keys());
    for (key, kind) in metadata.keys() {
        match metadata.value(key).or_raise(|| ErrorKind::Read)? {
            Some(value) => emit!(out, "  {key} ({kind}): {value}"),
            None => emit!(out, "  {key} ({kind}): (missing)"),
        }
    }
    Ok(())
}

pub fn levels(reader: &Reader, out: &mut impl Write) -> Result<()> {
    for level in 0..reader.num_levels() {
        let info = reader.level_info(level).or_raise(|| ErrorKind::Read)?;
        emit!(
            out,
            "level {level}: faces={} headerSize={} dataSize={}",
            info.num_faces,
            info.level_header_size,
            info.level_data_size
        );
    }
    Ok(())
}

pub fn face(reader: &Reader, face_id: usize, out: &mut impl Write) -> Result<()> {
    let info = reader.face_info(face_id).or_raise(|| ErrorKind::Read)?;
    emit!(out, "face {face_id}: {}", describe(&info));
    Ok(())
}

fn describe(info: &FaceInfo) -> String {
    let adjacent = (0..4)
        .map(|edge| match info.adj_face(edge) {
            Some(face) => format!("{face}:{}", info.adj_edge(edge)),
            None => "-".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    let mut flags = Vec::new();
    if info.is_constant() {
        flags.push("constant");
    }
    if info.has_edits() {
        flags.push("edited");
    }
    if info.is_subface() {
        flags.push("subface");
    }
    if info.is_neighborhood_constant() {
        flags.push("nbconstant");
    }
    format!("res={} adj=[{adjacent}] flags=[{}]", info.res, flags.join(","))
}

/// Print up to `max_texels` texels of a face as normalized floats, row by
/// row. Zero prints every texel.
pub fn texels(reader: &Reader, face_id: usize, max_texels: usize, out: &mut impl Write) -> Result<()> {
    let face = reader.data(face_id).or_raise(|| ErrorKind::Read)?;
    let res = if face.is_constant() { Res::new(0, 0) } else { face.res() };
    let total = res.size();
    let limit = if max_texels == 0 { total } else { max_texels.min(total) };
    let mut pixel = vec![0f32; reader.num_channels()];
    for i in 0..limit {
        let (u, v) = (i % res.u(), i / res.u());
        reader.pixel(face_id, u, v, &mut pixel, 0).or_raise(|| ErrorKind::Read)?;
        emit!(out, "  ({u}, {v}): {}", format_texel(&pixel));
    }
    if limit < total {
        emit!(out, "  ... {} more", total - limit);
    }
    Ok(())
}

fn format_texel(pixel: &[f32]) -> String {
    pixel.iter().map(|value| format!("{value:.4}")).collect::<Vec<_>>().join(" ")
}

pub fn cache(reader: &Reader, out: &mut impl Write) -> Result<()> {
    let stats = reader.cache_stats();
    emit!(out, "memUsed: {}", stats.mem_used);
    emit!(out, "reductions: {}", stats.reductions);
    for (level, faces) in stats.levels {
        emit!(out, "level {level}: {faces} faces decoded");
    }
    Ok(())
}
