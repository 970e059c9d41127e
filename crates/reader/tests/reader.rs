mod common;

use common::{Face, Fixture, Meta, PATH, texels};
use ptex_reader::error::ErrorKind;
use ptex_reader::{BorderMode, DataType, MeshType, MetaDataType, MetaValue, Reader, ReaderOptions, Res};
use rstest::rstest;
use std::io::Write;

fn ramp(i: usize, c: usize) -> u8 {
    ((i * 7 + c * 31) % 256) as u8
}

fn assert_close(got: &[f32], expected: &[f32]) {
    assert_eq!(got.len(), expected.len());
    for (g, e) in got.iter().zip(expected) {
        assert!((g - e).abs() < 1e-6, "{got:?} != {expected:?}");
    }
}

#[test]
fn test_open_reads_header() {
    let fixture = Fixture::new(DataType::U8, 3)
        .border_modes(1, 2)
        .face(Face::constant(vec![1, 2, 3]))
        .face(Face::zipped(Res::new(1, 1), texels(Res::new(1, 1), 3, ramp)));
    let (handler, reader) = fixture.open();

    assert!(reader.ok());
    assert_eq!(reader.error(), None);
    assert_eq!(reader.path().to_str(), Some(PATH));
    assert_eq!(reader.num_faces(), 2);
    assert_eq!(reader.num_channels(), 3);
    assert_eq!(reader.num_levels(), 1);
    assert_eq!(reader.pixel_size(), 3);
    assert_eq!(reader.data_type(), DataType::U8);
    assert_eq!(reader.mesh_type(), MeshType::Quad);
    assert_eq!(reader.alpha_channel(), None);
    assert!(!reader.header().has_alpha());
    assert!(!reader.has_edits());
    assert!(!reader.has_mipmaps());
    assert_eq!(reader.u_border_mode(), BorderMode::Black);
    assert_eq!(reader.v_border_mode(), BorderMode::Periodic);
    assert!(reader.face_info(0).unwrap().is_constant());
    assert_eq!(reader.face_info(1).unwrap().res, Res::new(1, 1));
    assert_eq!(reader.level_info(0).unwrap().num_faces, 2);
    // Tables only; no face was decoded.
    assert!(reader.cache_stats().levels.is_empty());
    assert_eq!(handler.stats().opens(), 1);
}

#[test]
fn test_short_ext_header_reuses_u_border_mode() {
    let fixture = Fixture::new(DataType::U8, 1)
        .border_modes(2, 0)
        .ext_header_size(4)
        .face(Face::constant(vec![7]));
    let (_, reader) = fixture.open();
    assert_eq!(reader.u_border_mode(), BorderMode::Periodic);
    assert_eq!(reader.v_border_mode(), BorderMode::Periodic);
    assert_eq!(reader.data(0).unwrap().data(), Some(&[7u8][..]));
}

#[rstest]
#[case(b"Xtex".to_vec(), ErrorKind::BadMagic)]
#[case(vec![], ErrorKind::ShortRead { offset: 0, wanted: 64, got: 0 })]
fn test_open_rejects_bad_files(#[case] bytes: Vec<u8>, #[case] expected: ErrorKind) {
    let mut file = Fixture::new(DataType::U8, 1).face(Face::constant(vec![0])).build();
    if bytes.is_empty() {
        file.clear();
    } else {
        file[..bytes.len()].copy_from_slice(&bytes);
    }
    let handler = std::sync::Arc::new(ptex_io::MemoryInputHandler::with_files([(PATH, file)]));
    let err = Reader::open_with(PATH, ReaderOptions::default().with_handler(handler)).unwrap_err();
    assert_eq!(*err, expected);
}

#[test]
fn test_open_missing_file() {
    let handler = std::sync::Arc::new(ptex_io::MemoryInputHandler::default());
    let err = Reader::open_with("missing.ptx", ReaderOptions::default().with_handler(handler)).unwrap_err();
    assert!(matches!(*err, ErrorKind::Io(_)));
}

#[test]
fn test_zipped_face_copy_and_reduce() {
    let res = Res::new(3, 3);
    let data = texels(res, 4, ramp);
    let (_, reader) = Fixture::new(DataType::U8, 4).face(Face::zipped(res, data.clone())).open();

    let mut buffer = vec![0u8; 8 * 32];
    reader.copy_data(0, &mut buffer, 32).unwrap();
    assert_eq!(buffer, data);

    let mut reduced = vec![0u8; 4 * 4 * 4];
    reader.copy_data_at(0, Res::new(2, 2), &mut reduced, 0).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            for c in 0..4 {
                let sum: usize = [(0, 0), (1, 0), (0, 1), (1, 1)]
                    .iter()
                    .map(|(dx, dy)| ramp((2 * y + dy) * 8 + 2 * x + dx, c) as usize)
                    .sum();
                let got = reduced[(y * 4 + x) * 4 + c] as f32;
                assert!((got - sum as f32 / 4.0).abs() <= 1.0, "texel ({x}, {y}) channel {c}");
            }
        }
    }
}

#[test]
fn test_copy_data_strided_rows() {
    let res = Res::new(1, 1);
    let (_, reader) = Fixture::new(DataType::U8, 1).face(Face::raw(res, vec![1, 2, 3, 4])).open();
    let mut buffer = vec![0u8; 5];
    reader.copy_data(0, &mut buffer, 3).unwrap();
    assert_eq!(buffer, [1, 2, 0, 3, 4]);

    let mut small = vec![0u8; 4];
    let err = reader.copy_data(0, &mut small, 3).unwrap_err();
    assert_eq!(*err, ErrorKind::BufferTooSmall { needed: 5, got: 4 });
}

#[test]
fn test_constant_face_answers_any_coordinate() {
    let (_, reader) = Fixture::new(DataType::U8, 3).face(Face::constant(vec![10, 20, 30])).open();
    let face = reader.data(0).unwrap();
    assert!(face.is_constant());
    let mut texel = [0u8; 3];
    face.pixel(1000, 7, &mut texel).unwrap();
    assert_eq!(texel, [10, 20, 30]);

    let mut out = [0f32; 3];
    reader.pixel(0, 12, 3, &mut out, 0).unwrap();
    assert_close(&out, &[10.0 / 255.0, 20.0 / 255.0, 30.0 / 255.0]);

    let mut buffer = vec![0u8; 12];
    reader.copy_data_at(0, Res::new(1, 1), &mut buffer, 0).unwrap();
    assert_eq!(buffer, [10, 20, 30].repeat(4));
}

#[test]
fn test_pixel_converts_channel_range() {
    let res = Res::new(1, 0);
    let data: Vec<u8> = [0u16, 65535, 32768, 1, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    let (_, reader) = Fixture::new(DataType::U16, 3).face(Face::raw(res, data)).open();

    let mut out = [9f32; 3];
    reader.pixel(0, 0, 0, &mut out, 1).unwrap();
    assert_close(&out, &[1.0, 32768.0 / 65535.0, 0.0]);

    reader.pixel(0, 1, 0, &mut out, 0).unwrap();
    assert_close(&out, &[1.0 / 65535.0, 2.0 / 65535.0, 3.0 / 65535.0]);

    let err = reader.pixel(0, 2, 0, &mut out, 0).unwrap_err();
    assert_eq!(*err, ErrorKind::PixelOutOfRange { u: 2, v: 0 });
}

#[test]
fn test_float_faces() {
    let res = Res::new(0, 1);
    let data: Vec<u8> = [0.25f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
    let (_, reader) = Fixture::new(DataType::Float, 1).face(Face::zipped(res, data)).open();
    let mut out = [0f32; 1];
    reader.pixel(0, 0, 1, &mut out, 0).unwrap();
    assert_eq!(out, [-2.0]);
    reader.pixel_at(0, 0, 0, &mut out, 0, Res::new(0, 0)).unwrap();
    assert_eq!(out, [0.25]);
}

#[test]
fn test_invalid_requests_keep_reader_ok() {
    let res = Res::new(2, 2);
    let (_, reader) = Fixture::new(DataType::U8, 1).face(Face::zipped(res, texels(res, 1, ramp))).open();

    assert_eq!(*reader.data(5).unwrap_err(), ErrorKind::FaceOutOfRange(5));
    assert!(matches!(*reader.data_at(0, Res::new(3, 2)).unwrap_err(), ErrorKind::UnsupportedResolution { .. }));
    assert!(matches!(*reader.data_at(0, Res::new(-1, 0)).unwrap_err(), ErrorKind::UnsupportedResolution { .. }));
    assert!(matches!(*reader.face_info(1).unwrap_err(), ErrorKind::FaceOutOfRange(1)));
    assert!(reader.ok());
}

#[test]
fn test_zero_res_uses_constant_table() {
    let res = Res::new(2, 2);
    let (handler, reader) = Fixture::new(DataType::U8, 2).face(Face::zipped(res, texels(res, 2, ramp))).open();
    let reads = handler.stats().reads();
    let face = reader.data_at(0, Res::new(0, 0)).unwrap();
    assert!(face.is_constant());
    assert_eq!(face.data(), Some(&[ramp(0, 0), ramp(0, 1)][..]));
    assert_eq!(handler.stats().reads(), reads);
}

#[test]
fn test_stored_level_is_used() {
    let res = Res::new(2, 2);
    let fixture = Fixture::new(DataType::U8, 1)
        .face(Face::zipped(res, vec![10; 16]))
        .level(vec![Face::zipped(Res::new(1, 1), vec![99; 4])]);
    let (_, reader) = fixture.open();
    assert!(reader.has_mipmaps());
    assert_eq!(reader.level_info(1).unwrap().num_faces, 1);

    let face = reader.data_at(0, Res::new(1, 1)).unwrap();
    assert_eq!(face.data(), Some(&[99u8; 4][..]));
    assert_eq!(reader.cache_stats().reductions, 0);

    // (0, 1) isn't stored; it is reduced from the stored (1, 1) face.
    let face = reader.data_at(0, Res::new(0, 1)).unwrap();
    assert_eq!(face.data(), Some(&[99u8, 99][..]));
    assert_eq!(reader.cache_stats().reductions, 1);
}

#[test]
fn test_stored_levels_follow_reduction_order() {
    // Face 1 is larger, so it comes first in reduction order and is the
    // only face stored on level 1.
    let fixture = Fixture::new(DataType::U8, 1)
        .face(Face::zipped(Res::new(1, 1), vec![1, 2, 3, 4]))
        .face(Face::zipped(Res::new(2, 2), vec![50; 16]))
        .level(vec![Face::zipped(Res::new(1, 1), vec![77; 4])]);
    let (_, reader) = fixture.open();
    assert_eq!(reader.data_at(1, Res::new(1, 1)).unwrap().data(), Some(&[77u8; 4][..]));
    assert_eq!(reader.data_at(0, Res::new(0, 0)).unwrap().data(), Some(&[1u8][..]));
}

#[rstest]
#[case(Res::new(1, 1), vec![5, 25, 45, 65])]
#[case(Res::new(2, 0), vec![20, 30, 40, 50])]
#[case(Res::new(1, 0), vec![25, 45])]
fn test_anisotropic_reductions(#[case] res: Res, #[case] expected: Vec<u8>) {
    let data = vec![0, 10, 20, 30, 40, 50, 60, 70];
    let (_, reader) = Fixture::new(DataType::U8, 1).face(Face::zipped(Res::new(2, 1), data)).open();
    let face = reader.data_at(0, res).unwrap();
    assert_eq!(face.res(), res);
    assert_eq!(face.data(), Some(expected.as_slice()));
}

#[test]
fn test_triangle_reductions_are_symmetric() {
    let res = Res::new(2, 2);
    let (_, reader) =
        Fixture::new(DataType::U8, 1).triangles().face(Face::zipped(res, texels(res, 1, ramp))).open();
    assert_eq!(reader.mesh_type(), MeshType::Triangle);
    assert!(matches!(*reader.data_at(0, Res::new(1, 2)).unwrap_err(), ErrorKind::UnsupportedResolution { .. }));
    assert_eq!(reader.data_at(0, Res::new(1, 1)).unwrap().res(), Res::new(1, 1));
}

#[test]
fn test_triangle_reduction_uses_triangle_kernel() {
    let res = Res::new(2, 2);
    let (_, reader) = Fixture::new(DataType::U8, 1).triangles().face(Face::zipped(res, (0..16).collect())).open();
    let face = reader.data_at(0, Res::new(1, 1)).unwrap();
    assert_eq!(face.data(), Some(&[5u8, 5, 11, 10][..]));
}

#[test]
fn test_premultiplied_decode() {
    let res = Res::new(1, 0);
    let fixture = Fixture::new(DataType::U8, 2).alpha(1).face(Face::raw(res, vec![200, 255, 200, 0]));
    let (_, plain) = fixture.open();
    assert_eq!(plain.data(0).unwrap().data(), Some(&[200u8, 255, 200, 0][..]));

    let (_, reader) = fixture.open_with(ReaderOptions::default().with_premultiply(true));
    assert!(reader.header().has_alpha());
    assert_eq!(reader.data(0).unwrap().data(), Some(&[200u8, 255, 0, 0][..]));
    // The constant table holds the first texel, premultiplied too.
    assert_eq!(reader.data_at(0, Res::new(0, 0)).unwrap().data(), Some(&[200u8, 255][..]));
}

#[test]
fn test_metadata() {
    let fixture = Fixture::new(DataType::U8, 1)
        .face(Face::constant(vec![0]))
        .meta(Meta::string("PtexFaceIds", "body"))
        .meta(Meta::int32("wrap", &[1, -2]))
        .large_meta(Meta::double("weights", &[0.5; 300]));
    let (handler, mut reader) = fixture.open();
    let metadata = reader.metadata().unwrap();

    assert_eq!(metadata.num_keys(), 3);
    assert_eq!(metadata.key(0), Some(("PtexFaceIds", MetaDataType::String)));
    assert_eq!(
        metadata.keys().map(|(key, _)| key).collect::<Vec<_>>(),
        vec!["PtexFaceIds", "wrap", "weights"]
    );
    assert_eq!(metadata.value("PtexFaceIds").unwrap(), Some(MetaValue::String("body".into())));
    assert_eq!(metadata.value("wrap").unwrap(), Some(MetaValue::Int32(vec![1, -2])));
    assert_eq!(metadata.value("missing").unwrap(), None);
    assert_eq!(metadata.kind("weights"), Some(MetaDataType::Double));

    assert!(metadata.is_resident("wrap"));
    assert!(!metadata.is_resident("weights"));
    let before = reader.mem_used();
    let reads = handler.stats().reads();
    let metadata = reader.metadata().unwrap();
    assert_eq!(metadata.value("weights").unwrap(), Some(MetaValue::Double(vec![0.5; 300])));
    assert!(metadata.is_resident("weights"));
    assert!(handler.stats().reads() > reads);
    assert!(reader.mem_used() >= before + 300 * 8);

    reader.purge();
    let metadata = reader.metadata().unwrap();
    assert!(!metadata.is_resident("weights"));
    assert!(metadata.is_resident("wrap"));
    assert_eq!(metadata.raw("weights").unwrap().map(<[u8]>::len), Some(300 * 8));
}

#[test]
fn test_decode_error_keeps_reader_ok() {
    let res = Res::new(2, 2);
    let fixture = Fixture::new(DataType::U8, 1).face(Face::corrupt(res)).face(Face::zipped(res, vec![3; 16]));
    let (_, reader) = fixture.open();

    let err = reader.data(0).unwrap_err();
    assert!(matches!(*err, ErrorKind::Compression(_)));
    assert!(reader.ok());
    assert!(reader.error().is_some_and(|message| message.contains(PATH)));
    assert_eq!(reader.data(1).unwrap().data(), Some(&[3u8; 16][..]));
    // Nothing was cached for the failed face; the next call tries again.
    assert!(reader.data(0).is_err());
    assert_eq!(reader.cache_stats().levels, vec![(0, 1)]);
}

#[test]
fn test_file_input_handler() {
    let res = Res::new(2, 1);
    let data = texels(res, 2, ramp);
    let bytes = Fixture::new(DataType::U8, 2).face(Face::zipped(res, data.clone())).build();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let reader = Reader::open(file.path()).unwrap();
    assert_eq!(reader.data(0).unwrap().data(), Some(data.as_slice()));
    assert!(reader.try_close());
    assert!(!reader.is_open());
    assert_eq!(reader.data_at(0, Res::new(1, 1)).unwrap().res(), Res::new(1, 1));
    assert!(reader.is_open());
}
