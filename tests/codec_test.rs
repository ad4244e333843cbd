use pgbackrest_core::codec::{get_codec, CompressType};

fn round_trip(compress_type: CompressType, level: i32) {
    let codec = get_codec(compress_type);
    let data = b"the quick brown fox jumps over the lazy dog".repeat(200);

    let compressed = codec.compress(&data, level).unwrap();
    let decompressed = codec.decompress(&compressed).unwrap();
    assert_eq!(decompressed, data);
}

#[test]
fn none_is_a_passthrough() {
    round_trip(CompressType::None, 0);
}

#[test]
fn gz_round_trips() {
    round_trip(CompressType::Gz, 6);
}

#[test]
fn bz2_round_trips() {
    round_trip(CompressType::Bz2, 9);
}

#[test]
fn lz4_round_trips() {
    round_trip(CompressType::Lz4, 0);
}

#[test]
fn zst_round_trips() {
    round_trip(CompressType::Zst, 3);
}

#[test]
fn name_and_from_name_are_inverse() {
    for ct in [CompressType::None, CompressType::Gz, CompressType::Bz2, CompressType::Lz4, CompressType::Zst] {
        assert_eq!(CompressType::from_name(ct.name()), Some(ct));
    }
}

#[test]
fn corrupt_input_is_a_format_error_not_a_panic() {
    let codec = get_codec(CompressType::Gz);
    assert!(codec.decompress(b"not a gzip stream").is_err());
}

#[test]
fn gz_raw_round_trips_without_a_gzip_header() {
    let codec = get_codec(CompressType::Gz);
    let data = b"super block payload, no container header".repeat(50);

    let framed = codec.compress(&data, 6).unwrap();
    let raw = codec.compress_raw(&data, 6).unwrap();
    assert!(raw.len() < framed.len(), "raw deflate should skip the gzip header/trailer");

    let decompressed = codec.decompress_raw(&raw, data.len()).unwrap();
    assert_eq!(decompressed, data);
}

#[test]
fn lz4_raw_round_trips_without_a_size_prefix() {
    let codec = get_codec(CompressType::Lz4);
    let data = b"super block payload, no size prefix".repeat(50);

    let raw = codec.compress_raw(&data, 0).unwrap();
    let decompressed = codec.decompress_raw(&raw, data.len()).unwrap();
    assert_eq!(decompressed, data);
}
