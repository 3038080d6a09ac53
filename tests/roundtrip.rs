/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! End-to-end scenarios driving the public API the way a
//! caller would: open a file, read its tree and blocks, write
//! a new one back out.

use asdf::{
    config::Config,
    emitter::Emitter,
    ext::ndarray::NdArray,
    extension::ExtensionType,
    path::Path,
    stream::Stream,
    value::ScalarResult,
    File,
};

fn minimal_file() -> Vec<u8>
{
    b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\nname: widget\ncount: 3\nratio: 0.5\n...\n"
        .to_vec()
}

#[test]
fn minimal_file_event_sequence_and_scalar_access()
{
    let file = File::from_bytes(minimal_file()).unwrap();

    assert_eq!(file.asdf_version(), "1.0.0");
    assert_eq!(file.standard_version(), "1.6.0");

    let name = file.resolve("/name").unwrap();
    assert_eq!(name.as_str(), ScalarResult::Ok("widget"));

    let count = file.resolve("/count").unwrap();
    assert_eq!(count.as_i8(), ScalarResult::Ok(3));

    let ratio = file.resolve("/ratio").unwrap();
    assert_eq!(ratio.as_f64(), ScalarResult::Ok(0.5));
}

#[test]
fn scalar_overflow_carries_truncated_bits()
{
    let bytes =
        b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\nbig: 300\n...\n".to_vec();
    let file = File::from_bytes(bytes).unwrap();

    let big = file.resolve("/big").unwrap();
    assert!(matches!(big.as_i8(), ScalarResult::Overflow(_)));
    assert_eq!(big.as_i16(), ScalarResult::Ok(300));
}

#[test]
fn basic_ndarray_descriptor_resolves_and_reads_a_tile()
{
    let bytes = b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\n\
image: !<tag:stsci.edu:asdf/core/ndarray-1.0.0>\n  source: 0\n  datatype: uint8\n  byteorder: little\n  shape: [2, 2]\n\
...\n"
        .to_vec();

    let mut bytes = bytes;
    let payload: [u8; 4] = [1, 2, 3, 4];
    let header = asdf::block::header::BlockHeader {
        header_size: 48,
        flags: 0,
        compression: *b"\0\0\0\0",
        allocated_size: payload.len() as u64,
        used_size: payload.len() as u64,
        data_size: payload.len() as u64,
        checksum: [0u8; 16],
    };
    header.write_to(&mut bytes);
    bytes.extend_from_slice(&payload);

    let mut file = File::from_bytes(bytes).unwrap();
    let nd: NdArray = file.as_extension("/image").unwrap();
    assert_eq!(nd.shape, vec![2, 2]);

    let data = file.block_data(0).unwrap().to_vec();
    let tile = nd.read_tile_ndim(&data, &[1, 0], &[1, 2], None).unwrap();
    assert_eq!(tile, vec![3, 4]);
}

#[test]
fn write_then_read_back_tree_and_block()
{
    let config = Config::new();
    let mut emitter = Emitter::new(&config);
    let mut stream = Stream::from_bytes(Vec::new());

    emitter.write_header(&mut stream, "1.0.0", "1.6.0").unwrap();

    let node: serde_yaml::Value = serde_yaml::from_str("title: roundtrip\n").unwrap();
    let tree = asdf::value::Value::new(node, Path::root());
    emitter.write_tree(&mut stream, &tree).unwrap();
    emitter.write_block(&mut stream, b"hello from a block").unwrap();
    emitter.write_block_index(&mut stream).unwrap();

    stream.seek(std::io::SeekFrom::Start(0)).unwrap();
    let (buf, avail) = stream.next(1 << 20).unwrap();
    let written = buf[..avail].to_vec();

    let mut file = File::from_bytes(written).unwrap();
    let title = file.resolve("/title").unwrap();
    assert_eq!(title.as_str(), ScalarResult::Ok("roundtrip"));
    assert_eq!(file.block_data(0).unwrap(), b"hello from a block");
    assert!(file.block_index().unwrap().len() >= 1);
}

#[test]
fn tag_normalization_resolves_software_extension()
{
    let bytes = b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\n\
writer: !<tag:stsci.edu:asdf/core/software-1.0.0> {name: asdf-rs, version: 0.1.0}\n\
...\n"
        .to_vec();

    let file = File::from_bytes(bytes).unwrap();
    let writer: asdf::ext::software::Software = file.as_extension("/writer").unwrap();
    assert_eq!(writer.name, "asdf-rs");
    assert_eq!(writer.version, "0.1.0");
}
