/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Writes the version header, tree, blocks and optional block
//! index appendix back out to a stream (spec section 4, write
//! path), honoring [`EmitterFlags`](crate::config::EmitterFlags)
//! and configured [`TagHandle`](crate::config::TagHandle)s.
//!
//! The write path never compresses: the compressor registry
//! (spec section 4.4) only exposes `decompress_all`/
//! `open_chunks`, matching a reader-oriented contract, so every
//! block this emitter writes carries an all-zero compression
//! tag. A caller wanting a compressed file must still be able
//! to produce one of this library's own readable files, which
//! an uncompressed block always is.

use md5::{Digest, Md5};
use serde_yaml::Value as YamlValue;

use crate::{
    block::header::BlockHeader,
    config::{Config, EmitterFlags, TagHandle},
    error::{Error, Result},
    stream::Stream,
    value::Value,
};

/// Drives writing one ASDF file's worth of header, tree and blocks to a
/// [`Stream`]. Tracks each block's starting offset so it can emit a
/// trailing `#ASDF BLOCK INDEX` appendix.
pub struct Emitter
{
    flags:         EmitterFlags,
    tag_handles:   Vec<TagHandle>,
    block_offsets: Vec<u64>,
}

impl Emitter
{
    pub fn new(config: &Config) -> Self
    {
        Self {
            flags: config.emitter_flags,
            tag_handles: config.tag_handles.clone(),
            block_offsets: Vec::new(),
        }
    }

    /// Write the two-line `#ASDF`/`#ASDF_STANDARD` version header.
    pub fn write_header(
        &mut self,
        stream: &mut Stream,
        asdf_version: &str,
        standard_version: &str,
    ) -> Result<()>
    {
        stream.write(format!("#ASDF {asdf_version}\n").as_bytes())?;
        stream.write(format!("#ASDF_STANDARD {standard_version}\n").as_bytes())?;
        Ok(())
    }

    pub fn write_comment(&mut self, stream: &mut Stream, text: &str) -> Result<()>
    {
        stream.write(format!("#{text}\n").as_bytes())
    }

    /// Write the `%YAML` directive, the serialized tree and its `...`
    /// terminator, eliding an empty tree unless the emitter flags say
    /// otherwise (spec section 6, "Empty tree policy").
    pub fn write_tree(&mut self, stream: &mut Stream, tree: &Value) -> Result<()>
    {
        let is_empty = matches!(tree.node(), YamlValue::Null)
            || matches!(tree.node(), YamlValue::Mapping(m) if m.is_empty());

        let mut should_emit = !is_empty
            || self.flags.contains(EmitterFlags::EMIT_EMPTY)
            || self.flags.contains(EmitterFlags::EMIT_EMPTY_TREE);

        if is_empty && self.flags.contains(EmitterFlags::NO_EMIT_EMPTY_TREE)
        {
            should_emit = false;
        }

        if !should_emit
        {
            return Ok(());
        }

        for handle in &self.tag_handles
        {
            stream.write(format!("%TAG {} {}\n", handle.handle, handle.prefix).as_bytes())?;
        }

        stream.write(b"%YAML 1.1\n")?;

        let body = if is_empty
        {
            "{}\n".to_string()
        }
        else
        {
            let rendered = serde_yaml::to_string(tree.node()).map_err(|e| {
                log::warn!("failed to serialize tree: {e}");
                Error::code(crate::error::ErrorCode::YamlParseFailed)
            })?;
            rendered.strip_prefix("---\n").unwrap_or(&rendered).to_string()
        };

        stream.write(body.as_bytes())?;
        stream.write(b"...\n")?;

        Ok(())
    }

    /// Write one uncompressed, checksummed block, remember its starting
    /// offset for the block index, and return its index among the blocks
    /// written so far (what a `source` field should point at).
    pub fn write_block(&mut self, stream: &mut Stream, data: &[u8]) -> Result<usize>
    {
        let offset = stream.tell();

        let mut hasher = Md5::new();
        hasher.update(data);
        let checksum: [u8; 16] = hasher.finalize().into();

        let header = BlockHeader {
            header_size: 48,
            flags: 0,
            compression: *b"\0\0\0\0",
            allocated_size: data.len() as u64,
            used_size: data.len() as u64,
            data_size: data.len() as u64,
            checksum,
        };

        let mut buf = Vec::with_capacity(54 + data.len());
        header.write_to(&mut buf);
        buf.extend_from_slice(data);

        stream.write(&buf)?;
        self.block_offsets.push(offset);

        Ok(self.block_offsets.len() - 1)
    }

    /// Write the trailing `#ASDF BLOCK INDEX` appendix, unless the
    /// caller disabled it or there are no blocks to index.
    pub fn write_block_index(&mut self, stream: &mut Stream) -> Result<()>
    {
        if self.flags.contains(EmitterFlags::NO_BLOCK_INDEX)
        {
            return Ok(());
        }

        if self.block_offsets.is_empty() && !self.flags.contains(EmitterFlags::EMIT_EMPTY)
        {
            return Ok(());
        }

        stream.write(b"#ASDF BLOCK INDEX\n%YAML 1.1\n---\n")?;

        for offset in &self.block_offsets
        {
            stream.write(format!("- {offset}\n").as_bytes())?;
        }

        stream.write(b"...\n")?;

        Ok(())
    }

    pub fn flush(&mut self, stream: &mut Stream) -> Result<()>
    {
        stream.flush()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::path::Path;

    #[test]
    fn writes_version_header()
    {
        let config = Config::new();
        let mut emitter = Emitter::new(&config);
        let mut stream = Stream::from_bytes(Vec::new());

        emitter.write_header(&mut stream, "1.0.0", "1.6.0").unwrap();

        let file = crate::file::File::from_bytes(drain(stream)).unwrap();
        assert_eq!(file.asdf_version(), "1.0.0");
    }

    #[test]
    fn empty_tree_is_elided_by_default()
    {
        let config = Config::new();
        let mut emitter = Emitter::new(&config);
        let mut stream = Stream::from_bytes(Vec::new());

        emitter.write_header(&mut stream, "1.0.0", "1.6.0").unwrap();
        let tree = Value::new(YamlValue::Null, Path::root());
        emitter.write_tree(&mut stream, &tree).unwrap();

        let bytes = drain(stream);
        assert!(!bytes.ends_with(b"...\n"));
    }

    #[test]
    fn non_empty_tree_round_trips()
    {
        let config = Config::new();
        let mut emitter = Emitter::new(&config);
        let mut stream = Stream::from_bytes(Vec::new());

        emitter.write_header(&mut stream, "1.0.0", "1.6.0").unwrap();
        let node: YamlValue = serde_yaml::from_str("foo: 1\nbar: two\n").unwrap();
        let tree = Value::new(node, Path::root());
        emitter.write_tree(&mut stream, &tree).unwrap();

        let file = crate::file::File::from_bytes(drain(stream)).unwrap();
        let foo = file.resolve("/foo").unwrap();
        assert_eq!(foo.as_i64(), crate::value::ScalarResult::Ok(1));
    }

    #[test]
    fn block_round_trips_with_valid_checksum()
    {
        let config = Config::new();
        let mut emitter = Emitter::new(&config);
        let mut stream = Stream::from_bytes(Vec::new());

        emitter.write_header(&mut stream, "1.0.0", "1.6.0").unwrap();
        let tree = Value::new(YamlValue::Null, Path::root());
        emitter.write_tree(&mut stream, &tree).unwrap();
        emitter.write_block(&mut stream, b"payload bytes").unwrap();
        emitter.write_block_index(&mut stream).unwrap();

        let mut file = crate::file::File::from_bytes(drain(stream)).unwrap();
        assert_eq!(file.block_count(), 1);
        assert_eq!(file.block_data(0).unwrap(), b"payload bytes");
        assert!(file.verify_block_checksum(0).unwrap());
        assert_eq!(file.block_index().unwrap().len(), 1);
    }

    fn drain(mut stream: Stream) -> Vec<u8>
    {
        stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let (buf, avail) = stream.next(1 << 20).unwrap();
        buf[..avail].to_vec()
    }
}
