/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! [`File`]: the facade tying together the stream, parser,
//! block vector and tree document (spec section 3).

use std::path::Path as FsPath;

use crate::{
    block::{Block, BlockIndex, BlockInfo},
    config::Config,
    context::Context,
    error::{Error, ErrorCode, Result},
    extension::{self, ExtensionType},
    parser::{Event, Parser},
    path::Path,
    stream::Stream,
    value::{Value, ValueResult},
};

/// An open ASDF file: its version header, YAML tree, and the blocks
/// that trailed it, plus whatever block index was present or could be
/// reconstructed.
pub struct File
{
    stream:           Stream,
    cxt:              Context,
    config:           Config,
    asdf_version:     String,
    standard_version: String,
    comments:         Vec<String>,
    tree:             Value,
    blocks:           Vec<Block>,
    block_index:      Option<BlockIndex>,
}

impl File
{
    /// Open and fully parse a file on disk.
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self>
    {
        let fs_file = std::fs::File::open(path).map_err(Error::from)?;
        let stream = Stream::from_file(fs_file)?;
        Self::from_stream(stream, Config::new(), Context::new())
    }

    /// Parse a file already fully resident in memory, useful for tests
    /// and for embedding a file in a larger protocol.
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self>
    {
        Self::from_stream(Stream::from_bytes(buf), Config::new(), Context::new())
    }

    pub fn from_bytes_with_config(buf: Vec<u8>, config: Config) -> Result<Self>
    {
        Self::from_stream(Stream::from_bytes(buf), config, Context::new())
    }

    fn from_stream(mut stream: Stream, config: Config, cxt: Context) -> Result<Self>
    {
        crate::ext::register_builtin();

        let buffer_tree = config
            .parser_flags
            .contains(crate::config::ParserFlags::BUFFER_TREE);
        let mut parser = Parser::new(buffer_tree);

        let mut asdf_version = String::new();
        let mut standard_version = String::new();
        let mut comments = Vec::new();
        let mut tree_bytes: Option<Vec<u8>> = None;
        let mut blocks = Vec::new();
        let mut block_index = None;

        while let Some(event) = parser.next(&mut stream)?
        {
            match event
            {
                Event::AsdfVersion(v) => asdf_version = v,
                Event::StandardVersion(v) => standard_version = v,
                Event::Comment(c) => comments.push(c),
                Event::TreeStart =>
                {},
                Event::TreeEnd { bytes } => tree_bytes = bytes,
                Event::Block(info) => blocks.push(Block::new(info)),
                Event::BlockIndex(idx) => block_index = Some(idx),
                Event::End => break,
            }
        }

        let tree = match tree_bytes
        {
            Some(bytes) if !bytes.is_empty() =>
            {
                let node = serde_yaml::from_slice(&bytes)
                    .map_err(|_| cxt.set_error(Error::code(ErrorCode::YamlParseFailed)))?;
                Value::at_root(node)
            },
            _ => Value::at_root(serde_yaml::Value::Null),
        };

        Ok(Self {
            stream,
            cxt,
            config,
            asdf_version,
            standard_version,
            comments,
            tree,
            blocks,
            block_index,
        })
    }

    pub fn asdf_version(&self) -> &str
    {
        &self.asdf_version
    }

    pub fn standard_version(&self) -> &str
    {
        &self.standard_version
    }

    pub fn comments(&self) -> &[String]
    {
        &self.comments
    }

    /// The root of the parsed YAML tree.
    pub fn tree(&self) -> &Value
    {
        &self.tree
    }

    pub fn config(&self) -> &Config
    {
        &self.config
    }

    pub fn context(&self) -> &Context
    {
        &self.cxt
    }

    pub fn block_count(&self) -> usize
    {
        self.blocks.len()
    }

    /// The parsed or reconstructed block index, if any (spec section 3:
    /// treated as an untrusted hint, never required for correctness).
    pub fn block_index(&self) -> Option<&BlockIndex>
    {
        self.block_index.as_ref()
    }

    /// Resolve a path string against the tree root (spec section 4.7).
    pub fn resolve(&self, path: &str) -> ValueResult<Value>
    {
        let parsed = Path::parse(path).map_err(|_| crate::value::ValueError::NotFound)?;
        self.tree.resolve(&parsed)
    }

    /// Decompress and return block `index`'s payload bytes, materializing
    /// them on first access (spec section 4.3/4.5).
    pub fn block_data(&mut self, index: usize) -> Result<&[u8]>
    {
        let block = self
            .blocks
            .get_mut(index)
            .ok_or_else(|| Error::code(ErrorCode::OutOfBounds))?;

        let used_size = block.info.used_size(None, self.config.decomp.max_streamed_block_bytes);
        block.data(&self.stream, &self.cxt, &self.config.decomp, used_size)
    }

    /// Verify block `index`'s checksum against its raw bytes.
    pub fn verify_block_checksum(&self, index: usize) -> Result<bool>
    {
        let block = self.blocks.get(index).ok_or_else(|| Error::code(ErrorCode::OutOfBounds))?;
        let used_size = block.info.used_size(None, self.config.decomp.max_streamed_block_bytes);
        let (ok, _digest) = block.verify_checksum(&self.stream, used_size)?;
        Ok(ok)
    }

    /// Deserialize the value at `path` as extension type `T`, resolving
    /// via the process-wide extension registry (spec section 4.8).
    pub fn as_extension<T: ExtensionType>(&self, path: &str) -> ValueResult<T>
    {
        let v = self.resolve(path)?;
        extension::as_extension::<T>(&v)
    }

    pub(crate) fn block_info(&self, index: usize) -> Option<&BlockInfo>
    {
        self.blocks.get(index).map(|b| &b.info)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn sample_bytes() -> Vec<u8>
    {
        b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\nfoo: 1\nbar: hello\n...\n".to_vec()
    }

    #[test]
    fn opens_minimal_file_and_parses_tree()
    {
        let file = File::from_bytes(sample_bytes()).unwrap();

        assert_eq!(file.asdf_version(), "1.0.0");
        assert_eq!(file.standard_version(), "1.6.0");

        let foo = file.resolve("/foo").unwrap();
        assert_eq!(foo.as_i64(), crate::value::ScalarResult::Ok(1));
    }

    #[test]
    fn block_count_matches_embedded_blocks()
    {
        use md5::{Digest, Md5};

        let mut bytes = sample_bytes();
        let payload = b"blockdata";

        let mut hasher = Md5::new();
        hasher.update(payload);
        let checksum: [u8; 16] = hasher.finalize().into();

        let header = crate::block::header::BlockHeader {
            header_size: 48,
            flags: 0,
            compression: *b"\0\0\0\0",
            allocated_size: payload.len() as u64,
            used_size: payload.len() as u64,
            data_size: payload.len() as u64,
            checksum,
        };
        header.write_to(&mut bytes);
        bytes.extend_from_slice(payload);

        let mut file = File::from_bytes(bytes).unwrap();
        assert_eq!(file.block_count(), 1);
        assert_eq!(file.block_data(0).unwrap(), payload);
        assert!(file.verify_block_checksum(0).unwrap());
    }
}
