/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Block headers, checksums, and on-demand access to a
//! block's raw or decompressed bytes (spec section 4.3).

pub mod header;

use md5::{Digest, Md5};

pub use self::header::{BlockHeader, BLOCK_INDEX_HEADER, BLOCK_MAGIC};
use crate::{
    compression::Compression,
    context::Context,
    decomp::{self, Decompressed},
    error::{Error, ErrorCode, Result},
    stream::Stream,
};

/// Metadata parsed from a block header, invariant for the life of the
/// file once read (spec section 3).
#[derive(Debug, Clone)]
pub struct BlockInfo
{
    pub header:     BlockHeader,
    pub compression: Compression,
    /// Absolute byte offset of the block magic.
    pub header_pos: u64,
    /// Absolute byte offset of the first payload byte
    /// (`header_pos + 6 + header_size`).
    pub data_pos:   u64,
}

impl BlockInfo
{
    /// Parse a block's preamble + header starting at the stream's
    /// current position, which must be positioned exactly at the block
    /// magic.
    pub fn read(stream: &mut Stream) -> Result<Self>
    {
        let header_pos = stream.tell();

        let (buf, avail) = stream.next(6)?;
        if avail < 6
        {
            return Err(Error::code_at(ErrorCode::UnexpectedEof, header_pos));
        }

        let header_size = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        let total = 6 + header_size;

        let (buf, avail) = stream.next(total)?;
        if avail < total
        {
            return Err(Error::code_at(ErrorCode::UnexpectedEof, header_pos));
        }

        let (header, consumed) = BlockHeader::parse(buf)?;
        stream.consume(consumed)?;

        let compression = Compression::parse(header.compression_tag());
        let data_pos = header_pos + consumed as u64;

        Ok(Self {
            header,
            compression,
            header_pos,
            data_pos,
        })
    }

    /// Try to validate a block-index hint offset by attempting to parse a
    /// header there, per spec section 4.3 step 1. Does not move the
    /// stream's logical position on failure.
    pub fn try_read_at(stream: &mut Stream, offset: u64) -> Result<Self>
    {
        stream.seek(std::io::SeekFrom::Start(offset))?;
        Self::read(stream)
    }

    /// Payload length: `used_size`, unless this is a streamed block, in
    /// which case it runs to EOF and is determined lazily, capped by
    /// `max_streamed_block_bytes` (spec section 9, Open Questions).
    pub fn used_size(&self, stream_len: Option<u64>, cap: u64) -> u64
    {
        if !self.header.is_streamed()
        {
            return self.header.used_size;
        }

        match stream_len
        {
            Some(len) if len > self.data_pos => (len - self.data_pos).min(cap),
            _ => cap,
        }
    }
}

/// An ordered list of block byte offsets, either parsed from the
/// `#ASDF BLOCK INDEX` appendix or reconstructed while parsing. Treated
/// as an untrusted hint (spec section 3): each offset is verified lazily
/// by attempting to parse a header there.
#[derive(Debug, Clone, Default)]
pub struct BlockIndex
{
    pub offsets: Vec<u64>,
}

impl BlockIndex
{
    pub fn new(offsets: Vec<u64>) -> Self
    {
        Self { offsets }
    }

    pub fn get(&self, i: usize) -> Option<u64>
    {
        self.offsets.get(i).copied()
    }

    pub fn len(&self) -> usize
    {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.offsets.is_empty()
    }
}

/// Which backing a block's materialized bytes live in, mirroring
/// `asdf_block_comp_state_t.own_fd` in the C source.
#[derive(Debug, Default)]
enum Data
{
    #[default]
    None,
    Decompressed(Decompressed),
}

/// A handle to one block's metadata and (once accessed) materialized
/// bytes.
#[derive(Debug)]
pub struct Block
{
    pub info: BlockInfo,
    data:     Data,
}

impl Block
{
    pub(crate) fn new(info: BlockInfo) -> Self
    {
        Self {
            info,
            data: Data::None,
        }
    }

    /// Raw, still-possibly-compressed payload bytes read directly from
    /// the stream, used for checksum verification.
    pub fn raw_bytes(&self, stream: &Stream, used_size: u64) -> Result<Vec<u8>>
    {
        let region = stream.open_mem(self.info.data_pos, used_size)?;
        Ok(region.to_vec())
    }

    /// Return this block's decompressed bytes, materializing them on
    /// first access via the decompression engine (spec section 4.3).
    pub fn data(
        &mut self,
        stream: &Stream,
        cxt: &Context,
        config: &crate::config::DecompConfig,
        used_size: u64,
    ) -> Result<&[u8]>
    {
        if matches!(self.data, Data::None)
        {
            let decompressed =
                decomp::decompress(stream, cxt, config, &self.info, used_size)?;
            self.data = Data::Decompressed(decompressed);
        }

        match &self.data
        {
            Data::Decompressed(d) => Ok(d.as_slice()),
            Data::None => unreachable!(),
        }
    }

    /// Compute the MD5 checksum over this block's raw (still compressed,
    /// if any) bytes and compare it against the header's stored
    /// checksum (spec section 4.3). A block with an all-zero checksum
    /// field is treated as unchecksummed and always verifies.
    pub fn verify_checksum(&self, stream: &Stream, used_size: u64) -> Result<(bool, [u8; 16])>
    {
        let raw = self.raw_bytes(stream, used_size)?;

        let mut hasher = Md5::new();
        hasher.update(&raw);
        let digest: [u8; 16] = hasher.finalize().into();

        if self.info.header.checksum == [0u8; 16]
        {
            return Ok((true, digest));
        }

        Ok((digest == self.info.header.checksum, digest))
    }

    pub fn close(&mut self)
    {
        self.data = Data::None;
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::block::header::BlockHeader;

    fn header_bytes(used_size: u64, data: &[u8]) -> Vec<u8>
    {
        let mut hasher = Md5::new();
        hasher.update(data);
        let checksum: [u8; 16] = hasher.finalize().into();

        let h = BlockHeader {
            header_size: 48,
            flags: 0,
            compression: *b"\0\0\0\0",
            allocated_size: used_size,
            used_size,
            data_size: used_size,
            checksum,
        };

        let mut buf = Vec::new();
        h.write_to(&mut buf);
        buf.extend_from_slice(data);
        buf
    }

    #[test]
    fn reads_header_and_verifies_checksum()
    {
        let data = b"hello block payload";
        let bytes = header_bytes(data.len() as u64, data);

        let mut stream = Stream::from_bytes(bytes);
        let info = BlockInfo::read(&mut stream).unwrap();

        assert_eq!(info.header.used_size, data.len() as u64);

        let block = Block::new(info);
        let (ok, _digest) = block.verify_checksum(&stream, data.len() as u64).unwrap();
        assert!(ok);
    }

    #[test]
    fn checksum_mismatch_is_detected()
    {
        let data = b"some payload";
        let mut bytes = header_bytes(data.len() as u64, data);
        // Corrupt one payload byte after the checksum was computed over
        // the original data.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut stream = Stream::from_bytes(bytes);
        let info = BlockInfo::read(&mut stream).unwrap();
        let block = Block::new(info);

        let (ok, _) = block.verify_checksum(&stream, data.len() as u64).unwrap();
        assert!(!ok);
    }
}
