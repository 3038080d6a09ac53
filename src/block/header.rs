/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Binary layout of the block preamble and header, bit-exact
//! with spec section 6 and `examples/original_source/
//! src/block.h`.

use crate::error::{Error, ErrorCode, Result};

/// `\xd3 'B' 'L' 'K'`
pub const BLOCK_MAGIC: [u8; 4] = [0xd3, b'B', b'L', b'K'];

/// `"#ASDF BLOCK INDEX"`, 18 bytes including the leading `#`.
pub const BLOCK_INDEX_HEADER: &[u8] = b"#ASDF BLOCK INDEX";

pub const MIN_HEADER_SIZE: u16 = 48;

pub const COMPRESSION_FIELD_SIZE: usize = 4;
pub const CHECKSUM_FIELD_SIZE: usize = 16;

/// The block flag bit marking a streamed block (unknown size, read to
/// EOF), per spec section 3.
pub const FLAG_STREAMED: u32 = 0x1;

/// The fixed-size portion of a block header (spec section 6): flags,
/// compression tag, three u64 sizes and a checksum, all big-endian.
/// Field offsets match `ASDF_BLOCK_*_OFFSET` in the original C source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader
{
    pub header_size:    u16,
    pub flags:          u32,
    pub compression:    [u8; COMPRESSION_FIELD_SIZE],
    pub allocated_size: u64,
    pub used_size:      u64,
    pub data_size:      u64,
    pub checksum:       [u8; CHECKSUM_FIELD_SIZE],
}

impl BlockHeader
{
    pub fn is_streamed(&self) -> bool
    {
        self.flags & FLAG_STREAMED != 0
    }

    /// No compression tag is represented as four NUL bytes, per spec
    /// section 3.
    pub fn compression_tag(&self) -> Option<[u8; 4]>
    {
        if self.compression == [0u8; 4]
        {
            None
        }
        else
        {
            Some(self.compression)
        }
    }

    /// Parse the 6-byte preamble (magic + header size) and the
    /// fixed-size header fields that follow it. `buf` must contain at
    /// least `6 + header_size` bytes; anything beyond the fixed fields up
    /// to `header_size` is reserved padding and is ignored.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)>
    {
        if buf.len() < 6
        {
            return Err(Error::code(ErrorCode::UnexpectedEof));
        }

        if buf[0..4] != BLOCK_MAGIC
        {
            return Err(Error::code(ErrorCode::BlockMagicMismatch));
        }

        let header_size = u16::from_be_bytes([buf[4], buf[5]]);

        if header_size < MIN_HEADER_SIZE
        {
            return Err(Error::code(ErrorCode::InvalidBlockHeader));
        }

        let body_len = header_size as usize;

        if buf.len() < 6 + body_len
        {
            return Err(Error::code(ErrorCode::UnexpectedEof));
        }

        let body = &buf[6..6 + body_len];

        let flags = be_u32(body, 0);
        let mut compression = [0u8; 4];
        compression.copy_from_slice(&body[4..8]);
        let allocated_size = be_u64(body, 8);
        let used_size = be_u64(body, 16);
        let data_size = be_u64(body, 24);
        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&body[32..48]);

        Ok((
            Self {
                header_size,
                flags,
                compression,
                allocated_size,
                used_size,
                data_size,
                checksum,
            },
            6 + body_len,
        ))
    }

    /// Serialize the preamble and fixed header fields. Reserved padding
    /// bytes up to `header_size` are written as zero.
    pub fn write_to(&self, out: &mut Vec<u8>)
    {
        out.extend_from_slice(&BLOCK_MAGIC);
        out.extend_from_slice(&self.header_size.to_be_bytes());

        let before = out.len();

        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.compression);
        out.extend_from_slice(&self.allocated_size.to_be_bytes());
        out.extend_from_slice(&self.used_size.to_be_bytes());
        out.extend_from_slice(&self.data_size.to_be_bytes());
        out.extend_from_slice(&self.checksum);

        let written = out.len() - before;
        let pad = self.header_size as usize - written;
        out.extend(std::iter::repeat(0u8).take(pad));
    }
}

fn be_u32(buf: &[u8], off: usize) -> u32
{
    u32::from_be_bytes(buf[off..off + 4].try_into().unwrap())
}

fn be_u64(buf: &[u8], off: usize) -> u64
{
    u64::from_be_bytes(buf[off..off + 8].try_into().unwrap())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn sample(header_size: u16) -> Vec<u8>
    {
        let h = BlockHeader {
            header_size,
            flags: 0,
            compression: *b"\0\0\0\0",
            allocated_size: 16,
            used_size: 16,
            data_size: 16,
            checksum: [0u8; 16],
        };

        let mut buf = Vec::new();
        h.write_to(&mut buf);
        buf
    }

    #[test]
    fn round_trips_minimum_header()
    {
        let buf = sample(48);
        let (h, consumed) = BlockHeader::parse(&buf).unwrap();

        assert_eq!(consumed, buf.len());
        assert_eq!(h.header_size, 48);
        assert_eq!(h.used_size, 16);
        assert!(!h.is_streamed());
        assert_eq!(h.compression_tag(), None);
    }

    #[test]
    fn rejects_undersized_header()
    {
        let mut buf = BLOCK_MAGIC.to_vec();
        buf.extend_from_slice(&16u16.to_be_bytes());
        buf.extend(std::iter::repeat(0u8).take(16));

        let err = BlockHeader::parse(&buf).unwrap_err();
        assert_eq!(err.classify(), crate::Category::Syntax);
    }

    #[test]
    fn rejects_bad_magic()
    {
        let buf = b"NOPE12345678901234567890123456789012345678901234567890".to_vec();
        let err = BlockHeader::parse(&buf).unwrap_err();
        matches!(err.classify(), crate::Category::Syntax);
    }

    #[test]
    fn padding_beyond_fixed_fields_round_trips_as_zero()
    {
        let buf = sample(64);
        let (h, consumed) = BlockHeader::parse(&buf).unwrap();

        assert_eq!(h.header_size, 64);
        assert_eq!(consumed, buf.len());
    }
}
