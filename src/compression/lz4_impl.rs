/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! LZ4 with the ASDF-specific chunk framing required for
//! interoperability with legacy writers (spec section 4.4):
//! a sequence of chunks, each prefixed by a 4-byte
//! big-endian total chunk size and a 4-byte little-endian
//! *signed* decompressed chunk size, followed by a raw
//! (frameless) LZ4 block.

use super::{ChunkCursor, Compressor};
use crate::error::{Error, ErrorCode, Result};

pub struct Lz4;

impl Compressor for Lz4
{
    fn decompress_all(&self, input: &[u8], expected_size: u64) -> Result<Vec<u8>>
    {
        let mut out = Vec::with_capacity(expected_size as usize);
        let mut cursor = open(input);

        loop
        {
            let (decompressed_size, block) = match cursor.next_raw()?
            {
                Some(pair) => pair,
                None => break,
            };

            let start = out.len();
            out.resize(start + decompressed_size, 0);

            let n = lz4_flex::block::decompress_into(block, &mut out[start..])
                .map_err(|e| {
                    log::warn!("lz4 chunk decompression failed: {e}");
                    Error::code(ErrorCode::YamlParseFailed)
                })?;

            out.truncate(start + n);
        }

        Ok(out)
    }

    fn optimal_chunk_size(&self, input: &[u8]) -> usize
    {
        // The per-chunk decompressed size is the natural unit, per spec
        // section 4.4; peek the first chunk's header if one exists.
        if input.len() >= 8
        {
            let n = i32::from_le_bytes(input[4..8].try_into().unwrap());
            if n > 0
            {
                return n as usize;
            }
        }

        64 * 1024
    }

    fn open_chunks<'a>(&self, input: &'a [u8]) -> Box<dyn ChunkCursor + 'a>
    {
        Box::new(open(input))
    }
}

fn open(input: &[u8]) -> Lz4Cursor<'_>
{
    Lz4Cursor { input }
}

struct Lz4Cursor<'a>
{
    input: &'a [u8],
}

impl<'a> Lz4Cursor<'a>
{
    /// Parse and consume the next chunk's header, returning its claimed
    /// decompressed size and the raw LZ4 block bytes, or `None` at the
    /// end of the stream.
    fn next_raw(&mut self) -> Result<Option<(usize, &'a [u8])>>
    {
        if self.input.is_empty()
        {
            return Ok(None);
        }

        if self.input.len() < 8
        {
            log::warn!("lz4 stream truncated inside a chunk header");
            return Err(Error::code(ErrorCode::UnexpectedEof));
        }

        let total_chunk_size = u32::from_be_bytes(self.input[0..4].try_into().unwrap()) as usize;
        let decompressed_size = i32::from_le_bytes(self.input[4..8].try_into().unwrap());

        if decompressed_size <= 0
        {
            log::warn!("lz4 chunk has non-positive decompressed size {decompressed_size}");
            return Err(Error::code(ErrorCode::YamlParseFailed));
        }

        if total_chunk_size < 4 || self.input.len() < 4 + total_chunk_size
        {
            log::warn!("lz4 chunk size {total_chunk_size} exceeds remaining input");
            return Err(Error::code(ErrorCode::UnexpectedEof));
        }

        let block = &self.input[8..4 + total_chunk_size];
        self.input = &self.input[4 + total_chunk_size..];

        Ok(Some((decompressed_size as usize, block)))
    }
}

impl ChunkCursor for Lz4Cursor<'_>
{
    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize>
    {
        let (decompressed_size, block) = match self.next_raw()?
        {
            Some(pair) => pair,
            None => return Ok(0),
        };

        if out.len() < decompressed_size
        {
            log::warn!("lazy-decompression destination chunk smaller than lz4 chunk");
        }

        let n = decompressed_size.min(out.len());
        let mut scratch = vec![0u8; decompressed_size];

        lz4_flex::block::decompress_into(block, &mut scratch).map_err(|e| {
            log::warn!("lz4 chunk decompression failed: {e}");
            Error::code(ErrorCode::YamlParseFailed)
        })?;

        out[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn frame(chunks: &[&[u8]]) -> Vec<u8>
    {
        let mut out = Vec::new();

        for chunk in chunks
        {
            let compressed = lz4_flex::block::compress(chunk);
            let total = 4 + compressed.len() as u32;

            out.extend_from_slice(&total.to_be_bytes());
            out.extend_from_slice(&(chunk.len() as i32).to_le_bytes());
            out.extend_from_slice(&compressed);
        }

        out
    }

    #[test]
    fn decompresses_multi_chunk_stream()
    {
        let framed = frame(&[b"hello ", b"world, this is lz4 framed data"]);

        let lz4 = Lz4;
        let out = lz4.decompress_all(&framed, 64).unwrap();

        assert_eq!(out, b"hello world, this is lz4 framed data");
    }

    #[test]
    fn rejects_zero_decompressed_size()
    {
        let mut framed = frame(&[b"x"]);
        framed[4..8].copy_from_slice(&0i32.to_le_bytes());

        let lz4 = Lz4;
        assert!(lz4.decompress_all(&framed, 16).is_err());
    }

    #[test]
    fn rejects_negative_decompressed_size()
    {
        let mut framed = frame(&[b"x"]);
        framed[4..8].copy_from_slice(&(-1i32).to_le_bytes());

        let lz4 = Lz4;
        assert!(lz4.decompress_all(&framed, 16).is_err());
    }
}
