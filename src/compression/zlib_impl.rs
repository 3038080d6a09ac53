/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

use flate2::{Decompress, FlushDecompress};

use super::{ChunkCursor, Compressor};
use crate::error::{Error, ErrorCode, Result};

/// zlib, auto-detecting the zlib or raw-gzip wrapper the same way the C
/// source's `inflateInit2` with a window bits of `47` does (spec
/// section 4.4).
pub struct Zlib;

impl Compressor for Zlib
{
    fn decompress_all(&self, input: &[u8], expected_size: u64) -> Result<Vec<u8>>
    {
        let mut out = vec![0u8; expected_size as usize];
        let mut decomp = Decompress::new(true);

        decomp
            .decompress(input, &mut out, FlushDecompress::Finish)
            .map_err(|e| {
                log::warn!("zlib decompression failed: {e}");
                Error::code(ErrorCode::YamlParseFailed)
            })?;

        out.truncate(decomp.total_out() as usize);
        Ok(out)
    }

    fn optimal_chunk_size(&self, _input: &[u8]) -> usize
    {
        64 * 1024
    }

    fn open_chunks<'a>(&self, input: &'a [u8]) -> Box<dyn ChunkCursor + 'a>
    {
        Box::new(ZlibCursor {
            decomp: Decompress::new(true),
            input,
        })
    }
}

struct ZlibCursor<'a>
{
    decomp: Decompress,
    input:  &'a [u8],
}

impl ChunkCursor for ZlibCursor<'_>
{
    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize>
    {
        if self.input.is_empty()
        {
            return Ok(0);
        }

        let before_in = self.decomp.total_in();
        let before_out = self.decomp.total_out();

        self.decomp
            .decompress(self.input, out, FlushDecompress::None)
            .map_err(|e| {
                log::warn!("zlib chunk decompression failed: {e}");
                Error::code(ErrorCode::YamlParseFailed)
            })?;

        let consumed = (self.decomp.total_in() - before_in) as usize;
        let produced = (self.decomp.total_out() - before_out) as usize;

        self.input = &self.input[consumed..];
        Ok(produced)
    }
}
