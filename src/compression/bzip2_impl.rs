/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

use std::io::Read;

use bzip2::read::BzDecoder;

use super::{ChunkCursor, Compressor};
use crate::error::{Error, ErrorCode, Result};

/// bzip2, via `libbz2` (spec section 4.4).
pub struct Bzip2;

impl Compressor for Bzip2
{
    fn decompress_all(&self, input: &[u8], expected_size: u64) -> Result<Vec<u8>>
    {
        let mut out = Vec::with_capacity(expected_size as usize);

        BzDecoder::new(input).read_to_end(&mut out).map_err(|e| {
            log::warn!("bzip2 decompression failed: {e}");
            Error::code(ErrorCode::YamlParseFailed)
        })?;

        Ok(out)
    }

    fn optimal_chunk_size(&self, _input: &[u8]) -> usize
    {
        // bzip2 has no natural independently-decodable chunk unit below a
        // whole stream, so the lazy engine's page size rounding supplies
        // the granularity instead.
        64 * 1024
    }

    fn open_chunks<'a>(&self, input: &'a [u8]) -> Box<dyn ChunkCursor + 'a>
    {
        Box::new(Bzip2Cursor {
            decoder: BzDecoder::new(input),
        })
    }
}

struct Bzip2Cursor<'a>
{
    decoder: BzDecoder<&'a [u8]>,
}

impl ChunkCursor for Bzip2Cursor<'_>
{
    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize>
    {
        self.decoder.read(out).map_err(|e| {
            log::warn!("bzip2 chunk decompression failed: {e}");
            Error::code(ErrorCode::YamlParseFailed)
        })
    }
}
