/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

use std::io::SeekFrom;

use crate::{
    error::{Error, ErrorCode, Result},
    stream::Region,
};

/// A zero-copy, in-memory stream backend.
pub struct MemBackend
{
    buf: Vec<u8>,
    pos: usize,
}

impl MemBackend
{
    pub(super) fn new(buf: Vec<u8>) -> Self
    {
        Self { buf, pos: 0 }
    }

    pub(super) fn fill(&mut self, n: usize) -> usize
    {
        (self.buf.len() - self.pos).min(n)
    }

    pub(super) fn buffered(&self) -> &[u8]
    {
        &self.buf[self.pos..]
    }

    pub(super) fn consume(&mut self, n: usize) -> &[u8]
    {
        let n = n.min(self.buf.len() - self.pos);
        let start = self.pos;
        self.pos += n;

        &self.buf[start..self.pos]
    }

    pub(super) fn tell(&self) -> u64
    {
        self.pos as u64
    }

    pub(super) fn seek(&mut self, pos: SeekFrom) -> Result<u64>
    {
        let new_pos = match pos
        {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(off) => self.pos as i64 + off,
            SeekFrom::End(off) => self.buf.len() as i64 + off,
        };

        if new_pos < 0 || new_pos as usize > self.buf.len()
        {
            return Err(Error::code(ErrorCode::OutOfBounds));
        }

        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> Result<()>
    {
        if self.pos == self.buf.len()
        {
            self.buf.extend_from_slice(buf);
        }
        else
        {
            let end = self.pos + buf.len();
            if end > self.buf.len()
            {
                self.buf.resize(end, 0);
            }
            self.buf[self.pos..end].copy_from_slice(buf);
        }

        self.pos += buf.len();
        Ok(())
    }

    pub(super) fn region(&self, pos: u64, len: u64) -> Result<Region<'_>>
    {
        let pos = pos as usize;
        let end = pos
            .checked_add(len as usize)
            .filter(|&e| e <= self.buf.len())
            .ok_or(ErrorCode::OutOfBounds)?;

        Ok(Region::Borrowed(&self.buf[pos..end]))
    }
}
