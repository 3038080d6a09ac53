/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

use std::{
    fs::File,
    io::{Read as _, Seek, SeekFrom, Write as _},
};

use crate::{
    error::{Error, ErrorCode, Result},
    stream::{io_to_stream_init, Region},
};

const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// A file-descriptor-backed stream with a sliding read buffer.
///
/// On refill, the last `OVERLAP` bytes of the previous buffer are kept
/// at the front of the new one so that a multi-byte token search
/// straddling a refill boundary (spec section 4.1's "Token scanner")
/// still sees a contiguous run of bytes.
pub struct FileBackend
{
    file: File,

    buf:    Vec<u8>,
    cursor: usize, // index into buf of the next unconsumed byte
    filled: usize, // number of valid bytes in buf

    /// Absolute file offset corresponding to `buf[0]`.
    base: u64,
    /// Absolute file offset of the next unconsumed byte (`base + cursor`).
    pos: u64,

    seekable: bool,
    eof:      bool,

    /// Bytes of overlap to preserve across a refill, sized to
    /// `max_needle_len - 1` by the token scanner; defaults to a
    /// conservative constant until the scanner requests more.
    overlap: usize,
}

impl FileBackend
{
    pub(super) fn new(mut file: File) -> Result<Self>
    {
        let pos = file.stream_position().unwrap_or(0);
        let seekable = file.seek(SeekFrom::Current(0)).is_ok();

        // Reset back in case the probe above actually moved anything.
        let _ = file.seek(SeekFrom::Start(pos));

        Ok(Self {
            file,
            buf: Vec::new(),
            cursor: 0,
            filled: 0,
            base: pos,
            pos,
            seekable,
            eof: false,
            overlap: 16,
        })
    }

    pub fn file(&self) -> &File
    {
        &self.file
    }

    pub fn is_seekable(&self) -> bool
    {
        self.seekable
    }

    pub(super) fn set_overlap(&mut self, overlap: usize)
    {
        self.overlap = overlap;
    }

    fn remaining(&self) -> usize
    {
        self.filled - self.cursor
    }

    /// Ensure at least `min(n, remaining-at-EOF)` bytes are buffered
    /// starting at `cursor`, refilling from the file as needed.
    pub(super) fn fill(&mut self, n: usize) -> Result<usize>
    {
        while self.remaining() < n && !self.eof
        {
            self.refill()?;
        }

        Ok(self.remaining().min(n))
    }

    fn refill(&mut self) -> Result<()>
    {
        let keep_from = self.cursor.saturating_sub(self.overlap);
        let keep_len = self.filled - keep_from;

        let want = DEFAULT_BUF_SIZE.max(keep_len + DEFAULT_BUF_SIZE);

        let mut new_buf = vec![0u8; want];
        new_buf[..keep_len].copy_from_slice(&self.buf[keep_from..self.filled]);

        let read = self.file.read(&mut new_buf[keep_len..]).map_err(|e| {
            log::warn!("I/O error reading ASDF stream: {e}");
            Error::from(e)
        })?;

        if read == 0
        {
            self.eof = true;
        }

        self.base += keep_from as u64;
        self.cursor -= keep_from;
        self.buf = new_buf;
        self.filled = keep_len + read;

        Ok(())
    }

    pub(super) fn buffered(&self) -> &[u8]
    {
        &self.buf[self.cursor..self.filled]
    }

    pub(super) fn consume(&mut self, n: usize) -> Result<&[u8]>
    {
        let n = n.min(self.remaining());
        let start = self.cursor;
        self.cursor += n;
        self.pos += n as u64;

        Ok(&self.buf[start..self.cursor])
    }

    pub(super) fn tell(&self) -> u64
    {
        self.pos
    }

    pub(super) fn seek(&mut self, pos: SeekFrom) -> Result<u64>
    {
        if !self.seekable
        {
            return match pos
            {
                SeekFrom::Current(off) if off >= 0 =>
                {
                    let mut remaining = off as usize;
                    while remaining > 0
                    {
                        let (_, avail) = (self.buffered(), self.remaining());
                        let take = avail.min(remaining);

                        if take == 0
                        {
                            self.fill(remaining)?;

                            if self.remaining() == 0
                            {
                                break;
                            }
                            continue;
                        }

                        self.consume(take)?;
                        remaining -= take;
                    }

                    Ok(self.pos)
                },
                _ => Err(Error::code(ErrorCode::OutOfBounds)),
            };
        }

        let target = self.file.seek(pos).map_err(Error::from)?;

        self.base = target;
        self.pos = target;
        self.cursor = 0;
        self.filled = 0;
        self.eof = false;

        Ok(target)
    }

    pub(super) fn write(&mut self, buf: &[u8]) -> Result<()>
    {
        self.file.write_all(buf).map_err(Error::from)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub(super) fn flush(&mut self) -> Result<()>
    {
        self.file.flush().map_err(Error::from)
    }

    pub(super) fn region(&self, pos: u64, len: u64) -> Result<Region<'_>>
    {
        if len == 0
        {
            // `Mmap` refuses to map a zero-length region; hand back an
            // empty borrowed slice instead of failing the whole block.
            return Ok(Region::Borrowed(&[]));
        }

        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .offset(pos)
                .len(len as usize)
                .map(&self.file)
                .map_err(|e| {
                    log::warn!("failed to mmap block region at {pos}: {e}");
                    Error::from(e)
                })?
        };

        Ok(Region::Mapped(mmap))
    }
}

pub(crate) fn open_read(path: impl AsRef<std::path::Path>) -> Result<File>
{
    File::open(path).map_err(io_to_stream_init)
}
