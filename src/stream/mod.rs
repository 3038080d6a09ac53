/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Byte-source abstraction the parser, block layer and
//! emitter are built on (spec section 4.1).
//!
//! Grounded on `dolysis-yary`'s `reader` module: there, a
//! sealed `Read` trait is driven by a scanner that never
//! assumes the whole input is resident in memory. Here the
//! same shape is flattened into a single [`Stream`] type
//! over two backends (`Mem`, `File`) rather than a trait
//! object, since there are exactly two concrete byte
//! sources and no user-extensible third one.

mod file;
mod mem;
pub mod scan;

use std::io::{self, SeekFrom};

pub use self::{file::FileBackend, mem::MemBackend};
use crate::error::{Error, ErrorCode, Result};

/// A mapped or borrowed region of bytes, returned by [`Stream::open_mem`].
///
/// For a memory-backed stream this borrows directly from the owned
/// buffer; for a file-backed stream it is a `mmap`ed region, which is
/// what lets [`crate::block::Block::data`] hand out `&[u8]`s without
/// copying the whole block into the process's heap.
pub enum Region<'a>
{
    Borrowed(&'a [u8]),
    Mapped(memmap2::Mmap),
}

impl std::ops::Deref for Region<'_>
{
    type Target = [u8];

    fn deref(&self) -> &[u8]
    {
        match self
        {
            Region::Borrowed(b) => b,
            Region::Mapped(m) => m,
        }
    }
}

/// The byte source backing a [`Stream`].
enum Backend
{
    Mem(MemBackend),
    File(FileBackend),
}

/// A seekable-or-not byte stream with peek/consume semantics and optional
/// multi-needle scanning, used by both the parser and the emitter.
pub struct Stream
{
    backend: Backend,
    /// When set, every consumed byte is also appended here, letting the
    /// parser lazily materialize the YAML tree subrange as bytes (spec
    /// section 4.1, "Optional capture mode").
    capture: Option<Vec<u8>>,
}

impl Stream
{
    /// Wrap an in-memory buffer. Zero-copy: `next`/`scan` borrow directly
    /// from `buf`.
    pub fn from_bytes(buf: Vec<u8>) -> Self
    {
        Self {
            backend: Backend::Mem(MemBackend::new(buf)),
            capture: None,
        }
    }

    /// Wrap a `std::fs::File`, buffering reads through a sliding window.
    pub fn from_file(file: std::fs::File) -> Result<Self>
    {
        Ok(Self {
            backend: Backend::File(FileBackend::new(file)?),
            capture: None,
        })
    }

    /// Whether this stream supports arbitrary seeks (a file does; a
    /// pipe/fd does not, per spec section 4.1).
    pub fn is_seekable(&self) -> bool
    {
        match &self.backend
        {
            Backend::Mem(_) => true,
            Backend::File(f) => f.is_seekable(),
        }
    }

    /// Begin capturing every subsequently consumed byte.
    pub fn start_capture(&mut self)
    {
        self.capture = Some(Vec::new());
    }

    /// Stop capturing, returning whatever was captured since
    /// [`Stream::start_capture`].
    pub fn take_capture(&mut self) -> Option<Vec<u8>>
    {
        self.capture.take()
    }

    /// Peek at least one buffered byte and try to make `n` bytes
    /// available, without advancing the stream position. Returns the
    /// available slice (which may be shorter than `n` at EOF) and its
    /// length.
    pub fn next(&mut self, n: usize) -> Result<(&[u8], usize)>
    {
        let avail = match &mut self.backend
        {
            Backend::Mem(m) => m.fill(n),
            Backend::File(f) => f.fill(n)?,
        };

        let slice = match &self.backend
        {
            Backend::Mem(m) => m.buffered(),
            Backend::File(f) => f.buffered(),
        };

        Ok((slice, avail))
    }

    /// Advance the stream by `n` bytes, which must be `<=` the length
    /// last returned by [`Stream::next`].
    pub fn consume(&mut self, n: usize) -> Result<()>
    {
        if n == 0
        {
            return Ok(());
        }

        let consumed = match &mut self.backend
        {
            Backend::Mem(m) => m.consume(n),
            Backend::File(f) => f.consume(n)?,
        };

        if let Some(cap) = &mut self.capture
        {
            cap.extend_from_slice(consumed);
        }

        Ok(())
    }

    /// Return the current line, including its terminator. On a
    /// non-seekable source, a line longer than the internal buffer is
    /// truncated and the remainder discarded (spec section 4.1).
    pub fn readline(&mut self) -> Result<Option<Vec<u8>>>
    {
        let mut line = Vec::new();

        loop
        {
            let (buf, avail) = self.next(4096)?;

            if avail == 0
            {
                return Ok(if line.is_empty() { None } else { Some(line) });
            }

            match buf.iter().position(|&b| b == b'\n')
            {
                Some(idx) =>
                {
                    line.extend_from_slice(&buf[..=idx]);
                    self.consume(idx + 1)?;
                    return Ok(Some(line));
                },
                None =>
                {
                    line.extend_from_slice(buf);
                    self.consume(avail)?;

                    if avail < 4096
                    {
                        // Exhausted the source without a terminator.
                        return Ok(Some(line));
                    }
                },
            }
        }
    }

    /// Scan forward for the first occurrence of any of `tokens`,
    /// consuming everything up to (but not including) the match. Returns
    /// the index into `tokens` of whichever matched, or `None` at EOF
    /// with no match.
    pub fn scan(&mut self, tokens: &[&[u8]]) -> Result<Option<usize>>
    {
        scan::scan(self, tokens)
    }

    /// Seek within the stream. Non-seekable sources accept only
    /// `SeekFrom::Current(offset)` with `offset >= 0`, implemented as a
    /// read-and-discard (spec section 4.1); any other request is
    /// rejected.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64>
    {
        match &mut self.backend
        {
            Backend::Mem(m) => m.seek(pos),
            Backend::File(f) => f.seek(pos),
        }
    }

    /// Current absolute position in the stream.
    pub fn tell(&self) -> u64
    {
        match &self.backend
        {
            Backend::Mem(m) => m.tell(),
            Backend::File(f) => f.tell(),
        }
    }

    /// Write `buf` to the stream (emitter use only).
    pub fn write(&mut self, buf: &[u8]) -> Result<()>
    {
        match &mut self.backend
        {
            Backend::Mem(m) => m.write(buf),
            Backend::File(f) => f.write(buf),
        }
    }

    pub fn flush(&mut self) -> Result<()>
    {
        match &mut self.backend
        {
            Backend::Mem(_) => Ok(()),
            Backend::File(f) => f.flush(),
        }
    }

    /// Map (or borrow) `len` bytes starting at absolute offset `pos`,
    /// for random-access block data reads.
    pub fn open_mem(&self, pos: u64, len: u64) -> Result<Region<'_>>
    {
        match &self.backend
        {
            Backend::Mem(m) => m.region(pos, len),
            Backend::File(f) => f.region(pos, len),
        }
    }

    /// Access the raw file handle, for spill-file mapping in the
    /// decompression engine.
    pub(crate) fn as_file(&self) -> Option<&std::fs::File>
    {
        match &self.backend
        {
            Backend::Mem(_) => None,
            Backend::File(f) => Some(f.file()),
        }
    }

    /// Hint the minimum byte overlap the file backend must preserve
    /// across a buffer refill, set by the token scanner to
    /// `max_needle_len - 1` (spec section 4.1). A no-op for memory
    /// streams, which never refill.
    pub(crate) fn set_scan_overlap(&mut self, overlap: usize)
    {
        if let Backend::File(f) = &mut self.backend
        {
            f.set_overlap(overlap);
        }
    }
}

pub(crate) fn eof_err(at: u64) -> Error
{
    Error::code_at(ErrorCode::UnexpectedEof, at)
}

pub(crate) fn io_to_stream_init(err: io::Error) -> Error
{
    log::warn!("stream initialization failed: {err}");
    Error::from(err)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn mem_stream_next_does_not_advance()
    {
        let mut s = Stream::from_bytes(b"hello world".to_vec());

        let (buf, avail) = s.next(5).unwrap();
        assert_eq!(avail, 5);
        assert_eq!(buf, b"hello");

        // next() again without consume returns the same bytes
        let (buf2, _) = s.next(5).unwrap();
        assert_eq!(buf2, b"hello");
    }

    #[test]
    fn mem_stream_consume_advances()
    {
        let mut s = Stream::from_bytes(b"hello world".to_vec());

        s.consume(6).unwrap();
        let (buf, _) = s.next(5).unwrap();
        assert_eq!(buf, b"world");
    }

    #[test]
    fn readline_returns_terminator()
    {
        let mut s = Stream::from_bytes(b"line one\nline two".to_vec());

        let line = s.readline().unwrap().unwrap();
        assert_eq!(line, b"line one\n");

        let line2 = s.readline().unwrap().unwrap();
        assert_eq!(line2, b"line two");

        assert_eq!(s.readline().unwrap(), None);
    }

    #[test]
    fn capture_records_consumed_bytes()
    {
        let mut s = Stream::from_bytes(b"abcdef".to_vec());
        s.start_capture();

        s.consume(3).unwrap();
        s.consume(2).unwrap();

        assert_eq!(s.take_capture().unwrap(), b"abcde".to_vec());
    }
}
