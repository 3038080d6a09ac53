/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! The streaming parser state machine (spec section 4.2):
//! walks a file from its first byte, producing an event
//! stream without assuming seekability, and tolerates
//! malformed or garbage regions between structural anchors.
//!
//! Grounded on `dolysis-yary`'s scanner: a state enum drives
//! a single `next_event` entry point that consumes from a
//! [`Stream`] and returns one [`Event`] at a time, mirroring
//! the teacher's token-at-a-time `Scanner::next_token`
//! loop, generalized from YAML tokens to ASDF's coarser
//! structural anchors.

use crate::{
    block::{
        header::{BLOCK_INDEX_HEADER, BLOCK_MAGIC},
        BlockIndex, BlockInfo,
    },
    error::{Error, ErrorCode, Result},
    stream::Stream,
};

const BLOCK_INDEX_LINE: &[u8] = BLOCK_INDEX_HEADER;
const TREE_DIRECTIVE: &[u8] = b"%YAML";
const TREE_TERMINATOR: &[u8] = b"\n...\n";

const ANCHORS: &[&[u8]] = &[TREE_DIRECTIVE, TREE_TERMINATOR, &BLOCK_MAGIC, BLOCK_INDEX_LINE];

/// One structural event produced by the parser, in the order its anchor
/// appeared in the input (spec section 5, "Ordering").
#[derive(Debug)]
pub enum Event
{
    AsdfVersion(String),
    StandardVersion(String),
    Comment(String),
    TreeStart,
    /// `bytes` is the raw tree subrange, present only when the parser was
    /// configured with [`crate::config::ParserFlags::BUFFER_TREE`].
    TreeEnd
    {
        bytes: Option<Vec<u8>>,
    },
    Block(BlockInfo),
    BlockIndex(BlockIndex),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State
{
    Initial,
    StandardVersion,
    Body,
    TreeBody,
    Done,
}

/// The streaming parser. Owns no stream; each call to [`Parser::next`]
/// takes one, so the same parser can in principle be resumed against a
/// stream that was re-opened at the same position.
pub struct Parser
{
    state:      State,
    buffer_tree: bool,
    /// A tiny pool of previously-returned string/byte buffers, reused by
    /// the next event that needs one rather than allocating fresh (spec
    /// section 4.2, "Event recycling"). Iteration is the hot loop; most
    /// events are short comment or version strings.
    free_strings: Vec<String>,
    free_bytes:   Vec<Vec<u8>>,
}

impl Parser
{
    pub fn new(buffer_tree: bool) -> Self
    {
        Self {
            state: State::Initial,
            buffer_tree,
            free_strings: Vec::new(),
            free_bytes: Vec::new(),
        }
    }

    /// Give a previously-yielded event's buffers back to the pool. Not
    /// required for correctness, only to avoid repeated allocation in the
    /// iteration hot loop.
    pub fn recycle(&mut self, event: Event)
    {
        match event
        {
            Event::AsdfVersion(s) | Event::StandardVersion(s) | Event::Comment(s) =>
            {
                self.stash_string(s)
            },
            Event::TreeEnd { bytes: Some(b) } => self.stash_bytes(b),
            _ =>
            {},
        }
    }

    fn stash_string(&mut self, mut s: String)
    {
        if self.free_strings.len() < 4
        {
            s.clear();
            self.free_strings.push(s);
        }
    }

    fn stash_bytes(&mut self, mut b: Vec<u8>)
    {
        if self.free_bytes.len() < 4
        {
            b.clear();
            self.free_bytes.push(b);
        }
    }

    fn take_string(&mut self) -> String
    {
        self.free_strings.pop().unwrap_or_default()
    }

    fn take_bytes(&mut self) -> Vec<u8>
    {
        self.free_bytes.pop().unwrap_or_default()
    }

    /// Produce the next event, or `Ok(None)` once the stream has been
    /// fully consumed and `End` was already returned.
    pub fn next(&mut self, stream: &mut Stream) -> Result<Option<Event>>
    {
        match self.state
        {
            State::Done => Ok(None),
            State::Initial => self.read_asdf_version(stream).map(Some),
            State::StandardVersion => self.read_standard_version(stream).map(Some),
            State::TreeBody => self.read_tree_end(stream).map(Some),
            State::Body => self.read_body(stream).map(Some),
        }
    }

    fn read_asdf_version(&mut self, stream: &mut Stream) -> Result<Event>
    {
        let at = stream.tell();
        let line = read_trimmed_line(stream)?.ok_or_else(|| Error::code_at(ErrorCode::InvalidAsdfHeader, at))?;

        let version = line
            .strip_prefix("#ASDF ")
            .ok_or_else(|| Error::code_at(ErrorCode::InvalidAsdfHeader, at))?;

        let mut s = self.take_string();
        s.push_str(version);

        self.state = State::StandardVersion;
        Ok(Event::AsdfVersion(s))
    }

    fn read_standard_version(&mut self, stream: &mut Stream) -> Result<Event>
    {
        let at = stream.tell();
        let line = read_trimmed_line(stream)?.ok_or_else(|| Error::code_at(ErrorCode::InvalidAsdfHeader, at))?;

        let version = line
            .strip_prefix("#ASDF_STANDARD ")
            .ok_or_else(|| Error::code_at(ErrorCode::InvalidAsdfHeader, at))?;

        let mut s = self.take_string();
        s.push_str(version);

        self.state = State::Body;
        Ok(Event::StandardVersion(s))
    }

    fn read_body(&mut self, stream: &mut Stream) -> Result<Event>
    {
        loop
        {
            let (buf, avail) = stream.next(BLOCK_INDEX_LINE.len())?;

            if avail == 0
            {
                self.state = State::Done;
                return Ok(Event::End);
            }

            if buf.starts_with(&BLOCK_MAGIC)
            {
                let info = BlockInfo::read(stream)?;
                return Ok(Event::Block(info));
            }

            if buf.starts_with(BLOCK_INDEX_LINE)
            {
                return self.read_block_index(stream);
            }

            if buf[0] == b'#'
            {
                let at = stream.tell();
                let line = read_trimmed_line(stream)?
                    .ok_or_else(|| Error::code_at(ErrorCode::UnexpectedEof, at))?;

                let mut s = self.take_string();
                s.push_str(line.trim_start_matches('#').trim_start());
                return Ok(Event::Comment(s));
            }

            if buf.starts_with(TREE_DIRECTIVE)
            {
                // Consume the whole `%YAML 1.1` directive line.
                read_trimmed_line(stream)?;

                if self.buffer_tree
                {
                    stream.start_capture();
                }

                self.state = State::TreeBody;
                return Ok(Event::TreeStart);
            }

            // Tolerated garbage: resynchronize on the next recognised
            // anchor (spec section 4.2).
            stream.scan(ANCHORS)?;
        }
    }

    fn read_tree_end(&mut self, stream: &mut Stream) -> Result<Event>
    {
        let at = stream.tell();

        match stream.scan(&[TREE_TERMINATOR])?
        {
            Some(_) =>
            {},
            None => return Err(Error::code_at(ErrorCode::UnexpectedEof, at)),
        }

        stream.consume(TREE_TERMINATOR.len())?;

        let bytes = if self.buffer_tree
        {
            let mut captured = stream.take_capture().unwrap_or_default();

            // The terminator itself was captured too; trim it back off
            // so callers see only the document bytes.
            let trimmed = captured.len().saturating_sub(TREE_TERMINATOR.len());
            captured.truncate(trimmed);

            Some(captured)
        }
        else
        {
            None
        };

        self.state = State::Body;
        Ok(Event::TreeEnd { bytes })
    }

    fn read_block_index(&mut self, stream: &mut Stream) -> Result<Event>
    {
        // Consume the `#ASDF BLOCK INDEX` line and the `%YAML 1.1\n---\n`
        // preamble that always precedes the sequence (spec section 6).
        read_trimmed_line(stream)?;
        read_trimmed_line(stream)?;
        read_trimmed_line(stream)?;

        let mut offsets = Vec::new();

        loop
        {
            let at = stream.tell();
            match read_trimmed_line(stream)?
            {
                None => break,
                Some(line) =>
                {
                    let line = line.trim();

                    if line == "..."
                    {
                        break;
                    }

                    let digits = line
                        .strip_prefix("- ")
                        .or_else(|| line.strip_prefix('-'))
                        .map(str::trim)
                        .ok_or_else(|| Error::code_at(ErrorCode::YamlParseFailed, at))?;

                    let offset: u64 = atoi::atoi(digits.as_bytes())
                        .ok_or_else(|| Error::code_at(ErrorCode::YamlParseFailed, at))?;

                    offsets.push(offset);
                },
            }
        }

        self.state = State::Done;
        Ok(Event::BlockIndex(BlockIndex::new(offsets)))
    }
}

fn read_trimmed_line(stream: &mut Stream) -> Result<Option<String>>
{
    match stream.readline()?
    {
        None => Ok(None),
        Some(bytes) =>
        {
            let s = String::from_utf8_lossy(&bytes);
            Ok(Some(s.trim_end_matches(['\n', '\r']).to_string()))
        },
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn events(input: &[u8], buffer_tree: bool) -> Vec<Event>
    {
        let mut stream = Stream::from_bytes(input.to_vec());
        let mut parser = Parser::new(buffer_tree);
        let mut out = Vec::new();

        while let Some(e) = parser.next(&mut stream).unwrap()
        {
            out.push(e);
        }

        out
    }

    #[test]
    fn minimal_file_emits_versions_then_end()
    {
        let input = b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n";
        let evs = events(input, true);

        assert!(matches!(&evs[0], Event::AsdfVersion(v) if v == "1.0.0"));
        assert!(matches!(&evs[1], Event::StandardVersion(v) if v == "1.6.0"));
        assert!(matches!(evs[2], Event::End));
        assert_eq!(evs.len(), 3);
    }

    #[test]
    fn comment_lines_are_emitted()
    {
        let input = b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n#a note\n";
        let evs = events(input, true);

        assert!(matches!(&evs[2], Event::Comment(c) if c == "a note"));
    }

    #[test]
    fn tree_is_captured_between_directive_and_terminator()
    {
        let input = b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\n%YAML 1.1\nfoo: 1\n\n...\n";
        let evs = events(input, true);

        assert!(matches!(evs[2], Event::TreeStart));
        match &evs[3]
        {
            Event::TreeEnd { bytes: Some(b) } => assert_eq!(b, b"foo: 1\n"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn garbage_between_anchors_is_skipped()
    {
        let mut input = b"#ASDF 1.0.0\n#ASDF_STANDARD 1.6.0\njunk junk junk".to_vec();

        let header = crate::block::header::BlockHeader {
            header_size: 48,
            flags: 0,
            compression: *b"\0\0\0\0",
            allocated_size: 0,
            used_size: 0,
            data_size: 0,
            checksum: [0u8; 16],
        };
        header.write_to(&mut input);

        let mut stream = Stream::from_bytes(input);
        let mut parser = Parser::new(false);

        assert!(matches!(
            parser.next(&mut stream).unwrap().unwrap(),
            Event::AsdfVersion(_)
        ));
        assert!(matches!(
            parser.next(&mut stream).unwrap().unwrap(),
            Event::StandardVersion(_)
        ));
        assert!(matches!(
            parser.next(&mut stream).unwrap().unwrap(),
            Event::Block(_)
        ));
    }
}
