/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Multi-needle substring search used to resynchronize the
//! parser on the next recognised token (`%YAML`, `\n...`,
//! the block magic, or the block-index header) after
//! tolerated garbage, per spec sections 4.1 and 4.2 ("Any
//! other content between anchors is tolerated").
//!
//! Grounded on `examples/original_source/src/parse_util.h`,
//! which factors exactly this "skip to next anchor" helper
//! out for reuse between the tree-skip and block-scan paths.

use super::Stream;
use crate::error::Result;

/// Advance `stream` to just before the first occurrence of any of
/// `tokens`, consuming everything scanned over. Returns the index into
/// `tokens` of whichever token matched, or `None` if the stream was
/// exhausted with no match.
pub fn scan(stream: &mut Stream, tokens: &[&[u8]]) -> Result<Option<usize>>
{
    assert!(!tokens.is_empty(), "scan() requires at least one needle");

    let max_len = tokens.iter().map(|t| t.len()).max().unwrap_or(1);
    stream.set_scan_overlap(max_len.saturating_sub(1));

    let mut want = max_len.max(4096);

    loop
    {
        let (buf, avail) = stream.next(want)?;

        if let Some((at, id)) = find_first(buf, tokens)
        {
            stream.consume(at)?;
            return Ok(Some(id));
        }

        if avail < want
        {
            // The source is exhausted and nothing matched.
            stream.consume(avail)?;
            return Ok(None);
        }

        // No match anywhere in the currently buffered region. Consume
        // everything except the last `max_len - 1` bytes, which might be
        // the prefix of a match straddling the next refill, then ask for
        // a bigger window.
        let safe = avail.saturating_sub(max_len.saturating_sub(1));
        stream.consume(safe)?;
        want = (want.saturating_mul(2)).max(max_len);
    }
}

fn find_first(buf: &[u8], tokens: &[&[u8]]) -> Option<(usize, usize)>
{
    let mut best: Option<(usize, usize)> = None;

    for (id, needle) in tokens.iter().enumerate()
    {
        if needle.is_empty() || needle.len() > buf.len()
        {
            continue;
        }

        if let Some(at) = find_subslice(buf, needle)
        {
            best = match best
            {
                Some((best_at, _)) if best_at <= at => best,
                _ => Some((at, id)),
            };
        }
    }

    best
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize>
{
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn finds_earliest_token()
    {
        let mut s = Stream::from_bytes(b"garbage garbage %YAML 1.1\n...\n".to_vec());

        let id = scan(&mut s, &[b"%YAML", b"\n...\n"]).unwrap().unwrap();
        assert_eq!(id, 0);

        let (buf, _) = s.next(5).unwrap();
        assert_eq!(&buf[..5], b"%YAML");
    }

    #[test]
    fn returns_none_when_absent()
    {
        let mut s = Stream::from_bytes(b"no tokens here".to_vec());

        assert_eq!(scan(&mut s, &[b"%YAML"]).unwrap(), None);
    }

    #[test]
    fn prefers_first_matching_position_across_needles()
    {
        let mut s = Stream::from_bytes(b"xx\xd3BLKyy#ASDF BLOCK INDEX".to_vec());

        let id = scan(&mut s, &[b"#ASDF BLOCK INDEX", b"\xd3BLK"])
            .unwrap()
            .unwrap();
        assert_eq!(id, 1);
    }
}
