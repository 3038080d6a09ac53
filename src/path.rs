/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! JSON-Pointer-like path syntax for addressing nodes in the
//! tree (spec section 4.7): `/a/b/0`, bracketed indices
//! `/a/[0]`, negative indices, and single- or double-quoted
//! segments containing `/`.

use std::fmt;

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment
{
    /// A segment that can only be a mapping key: contained a non-digit
    /// character, or was quoted.
    Key(String),
    /// A bracketed segment (`[0]`, `[-1]`): forces sequence-index
    /// interpretation even if the parent turns out to be a mapping.
    Index(i64),
    /// An unquoted, unbracketed all-digit segment: ambiguous between a
    /// mapping key and a sequence index until resolved against a parent
    /// container (spec section 4.7).
    Any(String),
}

/// A parsed path: an ordered list of segments from the document root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path
{
    pub segments: Vec<Segment>,
}

/// A failure to parse path syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError
{
    MissingLeadingSlash,
    UnbalancedQuote,
    UnbalancedBracket,
    InvalidEscape(char),
    InvalidIndex(String),
}

impl fmt::Display for PathError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            PathError::MissingLeadingSlash => f.write_str("path must start with '/'"),
            PathError::UnbalancedQuote => f.write_str("unbalanced quote in path"),
            PathError::UnbalancedBracket => f.write_str("unbalanced bracket in path"),
            PathError::InvalidEscape(c) => write!(f, "invalid escape '\\{c}' in path"),
            PathError::InvalidIndex(s) => write!(f, "'{s}' is not a valid bracketed index"),
        }
    }
}

impl std::error::Error for PathError {}

impl Path
{
    pub fn root() -> Self
    {
        Self { segments: Vec::new() }
    }

    pub fn is_root(&self) -> bool
    {
        self.segments.is_empty()
    }

    /// Build the path to a named mapping child.
    pub fn child_key(&self, key: impl Into<String>) -> Self
    {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Self { segments }
    }

    /// Build the path to a sequence child at `index`.
    pub fn child_index(&self, index: usize) -> Self
    {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index as i64));
        Self { segments }
    }

    /// Parse a path string. An empty string resolves to the document
    /// root.
    pub fn parse(s: &str) -> Result<Self, PathError>
    {
        if s.is_empty()
        {
            return Ok(Self::root());
        }

        let mut chars = s.chars();

        if chars.next() != Some('/')
        {
            return Err(PathError::MissingLeadingSlash);
        }

        let mut segments = Vec::new();
        let mut cur = String::new();
        let mut quote: Option<char> = None;
        let mut bracket_depth = 0u32;
        let mut forced_index = false;

        while let Some(c) = chars.next()
        {
            match c
            {
                '\\' =>
                {
                    match chars.next()
                    {
                        Some(e @ ('/' | '\\' | '[' | ']')) => cur.push(e),
                        Some(other) => return Err(PathError::InvalidEscape(other)),
                        None => return Err(PathError::UnbalancedQuote),
                    }
                },
                '\'' | '"' if quote.is_none() && cur.is_empty() && bracket_depth == 0 =>
                {
                    quote = Some(c);
                },
                c2 if Some(c2) == quote => quote = None,
                '[' if quote.is_none() =>
                {
                    if bracket_depth > 0
                    {
                        return Err(PathError::UnbalancedBracket);
                    }
                    bracket_depth += 1;
                    forced_index = true;
                },
                ']' if quote.is_none() =>
                {
                    if bracket_depth == 0
                    {
                        return Err(PathError::UnbalancedBracket);
                    }
                    bracket_depth -= 1;
                },
                '/' if quote.is_none() && bracket_depth == 0 =>
                {
                    segments.push(finish_segment(&cur, forced_index)?);
                    cur.clear();
                    forced_index = false;
                },
                other => cur.push(other),
            }
        }

        if quote.is_some()
        {
            return Err(PathError::UnbalancedQuote);
        }
        if bracket_depth != 0
        {
            return Err(PathError::UnbalancedBracket);
        }

        segments.push(finish_segment(&cur, forced_index)?);
        Ok(Self { segments })
    }

    /// Re-render this path as a string such that `Path::parse(&path.emit())
    /// == Ok(path)` (spec section 8).
    pub fn emit(&self) -> String
    {
        let mut out = String::new();

        for seg in &self.segments
        {
            out.push('/');

            match seg
            {
                Segment::Key(k) => out.push_str(&escape(k)),
                Segment::Any(s) => out.push_str(s),
                Segment::Index(i) =>
                {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                },
            }
        }

        out
    }
}

fn finish_segment(s: &str, forced_index: bool) -> Result<Segment, PathError>
{
    if forced_index
    {
        let n: i64 = s
            .parse()
            .map_err(|_| PathError::InvalidIndex(s.to_string()))?;
        return Ok(Segment::Index(n));
    }

    if !s.is_empty() && s.parse::<i64>().is_ok()
    {
        return Ok(Segment::Any(s.to_string()));
    }

    Ok(Segment::Key(s.to_string()))
}

fn escape(s: &str) -> String
{
    let mut out = String::with_capacity(s.len());

    for c in s.chars()
    {
        if matches!(c, '/' | '\\' | '[' | ']')
        {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

impl fmt::Display for Path
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.emit())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_plain_segments()
    {
        let p = Path::parse("/a/b/0").unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Any("0".into()),
            ]
        );
    }

    #[test]
    fn bracketed_index_forces_sequence_interpretation()
    {
        let p = Path::parse("/a/[0]").unwrap();
        assert_eq!(p.segments, vec![Segment::Key("a".into()), Segment::Index(0)]);
    }

    #[test]
    fn negative_bracketed_index()
    {
        let p = Path::parse("/[-1]").unwrap();
        assert_eq!(p.segments, vec![Segment::Index(-1)]);
    }

    #[test]
    fn quoted_segment_may_contain_slash()
    {
        let p = Path::parse("/'a/b'/c").unwrap();
        assert_eq!(
            p.segments,
            vec![Segment::Key("a/b".into()), Segment::Key("c".into())]
        );
    }

    #[test]
    fn escaped_slash_in_unquoted_segment()
    {
        let p = Path::parse(r"/a\/b").unwrap();
        assert_eq!(p.segments, vec![Segment::Key("a/b".into())]);
    }

    #[test]
    fn empty_path_is_root()
    {
        let p = Path::parse("").unwrap();
        assert!(p.is_root());
    }

    #[test]
    fn unbalanced_bracket_is_an_error()
    {
        assert_eq!(Path::parse("/[0").unwrap_err(), PathError::UnbalancedBracket);
    }

    #[test]
    fn unbalanced_quote_is_an_error()
    {
        assert_eq!(Path::parse("/'a").unwrap_err(), PathError::UnbalancedQuote);
    }

    #[test]
    fn round_trips_through_emit()
    {
        let p = Path::parse("/history/extensions/0/extension_uri").unwrap();
        let reparsed = Path::parse(&p.emit()).unwrap();
        assert_eq!(p, reparsed);

        let p2 = Path::parse("/a/[0]/[-1]").unwrap();
        assert_eq!(Path::parse(&p2.emit()).unwrap(), p2);
    }
}
