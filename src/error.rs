/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Error types shared across the whole crate.
//!
//! Modeled as a tagged variant rather than a `Box<dyn
//! Error>`: a lightweight, `Copy` [`ErrorCode`] for
//! library-local failures, and a heavier [`SourceError`] for
//! failures that wrap an external error (I/O, a YAML
//! engine). This lets hot paths (e.g. scalar conversion)
//! return errors without paying for an allocation.

use std::{error::Error as StdError, fmt, io};

/// Result typedef used throughout this library's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Opaque type representing all possible errors which can occur during
/// library usage.
pub struct Error
{
    inner: Box<internal::Error>,
}

impl Error
{
    /// Byte offset into the input stream at which the error occurred, if
    /// known.
    pub fn at(&self) -> Option<u64>
    {
        self.inner.at
    }

    /// Categorize the error.
    pub fn classify(&self) -> Category
    {
        self.inner.classify()
    }

    pub(crate) fn new(err: internal::Error) -> Self
    {
        Self {
            inner: Box::new(err),
        }
    }

    pub(crate) fn code(code: ErrorCode) -> Self
    {
        Self::new(internal::Error::new(code))
    }

    pub(crate) fn code_at(code: ErrorCode, at: u64) -> Self
    {
        Self::new(internal::Error::with_at(code, at))
    }

    pub(crate) fn heap(msg: impl Into<String>) -> Self
    {
        Self::new(internal::Error::new(internal::ErrorKind::Heap(msg.into())))
    }
}

/// Rough category of an [`Error`], mirroring spec section 7's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category
{
    /// The underlying byte stream returned an error while attempting I/O.
    Io,
    /// The ASDF or block framing was not syntactically valid.
    Syntax,
    /// The data contained in the stream could not be interpreted (e.g. a
    /// scalar conversion overflowed, a checksum mismatched).
    Data,
    /// The stream unexpectedly terminated before it was appropriate to
    /// do so.
    Eof,
}

pub(crate) mod internal
{
    use std::{error::Error as StdError, fmt, io};

    use super::{Category, ErrorCode};

    pub(crate) struct Error
    {
        pub kind: ErrorKind,
        pub at:   Option<u64>,
    }

    impl Error
    {
        pub fn new<T>(kind: T) -> Self
        where
            T: Into<ErrorKind>,
        {
            Self {
                kind: kind.into(),
                at:   None,
            }
        }

        pub fn with_at<T>(kind: T, at: u64) -> Self
        where
            T: Into<ErrorKind>,
        {
            Self {
                kind: kind.into(),
                at:   Some(at),
            }
        }

        pub fn classify(&self) -> Category
        {
            (&self.kind).into()
        }
    }

    #[derive(Debug)]
    pub(crate) enum ErrorKind
    {
        Code(ErrorCode),
        Heap(String),
        Io(io::Error),
    }

    impl fmt::Debug for Error
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
        {
            let mut this = f.debug_struct("Error");

            this.field("kind", &self.kind);

            if let Some(at) = self.at
            {
                this.field("at", &at);
            }

            this.finish()
        }
    }

    impl fmt::Display for Error
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
        {
            if let Some(at) = self.at
            {
                write!(f, "{}, at byte offset {}", self.kind, at)
            }
            else
            {
                fmt::Display::fmt(&self.kind, f)
            }
        }
    }

    impl StdError for Error
    {
        fn source(&self) -> Option<&(dyn StdError + 'static)>
        {
            StdError::source(&self.kind)
        }
    }

    impl From<Error> for super::Error
    {
        fn from(err: Error) -> Self
        {
            Self::new(err)
        }
    }

    impl From<&'_ ErrorKind> for Category
    {
        fn from(kind: &'_ ErrorKind) -> Self
        {
            match kind
            {
                ErrorKind::Code(c) => c.into(),
                ErrorKind::Heap(_) => Category::Data,
                ErrorKind::Io(_) => Category::Io,
            }
        }
    }

    impl fmt::Display for ErrorKind
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
        {
            match self
            {
                ErrorKind::Code(c) => fmt::Display::fmt(c, f),
                ErrorKind::Heap(s) => f.write_str(s),
                ErrorKind::Io(e) => fmt::Display::fmt(e, f),
            }
        }
    }

    impl StdError for ErrorKind
    {
        fn source(&self) -> Option<&(dyn StdError + 'static)>
        {
            match self
            {
                ErrorKind::Io(e) => Some(e),
                _ => None,
            }
        }
    }

    impl From<ErrorCode> for ErrorKind
    {
        fn from(e: ErrorCode) -> Self
        {
            ErrorKind::Code(e)
        }
    }

    impl From<io::Error> for ErrorKind
    {
        fn from(e: io::Error) -> Self
        {
            ErrorKind::Io(e)
        }
    }
}

/// Lightweight, `Copy` error codes for failures specific to this library.
///
/// Named after the structural anchors in spec section 7: parser framing
/// failures, block header failures, and the handful of allocation/YAML
/// engine failures the C source also distinguishes
/// (`src/error.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode
{
    /// Stream, parser or emitter entered a state inconsistent with its
    /// own invariants; normally only reachable via a bug in this crate.
    UnknownState,
    /// Construction of the underlying byte stream failed.
    StreamInitFailed,
    /// The `#ASDF <version>` / `#ASDF_STANDARD <version>` header lines
    /// were missing or malformed.
    InvalidAsdfHeader,
    /// Input ended before a structure (header, block, tree) was
    /// complete.
    UnexpectedEof,
    /// A block header's `header_size` was smaller than the minimum (48).
    InvalidBlockHeader,
    /// Expected the 4-byte block magic `\xd3BLK` but found something
    /// else.
    BlockMagicMismatch,
    /// The YAML engine failed to initialize.
    YamlParserInitFailed,
    /// The YAML engine failed to parse the captured tree bytes.
    YamlParseFailed,
    /// A scalar, tile or path offset is out of bounds.
    OutOfBounds,
    /// An allocation failed.
    OutOfMemory,
}

impl fmt::Display for ErrorCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        use ErrorCode::*;

        match self
        {
            UnknownState => f.write_str("parser or emitter reached an inconsistent state"),
            StreamInitFailed => f.write_str("failed to initialize byte stream"),
            InvalidAsdfHeader => f.write_str("invalid or missing #ASDF header"),
            UnexpectedEof => f.write_str("unexpected end of stream"),
            InvalidBlockHeader => f.write_str("invalid block header"),
            BlockMagicMismatch => f.write_str("expected block magic \\xd3BLK"),
            YamlParserInitFailed => f.write_str("failed to initialize YAML engine"),
            YamlParseFailed => f.write_str("failed to parse YAML tree"),
            OutOfBounds => f.write_str("index or offset out of bounds"),
            OutOfMemory => f.write_str("allocation failed"),
        }
    }
}

impl StdError for ErrorCode {}

impl From<ErrorCode> for Category
{
    fn from(code: ErrorCode) -> Self
    {
        use ErrorCode::*;

        match code
        {
            InvalidAsdfHeader | InvalidBlockHeader | BlockMagicMismatch | YamlParseFailed =>
            {
                Category::Syntax
            },
            OutOfBounds => Category::Data,
            UnexpectedEof => Category::Eof,
            UnknownState | StreamInitFailed | YamlParserInitFailed | OutOfMemory => Category::Io,
        }
    }
}

impl From<&'_ ErrorCode> for Category
{
    fn from(code: &'_ ErrorCode) -> Self
    {
        (*code).into()
    }
}

impl fmt::Debug for Error
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Error
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for Error
{
    fn source(&self) -> Option<&(dyn StdError + 'static)>
    {
        StdError::source(&*self.inner)
    }
}

impl From<ErrorCode> for Error
{
    fn from(code: ErrorCode) -> Self
    {
        Self::code(code)
    }
}

impl From<io::Error> for Error
{
    fn from(err: io::Error) -> Self
    {
        Self::new(internal::Error::new(err))
    }
}
