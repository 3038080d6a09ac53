/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! The pluggable compressor registry (spec section 4.4).
//!
//! Grounded on the design notes' replacement for
//! constructor-based global registration: a static array of
//! built-in descriptors is installed into a process-wide
//! [`std::sync::OnceLock`] on first use, and
//! [`register`] lets callers add their own before the first
//! file operation. No reliance on static-initializer
//! ordering (spec section 9).

mod bzip2_impl;
mod lz4_impl;
mod zlib_impl;

use std::{collections::HashMap, sync::OnceLock, sync::RwLock};

use crate::error::Result;

/// The four-byte compression tag as it appears in a block header. An
/// all-zero tag means uncompressed (spec section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression
{
    None,
    Zlib,
    Bzip2,
    Lz4,
    /// A tag the registry has no compressor for. Per spec section 7's
    /// propagation policy this degrades to "copy raw bytes" rather than
    /// failing the whole block.
    Unknown([u8; 4]),
}

impl Compression
{
    pub fn parse(tag: Option<[u8; 4]>) -> Self
    {
        match tag
        {
            None => Compression::None,
            Some(t) if &t == b"zlib" => Compression::Zlib,
            Some(t) if &t == b"bzp2" => Compression::Bzip2,
            Some(t) if &t == b"lz4\0" => Compression::Lz4,
            Some(t) => Compression::Unknown(t),
        }
    }

    pub fn tag_bytes(&self) -> [u8; 4]
    {
        match self
        {
            Compression::None => *b"\0\0\0\0",
            Compression::Zlib => *b"zlib",
            Compression::Bzip2 => *b"bzp2",
            Compression::Lz4 => *b"lz4\0",
            Compression::Unknown(t) => *t,
        }
    }
}

/// A pluggable decompressor, looked up by four-byte tag.
///
/// Mirrors the C source's `{init, info, decomp, destroy}` callback
/// record (spec section 4.4), collapsed into a trait: `init` is the
/// trait's constructor (performed by the registry before returning a
/// boxed value), `destroy` is `Drop`, and `info`/`decomp` become
/// `optimal_chunk_size`/`decompress_all`+`open_chunks`.
pub trait Compressor: Send + Sync
{
    /// Decompress the whole of `input`, whose decompressed size is
    /// expected to be `expected_size` bytes.
    fn decompress_all(&self, input: &[u8], expected_size: u64) -> Result<Vec<u8>>;

    /// The chunk size this compressor's framing naturally produces,
    /// advertised to the lazy decompression engine as its default
    /// `optimal_chunk_size` (spec section 4.5).
    fn optimal_chunk_size(&self, input: &[u8]) -> usize;

    /// Open a chunk-at-a-time cursor over `input`, for lazy
    /// decompression (spec section 4.5): each call to
    /// [`ChunkCursor::next_chunk`] decompresses exactly one chunk.
    fn open_chunks<'a>(&self, input: &'a [u8]) -> Box<dyn ChunkCursor + 'a>;
}

/// A chunk-at-a-time decompression cursor, used by the lazy
/// decompression engine's page-fault handler to materialize one chunk
/// per fault.
pub trait ChunkCursor
{
    /// Decompress the next chunk into `out`, returning the number of
    /// bytes written, or `Ok(0)` when exhausted.
    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize>;
}

type Registry = RwLock<HashMap<[u8; 4], Box<dyn Compressor>>>;

fn registry() -> &'static Registry
{
    static REGISTRY: OnceLock<Registry> = OnceLock::new();

    REGISTRY.get_or_init(|| {
        let mut map: HashMap<[u8; 4], Box<dyn Compressor>> = HashMap::new();

        map.insert(*b"zlib", Box::new(zlib_impl::Zlib));
        map.insert(*b"bzp2", Box::new(bzip2_impl::Bzip2));
        map.insert(*b"lz4\0", Box::new(lz4_impl::Lz4));

        RwLock::new(map)
    })
}

/// Register a user-supplied compressor under `tag`. The first
/// registration for a tag wins; later ones are rejected with a warning,
/// matching the extension registry's idempotent-free policy (spec
/// section 4.8).
pub fn register(tag: [u8; 4], compressor: Box<dyn Compressor>)
{
    let mut map = registry().write().expect("compressor registry poisoned");

    if map.contains_key(&tag)
    {
        log::warn!(
            "compressor for tag {:?} already registered; ignoring",
            String::from_utf8_lossy(&tag)
        );
        return;
    }

    map.insert(tag, compressor);
}

/// Look up the compressor for a four-byte tag, if one is registered, and
/// invoke `f` with it while the registry lock is held.
pub fn with_compressor<R>(tag: [u8; 4], f: impl FnOnce(Option<&dyn Compressor>) -> R) -> R
{
    let guard = registry().read().expect("compressor registry poisoned");

    f(guard.get(&tag).map(|b| b.as_ref()))
}

/// Whether a compressor is registered for `tag`.
pub fn is_registered(tag: [u8; 4]) -> bool
{
    with_compressor(tag, |c| c.is_some())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_known_tags()
    {
        assert_eq!(Compression::parse(None), Compression::None);
        assert_eq!(Compression::parse(Some(*b"zlib")), Compression::Zlib);
        assert_eq!(Compression::parse(Some(*b"bzp2")), Compression::Bzip2);
        assert_eq!(Compression::parse(Some(*b"lz4\0")), Compression::Lz4);
    }

    #[test]
    fn unknown_tag_is_preserved_not_rejected()
    {
        let c = Compression::parse(Some(*b"zstd"));
        assert_eq!(c, Compression::Unknown(*b"zstd"));
    }

    #[test]
    fn builtin_compressors_are_registered()
    {
        assert!(is_registered(*b"zlib"));
        assert!(is_registered(*b"bzp2"));
        assert!(is_registered(*b"lz4\0"));
        assert!(!is_registered(*b"nope"));
    }
}
