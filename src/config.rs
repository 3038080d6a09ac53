/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Recognised configuration options (spec section 6), grouped the way the
//! C source groups per-subsystem option structs.

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    /// Parser behavior flags.
    #[derive(Default)]
    pub struct ParserFlags: u32 {
        /// Emit a fine-grained YAML node event for every scalar/mapping/
        /// sequence encountered while walking the tree, in addition to
        /// the coarse [`Event`](crate::parser::Event) stream.
        const EMIT_YAML_EVENTS = 0b0001;
        /// Capture the raw bytes of the tree subrange so it can be handed
        /// to the YAML engine once `TREE_END` is reached. Required for
        /// [`crate::file::File::open`] to build a document; callers doing
        /// pure event-stream iteration may omit it.
        const BUFFER_TREE = 0b0010;
    }
}

bitflags! {
    /// Emitter behavior flags.
    #[derive(Default)]
    pub struct EmitterFlags: u32 {
        /// Emit blocks / a tree even when they would otherwise be
        /// elided as empty.
        const EMIT_EMPTY = 0b0001;
        /// Never append a `#ASDF BLOCK INDEX` appendix.
        const NO_BLOCK_INDEX = 0b0010;
        /// Emit `{}` for an empty tree rather than eliding it.
        const EMIT_EMPTY_TREE = 0b0100;
        /// Elide an empty tree entirely (overrides `EMIT_EMPTY_TREE`).
        const NO_EMIT_EMPTY_TREE = 0b1000;
    }
}

/// Decompression strategy (spec section 4.5 "Mode policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecompMode
{
    /// Use lazy (page-fault-driven) decompression when the host supports
    /// it, falling back to eager otherwise.
    #[default]
    Auto,
    /// Always decompress the whole block up front.
    Eager,
    /// Request lazy decompression; fall back to eager with a warning if
    /// unsupported.
    Lazy,
}

/// Decompression engine configuration.
#[derive(Debug, Clone)]
pub struct DecompConfig
{
    pub mode: DecompMode,
    /// Hard byte ceiling before a block's decompressed bytes spill to a
    /// temp file instead of an anonymous mapping. `0` means unlimited.
    pub max_memory_bytes: u64,
    /// Fraction of total system memory to use as the spill threshold
    /// instead of `max_memory_bytes`. `0.0` disables this check. Values
    /// outside `[0, 1]` or NaN are ignored with a warning.
    pub max_memory_threshold: f64,
    /// Preferred lazy-decompression chunk size; rounded up to a page
    /// multiple. `0` means one page.
    pub chunk_size: u32,
    /// Override the directory used for spill files. Falls back to
    /// `ASDF_TMPDIR`, then `TMPDIR`, then `/tmp`.
    pub tmp_dir: Option<PathBuf>,
    /// Caller-configurable ceiling on the payload size of a streamed
    /// block (flag bit 0), which otherwise has no documented bound and
    /// reads to EOF (spec section 9, Open Questions).
    pub max_streamed_block_bytes: u64,
}

impl Default for DecompConfig
{
    fn default() -> Self
    {
        Self {
            mode: DecompMode::Auto,
            max_memory_bytes: 0,
            max_memory_threshold: 0.0,
            chunk_size: 0,
            tmp_dir: None,
            max_streamed_block_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl DecompConfig
{
    /// Validate `max_memory_threshold`, logging a warning and resetting it
    /// to `0.0` (disabled) if it is out of range.
    pub(crate) fn sanitize(&mut self)
    {
        let t = self.max_memory_threshold;

        if !(0.0..=1.0).contains(&t) || t.is_nan()
        {
            if t != 0.0
            {
                log::warn!(
                    "decomp.max_memory_threshold {t} is out of range [0, 1]; disabling it"
                );
            }

            self.max_memory_threshold = 0.0;
        }
    }

    /// Resolve the byte threshold above which a block's bytes spill to a
    /// temp file, per spec section 4.5.
    pub(crate) fn spill_threshold(&self, total_memory: u64) -> u64
    {
        let from_fraction = if self.max_memory_threshold > 0.0
        {
            (total_memory as f64 * self.max_memory_threshold).floor() as u64
        }
        else
        {
            u64::MAX
        };

        match self.max_memory_bytes
        {
            0 => from_fraction,
            bytes => bytes.min(from_fraction),
        }
    }

    /// Directory spill files are created in, per spec section 4.5 and
    /// section 6.
    pub(crate) fn resolve_tmp_dir(&self) -> PathBuf
    {
        self.tmp_dir
            .clone()
            .or_else(|| std::env::var_os("ASDF_TMPDIR").map(PathBuf::from))
            .or_else(|| std::env::var_os("TMPDIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/tmp"))
    }
}

/// A `%TAG` shorthand directive used by the emitter to shorten tags on
/// write, per spec section 6.
#[derive(Debug, Clone)]
pub struct TagHandle
{
    pub handle: String,
    pub prefix: String,
}

/// Top level configuration for a [`crate::file::File`].
#[derive(Debug, Clone, Default)]
pub struct Config
{
    pub parser_flags:  ParserFlags,
    pub emitter_flags: EmitterFlags,
    pub decomp:        DecompConfig,
    pub tag_handles:   Vec<TagHandle>,
}

impl Config
{
    pub fn new() -> Self
    {
        let mut this = Self {
            parser_flags: ParserFlags::BUFFER_TREE,
            ..Default::default()
        };

        this.decomp.sanitize();
        this
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn invalid_threshold_is_disabled()
    {
        let mut cfg = DecompConfig {
            max_memory_threshold: 1.5,
            ..Default::default()
        };

        cfg.sanitize();

        assert_eq!(cfg.max_memory_threshold, 0.0);
    }

    #[test]
    fn nan_threshold_is_disabled()
    {
        let mut cfg = DecompConfig {
            max_memory_threshold: f64::NAN,
            ..Default::default()
        };

        cfg.sanitize();

        assert_eq!(cfg.max_memory_threshold, 0.0);
    }

    #[test]
    fn spill_threshold_prefers_smaller_bound()
    {
        let cfg = DecompConfig {
            max_memory_bytes: 100,
            max_memory_threshold: 0.5,
            ..Default::default()
        };

        assert_eq!(cfg.spill_threshold(1000), 100);
    }
}
