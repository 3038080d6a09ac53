/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Orchestrates bringing a block's bytes into a usable
//! mapped region, eagerly or lazily, in memory or spilled to
//! a temp file (spec section 4.5).

#[cfg(all(target_os = "linux", feature = "lazy-decomp"))]
pub mod lazy;

use std::io::Write as _;

use crate::{
    block::BlockInfo,
    compression::{self, Compression},
    config::{DecompConfig, DecompMode},
    context::Context,
    error::{Error, ErrorCode, Result},
    stream::Stream,
};

/// A block's materialized, decompressed bytes.
pub enum Decompressed
{
    /// Borrowed straight from the file's mapping; used for uncompressed
    /// blocks, which need no decompression step at all.
    Mapped(memmap2::Mmap),
    /// Held in ordinary heap memory, used for small decompressed
    /// payloads (the "anonymous mapping" case in spec section 4.5).
    Mem(Vec<u8>),
    /// Decompressed into a temp file and mapped back in, used once the
    /// decompressed size exceeds the configured memory threshold (the
    /// "file-backed temp mapping" case). The temp file is unlinked
    /// immediately after creation so it disappears with the last open
    /// handle (spec section 4.5).
    Spilled
    {
        mmap:    memmap2::Mmap,
        /// Kept only so callers (spec section 8, scenario 5: "the block
        /// handle reports `own_fd = true`") can introspect the backing
        /// fd; dropping it closes the file.
        file:    std::fs::File,
        own_fd:  bool,
    },
    #[cfg(all(target_os = "linux", feature = "lazy-decomp"))]
    Lazy(lazy::LazyRegion),
}

impl Decompressed
{
    pub fn as_slice(&self) -> &[u8]
    {
        match self
        {
            Decompressed::Mapped(m) => m,
            Decompressed::Mem(v) => v,
            Decompressed::Spilled { mmap, .. } => mmap,
            #[cfg(all(target_os = "linux", feature = "lazy-decomp"))]
            Decompressed::Lazy(l) => l.as_slice(),
        }
    }

    /// Whether this block owns a real file descriptor backing its data,
    /// per spec section 8 scenario 5 ("the block handle reports
    /// `own_fd = true`").
    pub fn owns_fd(&self) -> bool
    {
        matches!(self, Decompressed::Spilled { own_fd: true, .. })
    }
}

impl std::fmt::Debug for Decompressed
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let variant = match self
        {
            Decompressed::Mapped(_) => "Mapped",
            Decompressed::Mem(_) => "Mem",
            Decompressed::Spilled { .. } => "Spilled",
            #[cfg(all(target_os = "linux", feature = "lazy-decomp"))]
            Decompressed::Lazy(_) => "Lazy",
        };

        write!(f, "Decompressed::{variant}({} bytes)", self.as_slice().len())
    }
}

/// Best-effort total system memory in bytes, used to resolve
/// `max_memory_threshold` (spec section 4.5). Falls back to "unlimited"
/// (`u64::MAX`) when it cannot be determined, which disables the
/// fraction-based check without affecting `max_memory_bytes`.
fn total_memory() -> u64
{
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/meminfo")
        {
            for line in contents.lines()
            {
                if let Some(rest) = line.strip_prefix("MemTotal:")
                {
                    let kb: u64 = rest
                        .trim()
                        .trim_end_matches(" kB")
                        .trim()
                        .parse()
                        .unwrap_or(0);
                    if kb > 0
                    {
                        return kb * 1024;
                    }
                }
            }
        }
    }

    u64::MAX
}

/// Bring block `info`'s bytes into a usable region, per spec section
/// 4.5's backing and mode policy.
pub fn decompress(
    stream: &Stream,
    cxt: &Context,
    config: &DecompConfig,
    info: &BlockInfo,
    used_size: u64,
) -> Result<Decompressed>
{
    let region = stream.open_mem(info.data_pos, used_size)?;

    match info.compression
    {
        Compression::None =>
        {
            // Nothing to decompress; hand back the mapped region
            // directly. A memory-backed stream has no mmap to reuse, so
            // fall back to a copy in that case.
            match stream.as_file()
            {
                Some(file) =>
                {
                    let mmap = unsafe {
                        memmap2::MmapOptions::new()
                            .offset(info.data_pos)
                            .len(used_size as usize)
                            .map(file)
                            .map_err(Error::from)?
                    };
                    Ok(Decompressed::Mapped(mmap))
                },
                None => Ok(Decompressed::Mem(region.to_vec())),
            }
        },
        Compression::Unknown(tag) =>
        {
            log::warn!(
                "unknown compression tag {:?}; copying block raw",
                String::from_utf8_lossy(&tag)
            );
            Ok(Decompressed::Mem(region.to_vec()))
        },
        comp =>
        {
            let tag = comp.tag_bytes();
            let raw: Vec<u8> = region.to_vec();
            let data_size = info.header.data_size;

            decompress_with(cxt, config, tag, &raw, data_size)
        },
    }
}

fn decompress_with(
    cxt: &Context,
    config: &DecompConfig,
    tag: [u8; 4],
    raw: &[u8],
    data_size: u64,
) -> Result<Decompressed>
{
    let threshold = config.spill_threshold(total_memory());
    let wants_lazy = matches!(config.mode, DecompMode::Lazy | DecompMode::Auto);
    let fits_in_memory = threshold == 0 || data_size <= threshold;

    if wants_lazy
    {
        #[cfg(all(target_os = "linux", feature = "lazy-decomp"))]
        {
            if fits_in_memory && lazy::is_supported()
            {
                return compression::with_compressor(tag, |c| match c
                {
                    Some(c) => lazy::start(c, raw, data_size, config).map(Decompressed::Lazy),
                    None => Err(Error::code(ErrorCode::YamlParseFailed)),
                });
            }

            if config.mode == DecompMode::Lazy
            {
                log::warn!(
                    "lazy decompression requested but block requires file-backed spill; \
                     falling back to eager"
                );
            }
        }

        #[cfg(not(all(target_os = "linux", feature = "lazy-decomp")))]
        {
            if config.mode == DecompMode::Lazy
            {
                log::warn!(
                    "lazy decompression is unsupported on this build; falling back to eager"
                );
            }
        }
    }

    let _ = cxt;

    let decompressed = compression::with_compressor(tag, |c| match c
    {
        Some(c) => c.decompress_all(raw, data_size),
        None => Err(Error::code(ErrorCode::YamlParseFailed)),
    })?;

    if fits_in_memory
    {
        Ok(Decompressed::Mem(decompressed))
    }
    else
    {
        spill_to_tempfile(config, &decompressed)
    }
}

fn spill_to_tempfile(config: &DecompConfig, bytes: &[u8]) -> Result<Decompressed>
{
    let dir = config.resolve_tmp_dir();

    let mut file = tempfile::tempfile_in(&dir).map_err(|e| {
        log::warn!("failed to create spill temp file in {}: {e}", dir.display());
        Error::from(e)
    })?;

    file.write_all(bytes).map_err(Error::from)?;
    file.flush().map_err(Error::from)?;

    let mmap = if bytes.is_empty()
    {
        None
    }
    else
    {
        Some(unsafe { memmap2::Mmap::map(&file).map_err(Error::from)? })
    };

    match mmap
    {
        Some(mmap) => Ok(Decompressed::Spilled {
            mmap,
            file,
            own_fd: true,
        }),
        None => Ok(Decompressed::Mem(Vec::new())),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn uncompressed_block_is_zero_copy_for_mem_stream()
    {
        let data = b"raw uncompressed payload";
        let mut bytes = Vec::new();
        let header = crate::block::header::BlockHeader {
            header_size: 48,
            flags: 0,
            compression: *b"\0\0\0\0",
            allocated_size: data.len() as u64,
            used_size: data.len() as u64,
            data_size: data.len() as u64,
            checksum: [0u8; 16],
        };
        header.write_to(&mut bytes);
        bytes.extend_from_slice(data);

        let mut stream = Stream::from_bytes(bytes);
        let info = BlockInfo::read(&mut stream).unwrap();
        let cxt = Context::new();
        let cfg = DecompConfig::default();

        let d = decompress(&stream, &cxt, &cfg, &info, data.len() as u64).unwrap();
        assert_eq!(d.as_slice(), data);
    }
}
