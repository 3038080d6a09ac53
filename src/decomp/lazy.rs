/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Lazy, page-fault-driven decompression on Linux via
//! `userfaultfd`.
//!
//! The destination mapping is registered with the kernel's
//! page-fault notifier as soon as the block is opened; a
//! dedicated handler thread owned by the returned
//! [`LazyRegion`] waits for fault notifications and installs
//! the corresponding bytes with an atomic copy ioctl. Any
//! thread that touches an unfilled page - including a thread
//! holding this `LazyRegion` - blocks until that copy
//! completes; that blocking is supplied by the kernel, not by
//! any code here. Cancellation flips a stop flag, drops the
//! handler's `uffd` handle so its blocking read returns, and
//! joins the thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use userfaultfd::{Event, UffdBuilder};

use crate::{
    compression::Compressor,
    config::DecompConfig,
    error::{Error, ErrorCode, Result},
};

fn page_size() -> usize
{
    extern "C" {
        #[link_name = "sysconf"]
        fn sysconf(name: i32) -> i64;
    }

    const SC_PAGESIZE: i32 = 30;

    let n = unsafe { sysconf(SC_PAGESIZE) };
    if n > 0
    {
        n as usize
    }
    else
    {
        4096
    }
}

fn round_up(n: usize, align: usize) -> usize
{
    (n + align - 1) / align * align
}

/// Whether this host supports userfaultfd-backed lazy decompression.
/// Used to decide between the lazy and eager paths before committing to
/// either.
pub fn is_supported() -> bool
{
    UffdBuilder::new()
        .close_on_exec(true)
        .non_blocking(false)
        .create()
        .is_ok()
}

/// A region whose bytes are materialized on first touch by a dedicated
/// page-fault handler thread, rather than up front.
pub struct LazyRegion
{
    mmap:   memmap2::MmapMut,
    len:    usize,
    stop:   Arc<AtomicBool>,
    uffd:   Option<Arc<userfaultfd::Uffd>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl LazyRegion
{
    pub fn as_slice(&self) -> &[u8]
    {
        &self.mmap[..self.len]
    }
}

impl Drop for LazyRegion
{
    fn drop(&mut self)
    {
        self.stop.store(true, Ordering::SeqCst);

        // The handler thread's blocking `read_event` call only returns
        // once every clone of the uffd handle is closed; dropping ours
        // here is what wakes it.
        drop(self.uffd.take());

        if let Some(handle) = self.handle.take()
        {
            let _ = handle.join();
        }
    }
}

/// Start lazy decompression of `raw` (still-compressed bytes whose
/// decompressed size is `data_size`) using compressor `comp`.
///
/// The payload is decompressed once, up front, into an ordinary heap
/// buffer; what is lazy is installing that buffer's pages into the
/// mapping the caller will read from, which happens one page at a time
/// as the reader touches them rather than all at once.
pub fn start(
    comp: &dyn Compressor,
    raw: &[u8],
    data_size: u64,
    config: &DecompConfig,
) -> Result<LazyRegion>
{
    let page = page_size();
    let len = data_size as usize;

    let decompressed = comp.decompress_all(raw, data_size)?;

    let mut mmap = memmap2::MmapMut::map_anon(len.max(1)).map_err(Error::from)?;

    let uffd = UffdBuilder::new()
        .close_on_exec(true)
        .non_blocking(false)
        .create()
        .map_err(|e| {
            log::warn!("failed to create userfaultfd: {e}");
            Error::code(ErrorCode::StreamInitFailed)
        })?;

    unsafe {
        uffd.register(mmap.as_mut_ptr() as *mut _, len.max(1))
            .map_err(|e| {
                log::warn!("failed to register lazy region with userfaultfd: {e}");
                Error::code(ErrorCode::StreamInitFailed)
            })?;
    }

    let base = mmap.as_mut_ptr() as usize;
    let uffd = Arc::new(uffd);
    let stop = Arc::new(AtomicBool::new(false));

    let handler_uffd = Arc::clone(&uffd);
    let handler_stop = Arc::clone(&stop);
    let _ = config;

    let handle = std::thread::Builder::new()
        .name("asdf-lazy-decomp".into())
        .spawn(move || handler_loop(handler_uffd, handler_stop, decompressed, base, len, page))
        .map_err(Error::from)?;

    Ok(LazyRegion {
        mmap,
        len,
        stop,
        uffd: Some(uffd),
        handle: Some(handle),
    })
}

fn handler_loop(
    uffd: Arc<userfaultfd::Uffd>,
    stop: Arc<AtomicBool>,
    decompressed: Vec<u8>,
    base: usize,
    len: usize,
    page: usize,
)
{
    loop
    {
        if stop.load(Ordering::SeqCst)
        {
            return;
        }

        let event = match uffd.read_event()
        {
            Ok(Some(e)) => e,
            Ok(None) | Err(_) => return,
        };

        let Event::Pagefault { addr, .. } = event
        else
        {
            continue;
        };

        if stop.load(Ordering::SeqCst)
        {
            return;
        }

        let fault_addr = addr as usize;
        let page_offset = (fault_addr - base) / page * page;
        let this_len = page.min(len.saturating_sub(page_offset));

        if this_len == 0
        {
            continue;
        }

        let mut scratch = vec![0u8; page];
        scratch[..this_len].copy_from_slice(&decompressed[page_offset..page_offset + this_len]);

        let dst = (base + page_offset) as *mut std::ffi::c_void;

        unsafe {
            if let Err(e) = uffd.copy(scratch.as_ptr() as *const _, dst, scratch.len(), true)
            {
                log::warn!("userfaultfd copy-ioctl failed: {e}");
            }
        }
    }
}
