/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! A shared, reference-counted error slot and logging
//! configuration.
//!
//! Every file-owned object (parser, emitter, stream, block)
//! retains a reference to its file's [`Context`]; the
//! ownership graph is acyclic (file -> parser/emitter/stream
//! -> context) so an `Rc` refcount is sufficient, mirroring
//! the C source's reference-counted `asdf_context_t`
//! (`src/context.c`).
//!
//! The library also keeps one process-wide [`Context`] for
//! errors raised before any file is opened (failed extension
//! or compressor registration), matching spec section 3.

use std::{
    env,
    sync::{Arc, Mutex, OnceLock},
};

use log::LevelFilter;

use crate::error::Error;

/// Shared error slot and logging configuration, cloned cheaply (`Rc`) by
/// every object a [`crate::file::File`] owns.
#[derive(Clone)]
pub struct Context
{
    inner: Arc<Mutex<Inner>>,
}

struct Inner
{
    last_error: Option<Error>,
    level:      LevelFilter,
}

impl Context
{
    /// Create a new context, reading the initial log level from
    /// `ASDF_LOG_LEVEL` the way the C source reads it at startup
    /// (`src/context.c`).
    pub fn new() -> Self
    {
        let level = env::var("ASDF_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Warn);

        log::set_max_level(level);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                last_error: None,
                level,
            })),
        }
    }

    /// The global, process-wide context used for errors raised before any
    /// file is opened (e.g. a failed extension registration).
    pub fn global() -> &'static Context
    {
        static GLOBAL: OnceLock<Context> = OnceLock::new();

        GLOBAL.get_or_init(Context::new)
    }

    /// Record `err` as the last error on this context, returning it
    /// unchanged so call sites can `return Err(cxt.set_error(e))`.
    pub fn set_error(&self, err: Error) -> Error
    {
        let display = err.to_string();
        log::error!("{display}");

        self.inner.lock().unwrap().last_error = Some(err);

        Error::heap(display)
    }

    /// The most recently recorded error's message, if any.
    pub fn error_message(&self) -> Option<String>
    {
        self.inner
            .lock()
            .unwrap()
            .last_error
            .as_ref()
            .map(ToString::to_string)
    }

    /// Clear the last recorded error.
    pub fn clear_error(&self)
    {
        self.inner.lock().unwrap().last_error = None;
    }

    /// Current log level filter.
    pub fn level(&self) -> LevelFilter
    {
        self.inner.lock().unwrap().level
    }

    /// Override the log level for this context.
    pub fn set_level(&self, level: LevelFilter)
    {
        self.inner.lock().unwrap().level = level;
    }
}

impl Default for Context
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl std::fmt::Debug for Context
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Context")
            .field("level", &self.level())
            .field("has_error", &self.inner.lock().unwrap().last_error.is_some())
            .finish()
    }
}

/// Read the last error message from `file`'s context, or the global
/// context if `file` is `None` - mirroring the C API's `asdf_get_error`.
pub fn error(cxt: Option<&Context>) -> Option<String>
{
    match cxt
    {
        Some(cxt) => cxt.error_message(),
        None => Context::global().error_message(),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn fresh_context_has_no_error()
    {
        let cxt = Context::new();

        assert_eq!(cxt.error_message(), None);
    }

    #[test]
    fn set_error_is_visible_through_clone()
    {
        let cxt = Context::new();
        let clone = cxt.clone();

        cxt.set_error(Error::code(crate::error::ErrorCode::UnexpectedEof));

        assert!(clone.error_message().is_some());
    }
}
