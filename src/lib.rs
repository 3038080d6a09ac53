/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! This library reads and writes ASDF files: a hybrid
//! container format pairing a textual YAML 1.1 tree with a
//! sequence of length-prefixed binary blocks.
//!
//! An ASDF file begins with two `#ASDF` comment lines,
//! followed by one YAML document, then zero or more binary
//! blocks, and optionally a plain-text block-index appendix
//! for random access.
//!
//! The exposed APIs are grouped by module:
//!
//! - [`stream`] - the byte-source abstraction the parser and
//!   block layer are built on.
//! - [`parser`] - the streaming state machine that turns a
//!   byte stream into an [`Event`](parser::Event) sequence.
//! - [`block`] - block header parsing, checksums and
//!   on-demand access to block bytes.
//! - [`compression`] - the pluggable compressor registry
//!   (zlib, bzip2, lz4).
//! - [`decomp`] - eager and lazy decompression of block
//!   payloads.
//! - [`value`] - a typed view over the YAML tree, with
//!   scalar inference and overflow-checked conversions.
//! - [`path`] - JSON-Pointer-like path syntax for addressing
//!   nodes in the tree.
//! - [`extension`] - the process-wide tag -> extension
//!   registry.
//! - [`ext`] - the worked extensions: `ndarray`, `datatype`,
//!   `software`.
//! - [`file`] - the [`File`](file::File) facade tying all of
//!   the above together.
//! - [`emitter`] - writes version comments, a tree and
//!   blocks back out to a stream.

#![allow(clippy::suspicious_else_formatting)]

pub mod block;
pub mod compression;
pub mod config;
pub mod context;
pub mod decomp;
pub mod emitter;
pub mod ext;
pub mod extension;
pub mod file;
pub mod parser;
pub mod path;
pub mod stream;
pub mod value;

mod error;

pub use crate::{
    config::Config,
    context::Context,
    error::{Category, Error, Result},
    file::File,
};
