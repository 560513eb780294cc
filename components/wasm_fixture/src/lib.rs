//! Encoding tools for hand-assembled WebAssembly test fixtures.
//!
//! This crate produces small, structurally valid binary modules: a minimal module
//! exporting a function that returns a constant, optionally inflated with a large
//! custom section. See the [binary format] chapter of the WebAssembly specification
//! for the layout being produced.
//!
//! [binary format]: https://webassembly.github.io/spec/core/binary/index.html

// rust lints we want
#![warn(
  bare_trait_objects,
  elided_lifetimes_in_paths,
  missing_copy_implementations,
  missing_debug_implementations,
  future_incompatible,
  rust_2018_idioms,
  trivial_numeric_casts,
  variant_size_differences,
  unreachable_pub,
  unused,
  missing_docs
)]
#![deny(unsafe_op_in_unsafe_fn)]
// all the clippy
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// all the clippy::restriction lints we want
#![warn(
  clippy::else_if_without_else,
  clippy::float_arithmetic,
  clippy::get_unwrap,
  clippy::integer_division,
  clippy::rest_pat_in_fully_bound_structs,
  clippy::string_add,
  clippy::unwrap_used
)]
// all the clippy lints we don't want
#![allow(
  clippy::cognitive_complexity,
  clippy::missing_const_for_fn,
  clippy::missing_errors_doc,
  clippy::missing_panics_doc,
  clippy::module_name_repetitions,
  clippy::multiple_crate_versions,
  clippy::option_if_let_else,
  clippy::redundant_pub_crate,
  clippy::semicolon_if_nothing_returned,
  clippy::too_many_lines,
  clippy::use_self
)]

pub mod leb128;
mod read;
mod write;

use std::io;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U32, Unaligned};

pub use {read::*, write::*};

/// Constants used in the WebAssembly binary format.
pub mod cmd {
  /// `WASM_MAGIC = "\0asm"`: Magic number at the start of every binary module.
  pub const WASM_MAGIC: [u8; 4] = *b"\0asm";
  /// `WASM_VERSION = 1`, the only binary format version in use
  pub const WASM_VERSION: u32 = 1;

  /// `SECTION_CUSTOM = 0`: auxiliary data, skipped by conforming readers
  pub const SECTION_CUSTOM: u8 = 0;
  /// `SECTION_TYPE = 1`: function signatures
  pub const SECTION_TYPE: u8 = 1;
  /// `SECTION_FUNCTION = 3`: type index of each defined function
  pub const SECTION_FUNCTION: u8 = 3;
  /// `SECTION_EXPORT = 7`: exported names
  pub const SECTION_EXPORT: u8 = 7;
  /// `SECTION_CODE = 10`: function bodies
  pub const SECTION_CODE: u8 = 10;

  /// `FUNC_TYPE = 0x60`, introduces a function signature in the type section
  pub const FUNC_TYPE: u8 = 0x60;
  /// `VAL_I32 = 0x7F`, the `i32` value type
  pub const VAL_I32: u8 = 0x7F;
  /// `VAL_I64 = 0x7E`, the `i64` value type
  pub const VAL_I64: u8 = 0x7E;
  /// `EXPORT_FUNC = 0x00`, export descriptor kind for functions
  pub const EXPORT_FUNC: u8 = 0x00;

  /// `OP_I32_CONST = 0x41`, followed by a signed LEB128 immediate
  pub const OP_I32_CONST: u8 = 0x41;
  /// `OP_I64_CONST = 0x42`, followed by a signed LEB128 immediate
  pub const OP_I64_CONST: u8 = 0x42;
  /// `OP_END = 0x0B`, terminates a function body
  pub const OP_END: u8 = 0x0B;
}

/// The fixed 8 byte header of a binary module.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Preamble {
  /// Magic number, equal to [`WASM_MAGIC`](cmd::WASM_MAGIC)
  pub magic: [u8; 4],
  /// Format version, equal to [`WASM_VERSION`](cmd::WASM_VERSION)
  pub version: U32<LE>,
}

impl Default for Preamble {
  fn default() -> Self {
    Self { magic: cmd::WASM_MAGIC, version: U32::new(cmd::WASM_VERSION) }
  }
}

/// Errors raised while encoding or assembling a module.
#[derive(Debug)]
pub enum Error {
  /// A quantity that must be non-negative was given a negative value.
  InvalidArgument {
    /// What the value was supposed to be
    what: &'static str,
    /// The value that was actually passed
    value: i128,
  },
  /// Writing the output failed.
  Io(io::Error),
}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::InvalidArgument { what, value } =>
        write!(f, "invalid argument: {what} must be non-negative, got {value}"),
      Error::Io(e) => write!(f, "i/o failure: {e}"),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::InvalidArgument { .. } => None,
      Error::Io(e) => Some(e),
    }
  }
}

impl From<io::Error> for Error {
  fn from(e: io::Error) -> Self { Error::Io(e) }
}

/// Convert a signed count to `usize`, rejecting negative values.
pub fn non_negative(what: &'static str, value: i64) -> Result<usize, Error> {
  usize::try_from(value).map_err(|_| Error::InvalidArgument { what, value: value.into() })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preamble_bytes() {
    assert_eq!(Preamble::default().as_bytes(), b"\0asm\x01\0\0\0");
  }

  #[test]
  fn non_negative_rejects() {
    assert_eq!(non_negative("padding", 5).unwrap(), 5);
    let e = non_negative("padding", -1).unwrap_err();
    assert!(matches!(e, Error::InvalidArgument { what: "padding", value: -1 }));
    assert_eq!(e.to_string(), "invalid argument: padding must be non-negative, got -1");
  }
}
