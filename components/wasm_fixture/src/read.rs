use crate::cmd::{SECTION_CUSTOM, WASM_MAGIC, WASM_VERSION};
use crate::leb128::{self, Leb128Error};
use crate::Preamble;
use std::ops::Range;
use zerocopy::FromBytes;

/// Errors found while walking the section structure of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReadError {
  /// There were too few bytes in the file to form a preamble.
  IncompletePreamble {
    /// The file length
    file_len: usize,
  },
  /// The file does not start with [`WASM_MAGIC`].
  BadMagic {
    /// The magic value that we actually found
    parsed_magic: [u8; 4],
  },
  /// The version is not [`WASM_VERSION`].
  BadVersion {
    /// The version field that we actually found
    parsed_version: u32,
  },
  /// A section length or custom section name length could not be read.
  Leb128(Leb128Error),
  /// A section length points past the end of the file.
  SectionOverrun {
    /// The location of the section id byte, or of the name in a custom section
    pos: usize,
    /// The claimed section length
    len: u64,
    /// The file length
    file_len: usize,
  },
}

impl std::fmt::Display for ReadError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReadError::IncompletePreamble { file_len } =>
        write!(f, "file is {file_len} bytes, too short for a module preamble"),
      ReadError::BadMagic { parsed_magic } =>
        write!(f, "bad magic number: expected {WASM_MAGIC:02x?}, found {parsed_magic:02x?}"),
      ReadError::BadVersion { parsed_version } =>
        write!(f, "unsupported version {parsed_version}, expected {WASM_VERSION}"),
      ReadError::Leb128(e) => write!(f, "{e}"),
      ReadError::SectionOverrun { pos, len, file_len } => write!(
        f,
        "section at byte {pos} claims {len} bytes of contents, \
        but the file is only {file_len} bytes long"
      ),
    }
  }
}

impl std::error::Error for ReadError {}

impl From<Leb128Error> for ReadError {
  fn from(e: Leb128Error) -> Self { ReadError::Leb128(e) }
}

impl Preamble {
  /// Check the preamble at the start of `buf`, returning the rest of the file.
  pub fn parse(buf: &[u8]) -> Result<&[u8], ReadError> {
    let (pre, rest) = Preamble::ref_from_prefix(buf)
      .map_err(|_| ReadError::IncompletePreamble { file_len: buf.len() })?;
    if pre.magic != WASM_MAGIC {
      return Err(ReadError::BadMagic { parsed_magic: pre.magic })
    }
    if pre.version.get() != WASM_VERSION {
      return Err(ReadError::BadVersion { parsed_version: pre.version.get() })
    }
    Ok(rest)
  }
}

/// A section located by [`Sections`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef<'a> {
  /// The section id
  pub id: u8,
  /// The byte range of the whole section in the file, from the id byte to the
  /// end of the contents
  pub bounds: (usize, usize),
  /// The section contents, as delimited by the length field
  pub contents: &'a [u8],
}

impl<'a> SectionRef<'a> {
  /// The byte range of the whole section.
  #[must_use]
  pub fn range(&self) -> Range<usize> { self.bounds.0..self.bounds.1 }

  /// For a custom section, the name and the data following it.
  pub fn custom(&self) -> Option<Result<(&'a [u8], &'a [u8]), ReadError>> {
    (self.id == SECTION_CUSTOM).then(|| self.split_name())
  }

  fn split_name(&self) -> Result<(&'a [u8], &'a [u8]), ReadError> {
    let contents_start = self.bounds.1 - self.contents.len();
    let (len, n) = leb128::read_u64(self.contents, contents_start)?;
    let rest = &self.contents[n..];
    match usize::try_from(len) {
      Ok(len) if len <= rest.len() => Ok(rest.split_at(len)),
      _ => Err(ReadError::SectionOverrun { pos: contents_start, len, file_len: self.bounds.1 }),
    }
  }
}

/// An iterator over the sections of a module. This only follows the length
/// fields; section contents are not interpreted.
#[derive(Debug, Clone)]
#[must_use]
pub struct Sections<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> Sections<'a> {
  /// Check the preamble of `buf` and prepare to walk its sections.
  pub fn new(buf: &'a [u8]) -> Result<Self, ReadError> {
    let rest = Preamble::parse(buf)?;
    Ok(Self { buf, pos: buf.len() - rest.len() })
  }

  fn read_section(&mut self) -> Result<SectionRef<'a>, ReadError> {
    let start = self.pos;
    let id = self.buf[start];
    let (len, n) = leb128::read_u64(&self.buf[start + 1..], start + 1)?;
    let contents_start = start + 1 + n;
    let overrun = || ReadError::SectionOverrun { pos: start, len, file_len: self.buf.len() };
    let len = usize::try_from(len).map_err(|_| overrun())?;
    let end = contents_start.checked_add(len).filter(|&e| e <= self.buf.len()).ok_or_else(overrun)?;
    self.pos = end;
    Ok(SectionRef { id, bounds: (start, end), contents: &self.buf[contents_start..end] })
  }
}

impl<'a> Iterator for Sections<'a> {
  type Item = Result<SectionRef<'a>, ReadError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.pos >= self.buf.len() { return None }
    let res = self.read_section();
    // stop after an error, since the next section boundary is unknown
    if res.is_err() { self.pos = self.buf.len() }
    Some(res)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_file() {
    assert_eq!(Sections::new(b"\0asm").unwrap_err(), ReadError::IncompletePreamble { file_len: 4 });
  }

  #[test]
  fn bad_header() {
    assert_eq!(
      Sections::new(b"\x7fELF\x01\0\0\0").unwrap_err(),
      ReadError::BadMagic { parsed_magic: *b"\x7fELF" }
    );
    assert_eq!(
      Sections::new(b"\0asm\x02\0\0\0").unwrap_err(),
      ReadError::BadVersion { parsed_version: 2 }
    );
  }

  #[test]
  fn overrun() {
    let buf = b"\0asm\x01\0\0\0\x00\x05\x01a";
    let mut it = Sections::new(buf).unwrap();
    assert_eq!(
      it.next(),
      Some(Err(ReadError::SectionOverrun { pos: 8, len: 5, file_len: 12 }))
    );
    assert_eq!(it.next(), None);
  }

  #[test]
  fn unterminated_length() {
    let buf = b"\0asm\x01\0\0\0\x00\x80";
    let mut it = Sections::new(buf).unwrap();
    assert_eq!(it.next(), Some(Err(ReadError::Leb128(Leb128Error::Exhausted { pos: 9 }))));
  }

  #[test]
  fn custom_name() {
    let buf = b"\0asm\x01\0\0\0\x00\x05\x03abcZ";
    let sec = Sections::new(buf).unwrap().next().unwrap().unwrap();
    assert_eq!(sec.range(), 8..15);
    assert_eq!(sec.custom(), Some(Ok((&b"abc"[..], &b"Z"[..]))));
  }
}
