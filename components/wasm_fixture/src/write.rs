use crate::cmd::{
  EXPORT_FUNC, FUNC_TYPE, OP_END, OP_I32_CONST, OP_I64_CONST, SECTION_CODE, SECTION_CUSTOM,
  SECTION_EXPORT, SECTION_FUNCTION, SECTION_TYPE, VAL_I32, VAL_I64,
};
use crate::{leb128, non_negative, Error, Preamble};
use byteorder::WriteBytesExt;
use std::io::{self, Write};
use zerocopy::IntoBytes;

/// Write a section: the id byte, the LEB128 length of `payload`, then `payload`.
pub fn write_section(w: &mut impl Write, id: u8, payload: &[u8]) -> io::Result<()> {
  w.write_u8(id)?;
  leb128::write_u64(w, payload.len() as u64)?;
  w.write_all(payload)
}

/// Write a length-prefixed name.
fn write_name(w: &mut impl Write, name: &str) -> io::Result<()> {
  leb128::write_u64(w, name.len() as u64)?;
  w.write_all(name.as_bytes())
}

/// The result type of a constant function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
  /// `i32`
  I32,
  /// `i64`
  I64,
}

impl ValType {
  /// The value type byte.
  #[must_use]
  pub fn code(self) -> u8 {
    match self {
      ValType::I32 => VAL_I32,
      ValType::I64 => VAL_I64,
    }
  }
}

/// An exported function taking no arguments and returning a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstFunc {
  /// The export name
  pub name: String,
  /// The result type
  pub ty: ValType,
  /// The returned value. For `i32` functions this must fit in 32 bits.
  pub value: i64,
}

impl ConstFunc {
  fn write_body(&self, w: &mut impl Write) -> io::Result<()> {
    w.write_u8(0)?; // no locals
    match self.ty {
      ValType::I32 => w.write_u8(OP_I32_CONST)?,
      ValType::I64 => w.write_u8(OP_I64_CONST)?,
    }
    leb128::write_i64(w, self.value)?;
    w.write_u8(OP_END)
  }
}

/// A custom section (id 0): a name followed by uninterpreted bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
  /// The section name
  pub name: String,
  /// Everything after the name
  pub payload: Vec<u8>,
}

impl CustomSection {
  /// A custom section whose payload is `size` copies of `filler`.
  #[must_use]
  pub fn padding(name: &str, size: usize, filler: u8) -> Self {
    Self { name: name.to_owned(), payload: vec![filler; size] }
  }

  /// The length of the section contents, i.e. the value of the length field.
  #[must_use]
  pub fn contents_len(&self) -> usize {
    leb128::encoded_len(self.name.len() as u64) + self.name.len() + self.payload.len()
  }

  /// The full size of the section including the id byte and length field.
  #[must_use]
  pub fn encoded_len(&self) -> usize {
    let contents = self.contents_len();
    1 + leb128::encoded_len(contents as u64) + contents
  }

  /// Serialize the section, streaming the payload rather than copying it.
  pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
    w.write_u8(SECTION_CUSTOM)?;
    leb128::write_u64(w, self.contents_len() as u64)?;
    write_name(w, &self.name)?;
    w.write_all(&self.payload)
  }
}

/// A `ModuleBuilder` assembles a module out of constant functions and custom
/// sections. Sections are emitted in the order the format requires: type,
/// function, export, code, with custom sections last.
#[derive(Debug, Default, Clone)]
#[must_use = "a ModuleBuilder does nothing until it is written out"]
pub struct ModuleBuilder {
  funcs: Vec<ConstFunc>,
  custom: Vec<CustomSection>,
}

impl ModuleBuilder {
  /// An empty module, consisting only of the preamble.
  pub fn new() -> Self { Self::default() }

  /// Add an exported function `name` returning the `i32` constant `value`.
  pub fn const_i32(mut self, name: &str, value: i32) -> Self {
    self.funcs.push(ConstFunc { name: name.to_owned(), ty: ValType::I32, value: value.into() });
    self
  }

  /// Add an exported function `name` returning the `i64` constant `value`.
  pub fn const_i64(mut self, name: &str, value: i64) -> Self {
    self.funcs.push(ConstFunc { name: name.to_owned(), ty: ValType::I64, value });
    self
  }

  /// Append a custom section after the module proper.
  pub fn custom(mut self, section: CustomSection) -> Self {
    self.custom.push(section);
    self
  }

  /// The distinct signatures used, in first-use order, and the type index of each function.
  fn types(&self) -> (Vec<ValType>, Vec<u32>) {
    let mut types: Vec<ValType> = vec![];
    let idx: Vec<u32> = self.funcs.iter().map(|f| {
      let i = types.iter().position(|&t| t == f.ty).unwrap_or_else(|| {
        types.push(f.ty);
        types.len() - 1
      });
      u32::try_from(i).expect("too many types")
    }).collect();
    (types, idx)
  }

  /// Serialize the module.
  pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
    w.write_all(Preamble::default().as_bytes())?;
    if !self.funcs.is_empty() {
      let (types, idx) = self.types();
      let mut buf: Vec<u8> = vec![];

      leb128::write_u64(&mut buf, types.len() as u64)?;
      for ty in &types {
        buf.write_u8(FUNC_TYPE)?;
        leb128::write_u64(&mut buf, 0)?; // params
        leb128::write_u64(&mut buf, 1)?; // results
        buf.write_u8(ty.code())?;
      }
      write_section(w, SECTION_TYPE, &buf)?;

      buf.clear();
      leb128::write_u64(&mut buf, idx.len() as u64)?;
      for &i in &idx { leb128::write_u64(&mut buf, i.into())? }
      write_section(w, SECTION_FUNCTION, &buf)?;

      buf.clear();
      leb128::write_u64(&mut buf, self.funcs.len() as u64)?;
      for (i, f) in self.funcs.iter().enumerate() {
        write_name(&mut buf, &f.name)?;
        buf.write_u8(EXPORT_FUNC)?;
        leb128::write_u64(&mut buf, i as u64)?;
      }
      write_section(w, SECTION_EXPORT, &buf)?;

      buf.clear();
      let mut body: Vec<u8> = vec![];
      leb128::write_u64(&mut buf, self.funcs.len() as u64)?;
      for f in &self.funcs {
        body.clear();
        f.write_body(&mut body)?;
        leb128::write_u64(&mut buf, body.len() as u64)?;
        buf.extend_from_slice(&body);
      }
      write_section(w, SECTION_CODE, &buf)?;
    }
    for sec in &self.custom { sec.write_to(w)? }
    Ok(())
  }

  /// Serialize the module to a new buffer.
  #[must_use]
  pub fn build(&self) -> Vec<u8> {
    let mut out: Vec<u8> = vec![];
    self.write_to(&mut out).expect("writing to a Vec cannot fail");
    out
  }
}

/// The minimal module: a single export `main` returning the `i32` constant 42.
///
/// In text format this is `(module (func (export "main") (result i32) (i32.const 42)))`.
#[must_use]
pub fn minimal_module() -> Vec<u8> { ModuleBuilder::new().const_i32("main", 42).build() }

/// Append a custom section named `name` holding `padding` copies of `filler` to
/// the module `base`. Conforming readers skip custom sections, so the result
/// behaves exactly like `base`.
pub fn pad_module(base: &[u8], name: &str, padding: i64, filler: u8) -> Result<Vec<u8>, Error> {
  let size = non_negative("padding size", padding)?;
  let section = CustomSection::padding(name, size, filler);
  let mut out = Vec::with_capacity(base.len() + section.encoded_len());
  out.extend_from_slice(base);
  section.write_to(&mut out)?;
  Ok(out)
}

/// The exact length of `pad_module(base, name, padding, _)` given `base.len()`
/// and `name.len()`.
#[must_use]
pub fn padded_len(base_len: usize, name_len: usize, padding: usize) -> usize {
  let contents = leb128::encoded_len(name_len as u64) + name_len + padding;
  base_len + 1 + leb128::encoded_len(contents as u64) + contents
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn section_framing() {
    let mut out: Vec<u8> = vec![];
    write_section(&mut out, 7, &[1, 2, 3]).unwrap();
    assert_eq!(out, [7, 3, 1, 2, 3]);
  }

  #[test]
  fn types_are_shared() {
    let b = ModuleBuilder::new().const_i32("a", 1).const_i64("b", 2).const_i32("c", 3);
    assert_eq!(b.types(), (vec![ValType::I32, ValType::I64], vec![0, 1, 0]));
  }

  #[test]
  fn custom_section_len() {
    let sec = CustomSection::padding("padding", 200, 0xAA);
    let mut out: Vec<u8> = vec![];
    sec.write_to(&mut out).unwrap();
    assert_eq!(out.len(), sec.encoded_len());
    assert_eq!(&out[..4], [0, 0xD0, 0x01, 7]);
    assert_eq!(&out[4..11], b"padding");
    assert!(out[11..].iter().all(|&b| b == 0xAA));
  }

  #[test]
  fn negative_padding() {
    assert!(matches!(
      pad_module(&minimal_module(), "padding", -5, 0),
      Err(Error::InvalidArgument { value: -5, .. })
    ));
  }

  #[test]
  fn empty_module() {
    assert_eq!(ModuleBuilder::new().build(), b"\0asm\x01\0\0\0");
  }
}
