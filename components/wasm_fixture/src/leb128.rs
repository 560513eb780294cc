//! Little-endian base 128 variable length integers.
//!
//! Each byte carries 7 payload bits, least significant group first. The high bit
//! is set iff more bytes follow. The writers here always produce the minimal
//! encoding, so `0` is the single byte `0x00` and no encoding ends in a redundant
//! `0x80 0x00` group.

use std::io::{self, Write};

use byteorder::WriteBytesExt;
use num::{BigInt, BigUint, Zero};

use crate::Error;

/// The continuation flag of a LEB128 byte.
pub const CONTINUE: u8 = 0x80;
/// The payload bits of a LEB128 byte.
pub const PAYLOAD: u8 = 0x7F;

/// The longest unsigned encoding of a `u64`.
pub const MAX_LEN_U64: usize = 10;

/// Write `value` as unsigned LEB128.
pub fn write_u64(w: &mut impl Write, mut value: u64) -> io::Result<()> {
  loop {
    #[allow(clippy::cast_possible_truncation)]
    let byte = (value as u8) & PAYLOAD;
    value >>= 7;
    if value == 0 { return w.write_u8(byte) }
    w.write_u8(byte | CONTINUE)?;
  }
}

/// Write `value` as signed LEB128. Only used for instruction immediates.
pub fn write_i64(w: &mut impl Write, mut value: i64) -> io::Result<()> {
  loop {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let byte = (value as u8) & PAYLOAD;
    value >>= 7;
    let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
    if done { return w.write_u8(byte) }
    w.write_u8(byte | CONTINUE)?;
  }
}

/// The unsigned LEB128 encoding of `value`.
#[must_use]
pub fn encode_u64(value: u64) -> Vec<u8> {
  let mut out = Vec::with_capacity(encoded_len(value));
  write_u64(&mut out, value).expect("writing to a Vec cannot fail");
  out
}

/// The number of bytes in the unsigned encoding of `value`: one per started group
/// of 7 significant bits, and at least one.
#[must_use]
pub fn encoded_len(value: u64) -> usize {
  let bits = u64::BITS - value.leading_zeros();
  bits.div_ceil(7).max(1) as usize
}

/// The unsigned LEB128 encoding of an arbitrarily large value.
#[must_use]
pub fn encode_big(value: &BigUint) -> Vec<u8> {
  if value.is_zero() { return vec![0] }
  let mut out = value.to_radix_le(128);
  let last = out.len() - 1;
  for b in &mut out[..last] { *b |= CONTINUE }
  out
}

/// The unsigned LEB128 encoding of `value`, which must not be negative.
pub fn encode_int(value: &BigInt) -> Result<Vec<u8>, Error> {
  match value.to_biguint() {
    Some(n) => Ok(encode_big(&n)),
    None => Err(Error::InvalidArgument {
      what: "LEB128 value",
      value: i128::try_from(value).unwrap_or(i128::MIN),
    }),
  }
}

/// The unsigned LEB128 encoding of `value`, which must not be negative.
pub fn encode_i64(value: i64) -> Result<Vec<u8>, Error> {
  match u64::try_from(value) {
    Ok(n) => Ok(encode_u64(n)),
    Err(_) => Err(Error::InvalidArgument { what: "LEB128 value", value: value.into() }),
  }
}

/// Errors from reading a LEB128 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leb128Error {
  /// The input ended before a byte without the continuation flag.
  Exhausted {
    /// Where the encoding started
    pos: usize,
  },
  /// The value does not fit in 64 bits.
  Overflow {
    /// Where the encoding started
    pos: usize,
  },
}

impl std::fmt::Display for Leb128Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Leb128Error::Exhausted { pos } => write!(f, "LEB128 value at byte {pos} is unterminated"),
      Leb128Error::Overflow { pos } => write!(f, "LEB128 value at byte {pos} exceeds 64 bits"),
    }
  }
}

impl std::error::Error for Leb128Error {}

/// Read an unsigned LEB128 value from the front of `buf`, returning the value and
/// the number of bytes consumed. `pos` is only used for error reporting.
pub fn read_u64(buf: &[u8], pos: usize) -> Result<(u64, usize), Leb128Error> {
  let mut value = 0_u64;
  for (i, &byte) in buf.iter().enumerate() {
    let shift = 7 * i;
    let bits = u64::from(byte & PAYLOAD);
    if shift >= 64 || (shift > 0 && bits >> (64 - shift) != 0) {
      return Err(Leb128Error::Overflow { pos })
    }
    value |= bits << shift;
    if byte & CONTINUE == 0 { return Ok((value, i + 1)) }
  }
  Err(Leb128Error::Exhausted { pos })
}

/// Read an unsigned LEB128 value of any size from the front of `buf`.
pub fn decode_big(buf: &[u8]) -> Result<(BigUint, usize), Leb128Error> {
  let end = buf.iter().position(|b| b & CONTINUE == 0).ok_or(Leb128Error::Exhausted { pos: 0 })?;
  let digits: Vec<u8> = buf[..=end].iter().map(|b| b & PAYLOAD).collect();
  let value = BigUint::from_radix_le(&digits, 128).ok_or(Leb128Error::Exhausted { pos: 0 })?;
  Ok((value, end + 1))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_encodings() {
    assert_eq!(encode_u64(0), [0x00]);
    assert_eq!(encode_u64(1), [0x01]);
    assert_eq!(encode_u64(127), [0x7F]);
    assert_eq!(encode_u64(128), [0x80, 0x01]);
    assert_eq!(encode_u64(300), [0xAC, 0x02]);
    assert_eq!(encode_u64(16384), [0x80, 0x80, 0x01]);
    assert_eq!(encode_u64((1 << 31) - 1), [0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
    assert_eq!(encode_u64(u64::MAX).len(), MAX_LEN_U64);
  }

  #[test]
  fn round_trip() {
    for n in [0, 1, 127, 128, 300, 16384, (1 << 31) - 1, 1_572_872, u64::MAX] {
      let enc = encode_u64(n);
      assert_eq!(enc.len(), encoded_len(n), "length of {n}");
      assert_eq!(read_u64(&enc, 0), Ok((n, enc.len())), "value {n}");
      // minimal: only the last byte lacks the continuation flag, and it is nonzero
      // unless the whole encoding is the single byte 0
      let (last, init) = enc.split_last().unwrap();
      assert!(init.iter().all(|b| b & CONTINUE != 0));
      assert!(*last != 0 || enc.len() == 1);
    }
  }

  #[test]
  fn big_matches_u64() {
    for n in [0, 1, 127, 128, 300, 16384, u64::MAX] {
      assert_eq!(encode_big(&BigUint::from(n)), encode_u64(n));
    }
    let huge = BigUint::from(u64::MAX) * BigUint::from(u64::MAX);
    let enc = encode_big(&huge);
    assert_eq!(enc.len(), 19);
    assert_eq!(decode_big(&enc), Ok((huge, 19)));
    assert_eq!(read_u64(&enc, 3), Err(Leb128Error::Overflow { pos: 3 }));
  }

  #[test]
  fn negative_is_rejected() {
    assert!(matches!(encode_i64(-1), Err(Error::InvalidArgument { value: -1, .. })));
    assert_eq!(encode_i64(300).unwrap(), [0xAC, 0x02]);
    assert!(matches!(encode_int(&BigInt::from(-7)), Err(Error::InvalidArgument { value: -7, .. })));
    assert_eq!(encode_int(&BigInt::from(128)).unwrap(), [0x80, 0x01]);
  }

  #[test]
  fn unterminated() {
    assert_eq!(read_u64(&[0x80, 0x80], 12), Err(Leb128Error::Exhausted { pos: 12 }));
    assert_eq!(read_u64(&[], 0), Err(Leb128Error::Exhausted { pos: 0 }));
    assert_eq!(decode_big(&[0xFF]), Err(Leb128Error::Exhausted { pos: 0 }));
  }

  #[test]
  fn signed() {
    let enc = |n| { let mut v = Vec::<u8>::new(); write_i64(&mut v, n).unwrap(); v };
    assert_eq!(enc(42), [0x2A]);
    assert_eq!(enc(0), [0x00]);
    assert_eq!(enc(-1), [0x7F]);
    assert_eq!(enc(64), [0xC0, 0x00]);
    assert_eq!(enc(-128), [0x80, 0x7F]);
  }
}
