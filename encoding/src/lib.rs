// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Canonical byte encoding. Digest stability is consensus-critical, so the
//! wire codec is hand rolled: fixed-width little-endian integers, varuint
//! lengths and tags, and deterministic map ordering (callers encode
//! `BTreeMap`s). Nothing here allocates more than the output buffer.

mod de;
mod ser;

pub use de::deserialize_canonical;
pub use ser::serialize_canonical;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("Varint longer than 5 bytes")]
    VarintOverflow,
    #[error("Invalid encoding: {0}")]
    Invalid(String),
}

/// Types with a canonical byte representation.
pub trait Encode {
    fn encode(&self, w: &mut ByteWriter);
}

/// Types decodable from the canonical representation.
pub trait Decode: Sized {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, Error>;
}

pub fn to_vec<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut w = ByteWriter::default();
    value.encode(&mut w);
    w.into_bytes()
}

pub fn from_slice<T: Decode>(bytes: &[u8]) -> Result<T, Error> {
    let mut r = ByteReader::new(bytes);
    let value = T::decode(&mut r)?;
    if !r.is_empty() {
        return Err(Error::Invalid("trailing bytes".into()));
    }
    Ok(value)
}

#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn write_u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn write_u64(&mut self, v: u64) {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write_u64(v as u64);
    }

    pub fn write_u128(&mut self, v: u128) {
        let mut b = [0u8; 16];
        LittleEndian::write_u128(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    /// LEB128-style unsigned varint, bounded to 32 bits.
    pub fn write_varuint(&mut self, mut v: u32) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varuint(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }
}

pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof(self.pos));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_u128(&mut self) -> Result<u128, Error> {
        Ok(LittleEndian::read_u128(self.take(16)?))
    }

    pub fn read_varuint(&mut self) -> Result<u32, Error> {
        let mut v: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            v |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(v);
            }
        }
        Err(Error::VarintOverflow)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let len = self.read_varuint()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], Error> {
        self.take(n)
    }

    pub fn read_str(&mut self) -> Result<String, Error> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| Error::Invalid(format!("non-utf8 string: {e}")))
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Invalid(format!("bad bool byte {other}"))),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: &mut ByteWriter) {
        w.write_varuint(self.len() as u32);
        for item in self {
            item.encode(w);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, Error> {
        let len = r.read_varuint()? as usize;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(T::decode(r)?);
        }
        Ok(out)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, w: &mut ByteWriter) {
        match self {
            None => w.write_bool(false),
            Some(v) => {
                w.write_bool(true);
                v.encode(w);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, Error> {
        if r.read_bool()? {
            Ok(Some(T::decode(r)?))
        } else {
            Ok(None)
        }
    }
}

impl Encode for String {
    fn encode(&self, w: &mut ByteWriter) {
        w.write_str(self);
    }
}

impl Decode for String {
    fn decode(r: &mut ByteReader<'_>) -> Result<Self, Error> {
        r.read_str()
    }
}

macro_rules! int_codec {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Encode for $ty {
            fn encode(&self, w: &mut ByteWriter) {
                w.$write(*self);
            }
        }
        impl Decode for $ty {
            fn decode(r: &mut ByteReader<'_>) -> Result<Self, Error> {
                r.$read()
            }
        }
    };
}

int_codec!(u8, write_u8, read_u8);
int_codec!(u16, write_u16, read_u16);
int_codec!(u32, write_u32, read_u32);
int_codec!(u64, write_u64, read_u64);
int_codec!(i64, write_i64, read_i64);
int_codec!(u128, write_u128, read_u128);
int_codec!(bool, write_bool, read_bool);

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn varint_boundaries() {
        for v in [0u32, 1, 127, 128, 16_383, 16_384, u32::MAX] {
            let mut w = ByteWriter::default();
            w.write_varuint(v);
            let bytes = w.into_bytes();
            let mut r = ByteReader::new(&bytes);
            assert_eq!(r.read_varuint().unwrap(), v);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn truncated_input_errors() {
        let mut w = ByteWriter::default();
        w.write_u64(42);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes[..5]);
        assert!(matches!(r.read_u64(), Err(Error::UnexpectedEof(_))));
    }

    #[quickcheck]
    fn vec_of_u64_round_trips(v: Vec<u64>) -> bool {
        from_slice::<Vec<u64>>(&to_vec(&v)) == Ok(v)
    }

    #[quickcheck]
    fn strings_round_trip(s: String) -> bool {
        from_slice::<String>(&to_vec(&s)) == Ok(s)
    }
}
