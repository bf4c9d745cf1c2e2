//! Primitive wire encoding: integers little-endian fixed-width, strings and
//! byte arrays length-prefixed UTF-8/raw, lists length-prefixed, options
//! tagged by a presence byte (§6 "Wire protocol").
//!
//! Empty and missing are kept distinct: `write_option` always writes a
//! presence byte even for an empty `Some("")`, so a decoder can tell
//! "absent" from "present but empty" (§4.1 edge cases).

use crate::error::CodecError;
use bytes::{BufMut, BytesMut};

#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(if v { 1 } else { 0 });
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.buf.put_slice(v);
    }

    pub fn write_str(&mut self, v: &str) {
        self.write_bytes(v.as_bytes());
    }

    pub fn write_option<T>(&mut self, v: &Option<T>, mut write_some: impl FnMut(&mut Self, &T)) {
        match v {
            Some(inner) => {
                self.write_bool(true);
                write_some(self, inner);
            }
            None => self.write_bool(false),
        }
    }

    pub fn write_list<T>(&mut self, items: &[T], mut write_item: impl FnMut(&mut Self, &T)) {
        self.write_u32(items.len() as u32);
        for item in items {
            write_item(self, item);
        }
    }
}

#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_le_bytes(arr))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let raw = self.read_bytes()?;
        String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_option<T>(&mut self, mut read_some: impl FnMut(&mut Self) -> Result<T, CodecError>) -> Result<Option<T>, CodecError> {
        if self.read_bool()? {
            Ok(Some(read_some(self)?))
        } else {
            Ok(None)
        }
    }

    pub fn read_list<T>(&mut self, mut read_item: impl FnMut(&mut Self) -> Result<T, CodecError>) -> Result<Vec<T>, CodecError> {
        let len = self.read_u32()? as usize;
        let mut items = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            items.push(read_item(self)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitives() {
        let mut enc = Encoder::new();
        enc.write_u8(7);
        enc.write_bool(true);
        enc.write_u64(u64::MAX);
        enc.write_i64(-42);
        enc.write_str("hello");
        enc.write_option(&Some(3u32), |e, v| e.write_u32(*v));
        enc.write_option(&None::<u32>, |e, v| e.write_u32(*v));
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_u8().unwrap(), 7);
        assert!(dec.read_bool().unwrap());
        assert_eq!(dec.read_u64().unwrap(), u64::MAX);
        assert_eq!(dec.read_i64().unwrap(), -42);
        assert_eq!(dec.read_str().unwrap(), "hello");
        assert_eq!(dec.read_option(|d| d.read_u32()).unwrap(), Some(3));
        assert_eq!(dec.read_option(|d| d.read_u32()).unwrap(), None);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn empty_string_distinct_from_missing_option() {
        let mut enc = Encoder::new();
        enc.write_option(&Some(String::new()), |e, v| e.write_str(v));
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let value = dec.read_option(|d| d.read_str()).unwrap();
        assert_eq!(value, Some(String::new()));
    }

    #[test]
    fn truncated_frame_reports_malformed() {
        let bytes = [0u8, 0, 0]; // claims a u32 but only 3 bytes follow
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.read_u32(), Err(CodecError::Truncated { .. })));
    }
}
