//! Canonical binary layout: little-endian fixed-width integers, length-prefixed
//! variable fields (a Bitcoin-style `VarInt`/`VarBytes` scheme). This is the format
//! hex payloads move over the RPC boundary in (`sendrawtransaction`, `submitblock`)
//! and the basis of a transaction's signable hash (the encoding of every field
//! except `programs`).

use std::fmt;

pub type EncodeResult<T> = Result<T, EncodeError>;

#[derive(Debug)]
pub enum EncodeError {
    UnexpectedEof,
    Malformed(&'static str),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::UnexpectedEof => write!(f, "unexpected end of input"),
            EncodeError::Malformed(what) => write!(f, "malformed encoding: {}", what),
        }
    }
}

impl std::error::Error for EncodeError {}

pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);
}

pub trait Decode: Sized {
    fn decode(cur: &mut Cursor) -> EncodeResult<Self>;
}

/// A read-only cursor over an encoded byte slice.
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> EncodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(EncodeError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> EncodeResult<u8> {
        Ok(self.take(1)?[0])
    }
}

pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn read_u16(cur: &mut Cursor) -> EncodeResult<u16> {
    Ok(u16::from_le_bytes(cur.take(2)?.try_into().unwrap()))
}

pub fn read_u32(cur: &mut Cursor) -> EncodeResult<u32> {
    Ok(u32::from_le_bytes(cur.take(4)?.try_into().unwrap()))
}

pub fn read_u64(cur: &mut Cursor) -> EncodeResult<u64> {
    Ok(u64::from_le_bytes(cur.take(8)?.try_into().unwrap()))
}

pub fn read_i64(cur: &mut Cursor) -> EncodeResult<i64> {
    Ok(i64::from_le_bytes(cur.take(8)?.try_into().unwrap()))
}

/// CompactSize-style variable-length integer: single byte below `0xfd`, then
/// widening marker bytes for larger values.
pub fn write_var_int(out: &mut Vec<u8>, v: u64) {
    if v < 0xfd {
        out.push(v as u8);
    } else if v <= 0xffff {
        out.push(0xfd);
        write_u16(out, v as u16);
    } else if v <= 0xffff_ffff {
        out.push(0xfe);
        write_u32(out, v as u32);
    } else {
        out.push(0xff);
        write_u64(out, v);
    }
}

pub fn read_var_int(cur: &mut Cursor) -> EncodeResult<u64> {
    let marker = cur.u8()?;
    match marker {
        0xfd => Ok(read_u16(cur)? as u64),
        0xfe => Ok(read_u32(cur)? as u64),
        0xff => read_u64(cur),
        n => Ok(n as u64),
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_var_int(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Cap on a single length-prefixed field, guarding decode against a corrupt or
/// adversarial length claim far exceeding the remaining buffer.
const MAX_VAR_BYTES: u64 = 32 * 1024 * 1024;

pub fn read_var_bytes(cur: &mut Cursor) -> EncodeResult<Vec<u8>> {
    let len = read_var_int(cur)?;
    if len > MAX_VAR_BYTES {
        return Err(EncodeError::Malformed("var-bytes length too large"));
    }
    Ok(cur.take(len as usize)?.to_vec())
}

pub fn encode_vec<T: Encode>(items: &[T], out: &mut Vec<u8>) {
    write_var_int(out, items.len() as u64);
    for item in items {
        item.encode(out);
    }
}

const MAX_VEC_ITEMS: u64 = 1_000_000;

pub fn decode_vec<T: Decode>(cur: &mut Cursor) -> EncodeResult<Vec<T>> {
    let n = read_var_int(cur)?;
    if n > MAX_VEC_ITEMS {
        return Err(EncodeError::Malformed("item count too large"));
    }
    let mut out = Vec::with_capacity(n.min(1024) as usize);
    for _ in 0..n {
        out.push(T::decode(cur)?);
    }
    Ok(out)
}
