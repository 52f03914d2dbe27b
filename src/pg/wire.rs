//! Bounds-checked cursor over a big-endian value buffer.
//!
//! Every read checks the remaining length first and fails with
//! `DecodeError::Truncated` instead of reading past the end.

use bytes::Buf;

use super::error::DecodeError;

/// Fixed-width scalar that can be read off the wire.
pub trait WireFixed: Sized + sealed::Sealed {
    /// Width in bytes.
    const WIDTH: usize;

    #[doc(hidden)]
    fn get(buf: &mut &[u8]) -> Self;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for bool {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

impl WireFixed for u8 {
    const WIDTH: usize = 1;
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_u8()
    }
}

impl WireFixed for bool {
    const WIDTH: usize = 1;
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_u8() != 0
    }
}

impl WireFixed for i16 {
    const WIDTH: usize = 2;
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_i16()
    }
}

impl WireFixed for i32 {
    const WIDTH: usize = 4;
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_i32()
    }
}

impl WireFixed for i64 {
    const WIDTH: usize = 8;
    fn get(buf: &mut &[u8]) -> Self {
        buf.get_i64()
    }
}

// Floats are the bit pattern of the same-width integer, not a numeric cast.
impl WireFixed for f32 {
    const WIDTH: usize = 4;
    fn get(buf: &mut &[u8]) -> Self {
        f32::from_bits(buf.get_u32())
    }
}

impl WireFixed for f64 {
    const WIDTH: usize = 8;
    fn get(buf: &mut &[u8]) -> Self {
        f64::from_bits(buf.get_u64())
    }
}

/// Forward-only reader over one column value.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.len - self.buf.len()
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Read one fixed-width big-endian value and advance past it.
    #[inline]
    pub fn read<T: WireFixed>(&mut self) -> Result<T, DecodeError> {
        self.ensure(T::WIDTH)?;
        Ok(T::get(&mut self.buf))
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.read::<i32>()
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.read::<i64>()
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }
}
