// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Abstract interface for big-endian byte output.

use std::convert::Infallible;

/// Trait for the integers that can be written as header fields.
///
/// This trait is sealed so a user cannot implement it. Currently, this trait
/// covers: [`u8`], [`i16`], [`u16`], [`i32`], and [`u32`].
pub trait Field: seal_field::Sealed {}

impl<T: seal_field::Sealed> Field for T {}

/// Storage-agnostic interface trait for the container output.
///
/// All multi-byte fields of the .dsp container are big-endian. [`MemSink`] is
/// the standard implementation that stores bytes to a `Vec` of [`u8`]s.
pub trait ByteSink: Sized {
    /// Error type that may happen while writing bytes to `ByteSink`.
    type Error: std::error::Error;

    /// Writes an integer in big-endian byte order.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use dspadpcm::bytesink::{ByteSink, MemSink};
    /// let mut sink = MemSink::new();
    ///
    /// sink.write(0x0102i16)?;
    /// sink.write(-2i32)?;
    /// assert_eq!(sink.as_slice(), &[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE]);
    /// # Ok(())}
    /// ```
    fn write<T: Field>(&mut self, val: T) -> Result<(), Self::Error>;

    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Writes `n` zero bytes.
    ///
    /// A default implementation using `write` is provided. An impl can
    /// override this for efficiency.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        for _i in 0..n {
            self.write(0u8)?;
        }
        Ok(())
    }

    /// Writes `bytes` followed by zeros so that exactly `n` bytes are written.
    ///
    /// If `bytes` is longer than `n`, it is truncated.
    ///
    /// # Errors
    ///
    /// It can emit errors describing backend issues.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn main() -> Result<(), std::convert::Infallible> {
    /// use dspadpcm::bytesink::{ByteSink, MemSink};
    /// let mut sink = MemSink::new();
    ///
    /// sink.write_padded(&[0xAB, 0xCD], 4)?;
    /// sink.write_padded(&[0x12, 0x34, 0x56], 1)?;
    /// assert_eq!(sink.as_slice(), &[0xAB, 0xCD, 0x00, 0x00, 0x12]);
    /// # Ok(())}
    /// ```
    #[inline]
    fn write_padded(&mut self, bytes: &[u8], n: usize) -> Result<(), Self::Error> {
        let copied = std::cmp::min(bytes.len(), n);
        self.write_bytes(&bytes[..copied])?;
        self.write_zeros(n - copied)
    }
}

/// `ByteSink` implementation based on [`Vec`] of [`u8`]s.
///
/// The internal buffer can directly be written to, e.g. [`std::io::Write`]
/// via [`write_all`] method.
///
/// [`write_all`]: std::io::Write::write_all
#[derive(Clone, Debug, Default)]
pub struct MemSink {
    storage: Vec<u8>,
}

impl MemSink {
    /// Creates new `MemSink` instance with the default capacity.
    pub const fn new() -> Self {
        Self { storage: vec![] }
    }

    /// Creates new `MemSink` instance with the specified capacity in bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if nothing is written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Clears the vector, removing all values.
    pub fn clear(&mut self) {
        self.storage.clear();
    }

    /// Consumes `self` and returns the written bytes.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.storage
    }

    /// Returns a reference to the internal bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }
}

impl ByteSink for MemSink {
    type Error = Infallible;

    #[inline]
    fn write<T: Field>(&mut self, val: T) -> Result<(), Self::Error> {
        self.storage.extend_from_slice(val.to_be_bytes().as_ref());
        Ok(())
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.storage.extend_from_slice(bytes);
        Ok(())
    }

    #[inline]
    fn write_zeros(&mut self, n: usize) -> Result<(), Self::Error> {
        self.storage.resize(self.storage.len() + n, 0u8);
        Ok(())
    }
}

mod seal_field {
    use num_traits::PrimInt;
    use num_traits::ToBytes;

    pub trait Sealed: ToBytes + PrimInt {}

    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_fields() -> Result<(), Infallible> {
        let mut sink = MemSink::new();
        sink.write(0x60u8)?;
        sink.write(0xBEEFu16)?;
        sink.write(-1i16)?;
        sink.write(0x0001_0203u32)?;
        assert_eq!(
            sink.as_slice(),
            &[0x60, 0xBE, 0xEF, 0xFF, 0xFF, 0x00, 0x01, 0x02, 0x03]
        );
        assert_eq!(sink.len(), 9);
        Ok(())
    }

    #[test]
    fn zeros_and_padding() -> Result<(), Infallible> {
        let mut sink = MemSink::with_capacity(16);
        sink.write_zeros(3)?;
        sink.write_padded(&[], 2)?;
        assert_eq!(sink.as_slice(), &[0u8; 5]);
        sink.clear();
        assert!(sink.is_empty());
        Ok(())
    }
}
