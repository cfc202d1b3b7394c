//! Checksum computation utilities.
//!
//! CRC-32 (IEEE 802.3, the checksum stored for 7z items) and CRC-64-ECMA
//! incremental hashers, plus a verifying reader the decoder wraps around
//! codec output.
//!
//! ```rust
//! use lzarch::checksum::{Checksum, Crc32, Crc64};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), 0xEC4AC3D0);
//!
//! assert_ne!(Crc64::compute(b"Hello, World!"), 0);
//! ```

use std::io::{self, Read};

/// Common trait for incremental checksum computation.
pub trait Checksum: Default {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Returns the current checksum value.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// CRC-32 checksum calculator (IEEE 802.3 polynomial).
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn reset(&mut self) {
        self.hasher.reset();
    }
}

/// CRC-64 checksum calculator (ECMA-182 polynomial).
///
/// Not stored in the supported containers, but exposed for callers that
/// want a stronger integrity check over extracted content.
#[derive(Clone)]
pub struct Crc64 {
    hasher: crc64fast::Digest,
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc64")
            .field("current", &self.hasher.sum64())
            .finish()
    }
}

impl Checksum for Crc64 {
    type Output = u64;

    fn new() -> Self {
        Self {
            hasher: crc64fast::Digest::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.write(data);
    }

    fn finalize(&self) -> u64 {
        self.hasher.sum64()
    }

    fn reset(&mut self) {
        self.hasher = crc64fast::Digest::new();
    }
}

/// A reader wrapper that computes CRC-32 while reading.
pub struct Crc32Reader<R> {
    inner: R,
    crc: Crc32,
    bytes_read: u64,
}

impl<R> Crc32Reader<R> {
    /// Creates a new CRC-32 reader wrapping the given reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            bytes_read: 0,
        }
    }

    /// Returns the CRC-32 of the bytes read so far.
    pub fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    /// Returns the number of bytes read.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(Crc32::compute(b""), 0);
    }

    #[test]
    fn test_crc32_incremental_matches_oneshot() {
        let mut hasher = Crc32::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.finalize(), Crc32::compute(b"Hello, World!"));
    }

    #[test]
    fn test_crc32_reset() {
        let mut hasher = Crc32::new();
        hasher.update(b"garbage");
        hasher.reset();
        hasher.update(b"Hello, World!");
        assert_eq!(hasher.finalize(), 0xEC4AC3D0);
    }

    #[test]
    fn test_crc64_incremental_matches_oneshot() {
        let mut hasher = Crc64::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.finalize(), Crc64::compute(b"Hello, World!"));
    }

    #[test]
    fn test_crc64_empty() {
        assert_eq!(Crc64::compute(b""), 0);
    }

    #[test]
    fn test_crc32_reader() {
        let data = b"Hello, World!";
        let mut reader = Crc32Reader::new(Cursor::new(data));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(reader.crc(), 0xEC4AC3D0);
        assert_eq!(reader.bytes_read(), data.len() as u64);
        assert_eq!(out, data);
    }
}
