//! Process-global buffer size tunables.
//!
//! Four sizes guard how much the engine reads or writes per step: the
//! stream copy sizes used when moving bytes between streams, and the
//! decoder sizes used when draining codec output. Mobile targets default
//! to smaller buffers. Setters take effect for operations started after
//! the call; an in-flight operation keeps the value it sampled at start.
//!
//! ```rust
//! use lzarch::settings;
//!
//! let previous = settings::decoder_write_size();
//! settings::set_decoder_write_size(512 * 1024);
//! assert_eq!(settings::decoder_write_size(), 512 * 1024);
//! settings::set_decoder_write_size(previous);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(any(target_os = "ios", target_os = "android", target_os = "tvos", target_os = "watchos"))]
mod defaults {
    pub const STREAM_READ: usize = 1 << 16;
    pub const STREAM_WRITE: usize = 1 << 16;
    pub const DECODER_READ: usize = 1 << 16;
    pub const DECODER_WRITE: usize = 1 << 18;
}

#[cfg(not(any(
    target_os = "ios",
    target_os = "android",
    target_os = "tvos",
    target_os = "watchos"
)))]
mod defaults {
    pub const STREAM_READ: usize = 1 << 20;
    pub const STREAM_WRITE: usize = 1 << 20;
    pub const DECODER_READ: usize = 1 << 20;
    pub const DECODER_WRITE: usize = 1 << 22;
}

static STREAM_READ_SIZE: AtomicUsize = AtomicUsize::new(defaults::STREAM_READ);
static STREAM_WRITE_SIZE: AtomicUsize = AtomicUsize::new(defaults::STREAM_WRITE);
static DECODER_READ_SIZE: AtomicUsize = AtomicUsize::new(defaults::DECODER_READ);
static DECODER_WRITE_SIZE: AtomicUsize = AtomicUsize::new(defaults::DECODER_WRITE);

fn sanitize(size: usize) -> usize {
    size.max(1)
}

/// Returns the buffer size used when reading from streams.
pub fn stream_read_size() -> usize {
    STREAM_READ_SIZE.load(Ordering::Relaxed)
}

/// Sets the buffer size used when reading from streams.
///
/// Zero is clamped to one byte.
pub fn set_stream_read_size(size: usize) {
    STREAM_READ_SIZE.store(sanitize(size), Ordering::Relaxed);
}

/// Returns the buffer size used when writing to streams.
pub fn stream_write_size() -> usize {
    STREAM_WRITE_SIZE.load(Ordering::Relaxed)
}

/// Sets the buffer size used when writing to streams.
///
/// Zero is clamped to one byte.
pub fn set_stream_write_size(size: usize) {
    STREAM_WRITE_SIZE.store(sanitize(size), Ordering::Relaxed);
}

/// Returns the buffer size the decoder uses when reading packed data.
pub fn decoder_read_size() -> usize {
    DECODER_READ_SIZE.load(Ordering::Relaxed)
}

/// Sets the buffer size the decoder uses when reading packed data.
///
/// Zero is clamped to one byte.
pub fn set_decoder_read_size(size: usize) {
    DECODER_READ_SIZE.store(sanitize(size), Ordering::Relaxed);
}

/// Returns the buffer size the decoder uses when draining unpacked data.
pub fn decoder_write_size() -> usize {
    DECODER_WRITE_SIZE.load(Ordering::Relaxed)
}

/// Sets the buffer size the decoder uses when draining unpacked data.
///
/// Zero is clamped to one byte.
pub fn set_decoder_write_size(size: usize) {
    DECODER_WRITE_SIZE.store(sanitize(size), Ordering::Relaxed);
}
