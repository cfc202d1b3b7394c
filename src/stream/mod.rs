//! Random-access byte sources and sinks.
//!
//! The engine moves bytes exclusively through [`InStream`] and
//! [`OutStream`] handles. A handle is a shared, mutex-guarded reference to
//! one concrete backing (file, memory, user callbacks, or a composition of
//! sub-streams); cloning a handle shares the backing. The codec crates
//! drive the handles through thin [`Read`]/[`Write`]/[`Seek`] adapters.
//!
//! All variants share one lifecycle: `open` before first use, `close`
//! after last use, `erase` refused while open.

mod input;
mod output;

pub use input::{InStream, StreamCallbacks};
pub use output::{OutMultiStream, OutStream, PartNameFormat};

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// Resolves a seek request against the current offset and total size.
///
/// Seeking outside `0..=size` is rejected.
pub(crate) fn resolve_seek(pos: SeekFrom, offset: u64, size: u64) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(value) => i128::from(value),
        SeekFrom::Current(delta) => i128::from(offset) + i128::from(delta),
        SeekFrom::End(delta) => i128::from(size) + i128::from(delta),
    };
    if target < 0 || target > i128::from(size) {
        return Err(Error::invalid_arguments(format!(
            "seek target {target} is outside of the stream (size {size})"
        )));
    }
    Ok(target as u64)
}

/// Policy applied when erasing the backing store of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum EraseMode {
    /// Delete the backing store only.
    #[default]
    None,
    /// Overwrite the content with zeros, then delete.
    Zero,
}

/// [`Read`] + [`Seek`] adapter over an [`InStream`] handle.
///
/// Each call locks the stream for its duration; clones share the handle
/// and therefore the read position.
#[derive(Clone)]
pub(crate) struct InStreamReader {
    stream: InStream,
}

impl InStreamReader {
    pub(crate) fn new(stream: InStream) -> Self {
        Self { stream }
    }
}

impl Read for InStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).map_err(crate::Error::into_io)
    }
}

impl Seek for InStreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream.seek(pos).map_err(crate::Error::into_io)
    }
}

/// [`Write`] + [`Seek`] adapter over an [`OutStream`] handle.
#[derive(Clone)]
pub(crate) struct OutStreamWriter {
    stream: OutStream,
}

impl OutStreamWriter {
    pub(crate) fn new(stream: OutStream) -> Self {
        Self { stream }
    }
}

impl Write for OutStreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf).map_err(crate::Error::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for OutStreamWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream.seek(pos).map_err(crate::Error::into_io)
    }
}
