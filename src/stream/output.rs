//! Polymorphic random-access byte sinks.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::path::Path;
use crate::stream::EraseMode;
use crate::stream::input::erase_file;

/// The largest content size the engine will buffer in memory.
const MAX_MEMORY: u64 = isize::MAX as u64;

pub(crate) trait OutStreamImp: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn opened(&self) -> bool;
    fn erase(&mut self, mode: EraseMode) -> Result<bool>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn set_size(&mut self, size: u64) -> Result<()>;
    fn copy_content(&mut self) -> Result<Vec<u8>>;
    fn take_error(&mut self) -> Option<Error> {
        None
    }
}

/// A shared handle to a random-access byte sink.
///
/// Cloning the handle shares the backing. All methods are internally
/// synchronized.
#[derive(Clone)]
pub struct OutStream {
    imp: Arc<Mutex<dyn OutStreamImp>>,
}

impl OutStream {
    /// Creates a sink backed by a file, truncated when first opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the path is empty.
    pub fn with_path(path: Path) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::invalid_arguments(
                "can't create an out-stream without a path",
            ));
        }
        Ok(Self {
            imp: Arc::new(Mutex::new(FileOutStream { path, file: None })),
        })
    }

    /// Creates an in-memory sink that grows on write.
    pub fn with_memory() -> Self {
        Self {
            imp: Arc::new(Mutex::new(MemOutStream::default())),
        }
    }

    /// Creates a sink that discards all writes but reports them consumed.
    pub(crate) fn test_sink() -> Self {
        Self {
            imp: Arc::new(Mutex::new(TestOutStream { opened: false })),
        }
    }

    pub(crate) fn from_imp(imp: Arc<Mutex<dyn OutStreamImp>>) -> Self {
        Self { imp }
    }

    /// Opens the sink; writes and seeks are only valid while open.
    pub fn open(&self) -> Result<()> {
        self.imp.lock().unwrap().open()
    }

    /// Closes the sink, keeping the written content.
    pub fn close(&self) {
        self.imp.lock().unwrap().close();
    }

    /// Returns `true` while the sink is open.
    pub fn opened(&self) -> bool {
        self.imp.lock().unwrap().opened()
    }

    /// Erases the backing store; refused with `false` while open.
    pub fn erase(&self, mode: EraseMode) -> Result<bool> {
        self.imp.lock().unwrap().erase(mode)
    }

    /// Writes at the current offset; returns the number of bytes consumed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.imp.lock().unwrap().write(buf)
    }

    /// Moves the write offset; returns the new absolute position.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        self.imp.lock().unwrap().seek(pos)
    }

    /// Truncates or extends the content.
    pub fn set_size(&self, size: u64) -> Result<()> {
        self.imp.lock().unwrap().set_size(size)
    }

    /// Returns a copy of the full content of a closed sink.
    ///
    /// An open sink yields an empty buffer; gaps that were never written
    /// read as zeros.
    pub fn copy_content(&self) -> Result<Vec<u8>> {
        self.imp.lock().unwrap().copy_content()
    }

    /// Takes a stashed error raised inside a codec callback, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.imp.lock().unwrap().take_error()
    }

    pub(crate) fn writer(&self) -> crate::stream::OutStreamWriter {
        crate::stream::OutStreamWriter::new(self.clone())
    }
}

impl std::fmt::Debug for OutStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutStream")
            .field("opened", &self.opened())
            .finish_non_exhaustive()
    }
}

struct FileOutStream {
    path: Path,
    file: Option<File>,
}

impl OutStreamImp for FileOutStream {
    fn open(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = self.path.create_for_writing().map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "can't open out-stream for writing at '{}': {e}",
                    self.path
                )))
            })?;
            self.file = Some(file);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn opened(&self) -> bool {
        self.file.is_some()
    }

    fn erase(&mut self, mode: EraseMode) -> Result<bool> {
        if self.file.is_some() {
            return Ok(false);
        }
        erase_file(&self.path, mode)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.file.as_mut() {
            Some(file) => Ok(file.write(buf)?),
            None => Err(Error::invalid_arguments("the out-stream is not open")),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self.file.as_mut() {
            Some(file) => Ok(file.seek(pos)?),
            None => Err(Error::invalid_arguments("the out-stream is not open")),
        }
    }

    fn set_size(&mut self, _size: u64) -> Result<()> {
        Ok(())
    }

    fn copy_content(&mut self) -> Result<Vec<u8>> {
        if self.file.is_some() {
            return Ok(Vec::new());
        }
        let mut file = self.path.open_for_reading()?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(content)
    }
}

#[derive(Default)]
struct MemOutStream {
    bytes: Vec<u8>,
    offset: u64,
    opened: bool,
    stash: Option<Error>,
}

impl MemOutStream {
    fn grow_to(&mut self, size: u64) -> Result<()> {
        if size > MAX_MEMORY {
            let error = Error::NotEnoughMemory(format!(
                "content size {size} is greater than supported by the platform ({MAX_MEMORY})"
            ));
            self.bytes.clear();
            self.offset = 0;
            self.opened = false;
            self.stash = Some(Error::NotEnoughMemory(error.to_string()));
            return Err(error);
        }
        self.bytes.resize(size as usize, 0);
        Ok(())
    }
}

impl OutStreamImp for MemOutStream {
    fn open(&mut self) -> Result<()> {
        if !self.opened {
            self.offset = 0;
            self.opened = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.offset = 0;
        self.opened = false;
    }

    fn opened(&self) -> bool {
        self.opened
    }

    fn erase(&mut self, mode: EraseMode) -> Result<bool> {
        if self.opened {
            return Ok(false);
        }
        if mode == EraseMode::Zero {
            self.bytes.fill(0);
        }
        self.bytes.clear();
        self.offset = 0;
        Ok(true)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        let end = self.offset + buf.len() as u64;
        if end > self.bytes.len() as u64 {
            self.grow_to(end)?;
        }
        let start = self.offset as usize;
        self.bytes[start..start + buf.len()].copy_from_slice(buf);
        self.offset = end;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        self.offset = super::resolve_seek(pos, self.offset, self.bytes.len() as u64)?;
        Ok(self.offset)
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        self.grow_to(size)?;
        self.bytes.truncate(size as usize);
        Ok(())
    }

    fn copy_content(&mut self) -> Result<Vec<u8>> {
        if self.opened {
            return Ok(Vec::new());
        }
        Ok(self.bytes.clone())
    }

    fn take_error(&mut self) -> Option<Error> {
        self.stash.take()
    }
}

struct TestOutStream {
    opened: bool,
}

impl OutStreamImp for TestOutStream {
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn opened(&self) -> bool {
        self.opened
    }

    fn erase(&mut self, _mode: EraseMode) -> Result<bool> {
        // Nothing to erase.
        Ok(!self.opened)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        Ok(buf.len())
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Ok(0)
    }

    fn set_size(&mut self, _size: u64) -> Result<()> {
        Ok(())
    }

    fn copy_content(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Naming scheme for the parts of a file-backed multi-volume sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum PartNameFormat {
    /// `<name>.<ext>.NNN`, 1-based, zero-padded to three digits, at most
    /// 999 parts.
    #[default]
    NameExt00x,
}

enum PartBacking {
    Files {
        dir: Path,
        name: String,
        extension: String,
        format: PartNameFormat,
    },
    Memory,
}

struct MultiOutStream {
    backing: PartBacking,
    part_size: u64,
    parts: Vec<OutStream>,
    size: u64,
    offset: u64,
    opened: bool,
    stash: Option<Error>,
}

impl MultiOutStream {
    fn add_part(&mut self) -> Result<()> {
        let part = match &self.backing {
            PartBacking::Files {
                dir,
                name,
                extension,
                format: PartNameFormat::NameExt00x,
            } => {
                let file_name = format!("{}.{}.{:03}", name, extension, self.parts.len() + 1);
                log::trace!("allocating part file {file_name}");
                OutStream::with_path(dir.appending(&file_name))?
            }
            PartBacking::Memory => OutStream::with_memory(),
        };
        self.parts.push(part);
        Ok(())
    }

    fn check_parts_count(&self, count: u64) -> Result<()> {
        match &self.backing {
            PartBacking::Files {
                format: PartNameFormat::NameExt00x,
                ..
            } if count > 999 => Err(Error::invalid_arguments(
                "can't create more than 999 file sub-streams with the 00x name format",
            )),
            _ => Ok(()),
        }
    }

    fn resize_parts(&mut self, size: u64) -> Result<()> {
        let mut wanted = size / self.part_size;
        if wanted * self.part_size < size {
            wanted += 1;
        }
        self.check_parts_count(wanted)?;
        while (self.parts.len() as u64) > wanted {
            let part = self.parts.pop().unwrap();
            part.close();
            part.erase(EraseMode::None)?;
        }
        while (self.parts.len() as u64) < wanted {
            self.add_part()?;
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        for part in &self.parts {
            part.close();
            let _ = part.erase(EraseMode::None);
        }
        self.parts.clear();
        self.size = 0;
        self.offset = 0;
        self.opened = false;
        self.stash = Some(Error::Internal(error.to_string()));
        error
    }
}

impl OutStreamImp for MultiOutStream {
    fn open(&mut self) -> Result<()> {
        if !self.opened {
            self.offset = 0;
            self.opened = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.opened {
            for part in &self.parts {
                part.close();
            }
            self.offset = 0;
            self.opened = false;
        }
    }

    fn opened(&self) -> bool {
        self.opened
    }

    fn erase(&mut self, mode: EraseMode) -> Result<bool> {
        if self.opened {
            return Ok(false);
        }
        for part in &self.parts {
            if !part.erase(mode)? {
                return Ok(false);
            }
        }
        self.parts.clear();
        self.size = 0;
        self.offset = 0;
        if let PartBacking::Files { dir, .. } = &self.backing {
            dir.remove()?;
        }
        Ok(true)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let end = self.offset + buf.len() as u64;
        if self.size < end {
            self.set_size(end)?;
        }
        let mut remaining = buf;
        while !remaining.is_empty() {
            let index = (self.offset / self.part_size) as usize;
            let part = match self.parts.get(index) {
                Some(part) => part.clone(),
                None => {
                    return Err(self.fail(Error::internal(format!(
                        "part {index} is missing while writing at offset {}",
                        self.offset
                    ))));
                }
            };
            if !part.opened() {
                if let Err(e) = part.open() {
                    return Err(self.fail(e));
                }
            }
            let within = self.offset - index as u64 * self.part_size;
            let writable = (self.part_size - within) as usize;
            let step = remaining.len().min(writable);
            let outcome = part
                .seek(SeekFrom::Start(within))
                .and_then(|_| part.write(&remaining[..step]));
            match outcome {
                Ok(n) if n == step => {}
                Ok(n) => {
                    return Err(self.fail(Error::internal(format!(
                        "part {index} consumed {n} of {step} bytes"
                    ))));
                }
                Err(e) => return Err(self.fail(e)),
            }
            remaining = &remaining[step..];
            self.offset += step as u64;
        }
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        self.offset = super::resolve_seek(pos, self.offset, self.size)?;
        Ok(self.offset)
    }

    fn set_size(&mut self, size: u64) -> Result<()> {
        if !self.opened {
            return Err(Error::invalid_arguments("the out-stream is not open"));
        }
        if let Err(e) = self.resize_parts(size) {
            return Err(self.fail(e));
        }
        self.size = size;
        Ok(())
    }

    fn copy_content(&mut self) -> Result<Vec<u8>> {
        if self.opened || self.size == 0 {
            return Ok(Vec::new());
        }
        if self.size > MAX_MEMORY {
            return Err(Error::NotEnoughMemory(format!(
                "content size {} is greater than supported by the platform ({MAX_MEMORY})",
                self.size
            )));
        }
        let mut combined = Vec::with_capacity(self.size as usize);
        for part in &self.parts {
            let content = part.copy_content()?;
            if combined.len() as u64 + content.len() as u64 > self.size {
                return Err(Error::internal(
                    "the combined part content is greater than the stream size",
                ));
            }
            combined.extend_from_slice(&content);
        }
        Ok(combined)
    }

    fn take_error(&mut self) -> Option<Error> {
        self.stash.take()
    }
}

/// A shared handle to a sink that partitions content into fixed-size parts.
///
/// Writing at offset `O` targets part `O / part_size`; every part except
/// the last has exactly `part_size` bytes. Parts are created lazily as
/// writes cross part boundaries.
#[derive(Clone)]
pub struct OutMultiStream {
    imp: Arc<Mutex<MultiOutStream>>,
}

impl OutMultiStream {
    /// Creates a file-backed multi-volume sink.
    ///
    /// The directory is created when missing. Part files are named
    /// `<part_name>.<part_extension>.NNN` per `format`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the directory path is
    /// empty, the path exists but is not a writable directory, or the part
    /// size is zero.
    pub fn with_directory(
        dir: Path,
        part_name: &str,
        part_extension: &str,
        format: PartNameFormat,
        part_size: usize,
    ) -> Result<Self> {
        if dir.is_empty() {
            return Err(Error::invalid_arguments(
                "can't create an out-stream with an empty directory path",
            ));
        }
        Self::check_part_size(part_size)?;
        match dir.exists() {
            None => dir.create_dir(true)?,
            Some(true) => {
                if !dir.writable() {
                    return Err(Error::invalid_arguments(format!(
                        "the directory '{dir}' has no write permission"
                    )));
                }
            }
            Some(false) => {
                return Err(Error::invalid_arguments(format!(
                    "'{dir}' is not a directory"
                )));
            }
        }
        Ok(Self::from_backing(
            PartBacking::Files {
                dir,
                name: part_name.to_string(),
                extension: part_extension.to_string(),
                format,
            },
            part_size,
        ))
    }

    /// Creates a memory-backed multi-volume sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the part size is zero.
    pub fn with_memory(part_size: usize) -> Result<Self> {
        Self::check_part_size(part_size)?;
        Ok(Self::from_backing(PartBacking::Memory, part_size))
    }

    fn check_part_size(part_size: usize) -> Result<()> {
        if part_size == 0 {
            Err(Error::invalid_arguments("the part size is zero"))
        } else {
            Ok(())
        }
    }

    fn from_backing(backing: PartBacking, part_size: usize) -> Self {
        Self {
            imp: Arc::new(Mutex::new(MultiOutStream {
                backing,
                part_size: part_size as u64,
                parts: Vec::new(),
                size: 0,
                offset: 0,
                opened: false,
                stash: None,
            })),
        }
    }

    /// Returns a plain [`OutStream`] handle sharing this sink.
    pub fn as_out_stream(&self) -> OutStream {
        OutStream::from_imp(self.imp.clone() as Arc<Mutex<dyn OutStreamImp>>)
    }

    /// Returns the fixed part size in bytes.
    pub fn part_size(&self) -> usize {
        self.imp.lock().unwrap().part_size as usize
    }

    /// Returns the part streams of a closed sink; empty while open.
    pub fn streams(&self) -> Vec<OutStream> {
        let imp = self.imp.lock().unwrap();
        if imp.opened {
            Vec::new()
        } else {
            imp.parts.clone()
        }
    }

    /// Opens the sink. See [`OutStream::open`].
    pub fn open(&self) -> Result<()> {
        self.as_out_stream().open()
    }

    /// Closes the sink. See [`OutStream::close`].
    pub fn close(&self) {
        self.as_out_stream().close();
    }

    /// Returns `true` while the sink is open.
    pub fn opened(&self) -> bool {
        self.as_out_stream().opened()
    }

    /// Erases all parts, then removes the directory for file backings.
    pub fn erase(&self, mode: EraseMode) -> Result<bool> {
        self.as_out_stream().erase(mode)
    }

    /// Returns the concatenation of all part contents of a closed sink.
    pub fn copy_content(&self) -> Result<Vec<u8>> {
        self.as_out_stream().copy_content()
    }
}

impl std::fmt::Debug for OutMultiStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let imp = self.imp.lock().unwrap();
        f.debug_struct("OutMultiStream")
            .field("opened", &imp.opened)
            .field("part_size", &imp.part_size)
            .field("parts", &imp.parts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_write_and_copy() {
        let stream = OutStream::with_memory();
        stream.open().unwrap();
        stream.write(b"hello").unwrap();
        assert!(stream.copy_content().unwrap().is_empty());
        stream.close();
        assert_eq!(stream.copy_content().unwrap(), b"hello");
    }

    #[test]
    fn test_memory_gaps_read_as_zeros() {
        let stream = OutStream::with_memory();
        stream.open().unwrap();
        stream.set_size(4).unwrap();
        stream.seek(SeekFrom::Start(4)).unwrap();
        stream.write(b"tail").unwrap();
        stream.close();
        assert_eq!(stream.copy_content().unwrap(), b"\0\0\0\0tail");
    }

    #[test]
    fn test_memory_seek_and_overwrite() {
        let stream = OutStream::with_memory();
        stream.open().unwrap();
        stream.write(b"abcdef").unwrap();
        stream.seek(SeekFrom::Start(2)).unwrap();
        stream.write(b"XY").unwrap();
        stream.close();
        assert_eq!(stream.copy_content().unwrap(), b"abXYef");
    }

    #[test]
    fn test_memory_erase() {
        let stream = OutStream::with_memory();
        stream.open().unwrap();
        stream.write(b"secret").unwrap();
        assert!(!stream.erase(EraseMode::Zero).unwrap());
        stream.close();
        assert!(stream.erase(EraseMode::Zero).unwrap());
        assert!(stream.copy_content().unwrap().is_empty());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Path::new(&dir.path().to_string_lossy()).appending("out.bin");
        let stream = OutStream::with_path(path.clone()).unwrap();
        stream.open().unwrap();
        stream.write(b"file content").unwrap();
        stream.close();
        assert_eq!(stream.copy_content().unwrap(), b"file content");
        assert!(stream.erase(EraseMode::Zero).unwrap());
        assert!(path.exists().is_none());
    }

    #[test]
    fn test_file_rejects_empty_path() {
        assert!(OutStream::with_path(Path::default()).is_err());
    }

    #[test]
    fn test_test_sink_consumes_everything() {
        let stream = OutStream::test_sink();
        stream.open().unwrap();
        assert_eq!(stream.write(&[0u8; 4096]).unwrap(), 4096);
        stream.close();
        assert!(stream.copy_content().unwrap().is_empty());
        assert!(stream.erase(EraseMode::None).unwrap());
    }

    #[test]
    fn test_multi_zero_part_size_rejected() {
        assert!(OutMultiStream::with_memory(0).is_err());
    }

    #[test]
    fn test_multi_memory_part_sizing() {
        let multi = OutMultiStream::with_memory(10).unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        let payload: Vec<u8> = (0..35u8).collect();
        stream.write(&payload).unwrap();
        stream.close();

        let parts = multi.streams();
        assert_eq!(parts.len(), 4);
        let sizes: Vec<usize> = parts
            .iter()
            .map(|p| p.copy_content().unwrap().len())
            .collect();
        assert_eq!(sizes, [10, 10, 10, 5]);
        assert_eq!(multi.copy_content().unwrap(), payload);
    }

    #[test]
    fn test_multi_exact_multiple_of_part_size() {
        let multi = OutMultiStream::with_memory(8).unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        stream.write(&[7u8; 16]).unwrap();
        stream.close();
        let sizes: Vec<usize> = multi
            .streams()
            .iter()
            .map(|p| p.copy_content().unwrap().len())
            .collect();
        assert_eq!(sizes, [8, 8]);
    }

    #[test]
    fn test_multi_write_spanning_seek_back() {
        let multi = OutMultiStream::with_memory(4).unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        stream.write(b"01234567").unwrap();
        stream.seek(SeekFrom::Start(2)).unwrap();
        stream.write(b"ABCD").unwrap();
        stream.close();
        assert_eq!(multi.copy_content().unwrap(), b"01ABCD67");
    }

    #[test]
    fn test_multi_set_size_shrinks_parts() {
        let multi = OutMultiStream::with_memory(4).unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        stream.write(&[1u8; 12]).unwrap();
        stream.set_size(5).unwrap();
        stream.close();
        assert_eq!(multi.streams().len(), 2);
    }

    #[test]
    fn test_multi_files_naming_and_erase() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::new(&dir.path().to_string_lossy()).appending("vols");
        let multi = OutMultiStream::with_directory(
            root.clone(),
            "archive",
            "7z",
            PartNameFormat::NameExt00x,
            4,
        )
        .unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        stream.write(b"0123456789").unwrap();
        stream.close();

        assert_eq!(root.appending("archive.7z.001").stat().unwrap().size, 4);
        assert_eq!(root.appending("archive.7z.002").stat().unwrap().size, 4);
        assert_eq!(root.appending("archive.7z.003").stat().unwrap().size, 2);
        assert_eq!(multi.copy_content().unwrap(), b"0123456789");

        assert!(multi.erase(EraseMode::None).unwrap());
        assert!(root.exists().is_none());
    }

    #[test]
    fn test_multi_files_999_part_cap() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::new(&dir.path().to_string_lossy()).appending("caps");
        let multi =
            OutMultiStream::with_directory(root, "a", "bin", PartNameFormat::NameExt00x, 1)
                .unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        stream.set_size(999).unwrap();
        let err = stream.set_size(1000).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert!(stream.take_error().is_some());
    }

    #[test]
    fn test_multi_memory_unbounded_parts() {
        let multi = OutMultiStream::with_memory(1).unwrap();
        let stream = multi.as_out_stream();
        stream.open().unwrap();
        stream.set_size(1000).unwrap();
        stream.close();
        assert_eq!(multi.streams().len(), 1000);
    }

    #[test]
    fn test_multi_streams_empty_while_open() {
        let multi = OutMultiStream::with_memory(4).unwrap();
        multi.open().unwrap();
        multi.as_out_stream().write(b"xyz").unwrap();
        assert!(multi.streams().is_empty());
        multi.close();
        assert_eq!(multi.streams().len(), 1);
    }
}
