//! Polymorphic random-access byte sources.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::path::Path;
use crate::settings;
use crate::stream::{EraseMode, resolve_seek};

trait InStreamImp: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn opened(&self) -> bool;
    fn erase(&mut self, mode: EraseMode) -> Result<bool>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// A shared handle to a random-access byte source.
///
/// Cloning the handle shares the backing; the backing is released when the
/// last handle goes away. All methods are internally synchronized.
#[derive(Clone)]
pub struct InStream {
    imp: Arc<Mutex<dyn InStreamImp>>,
}

impl InStream {
    /// Creates a stream backed by a file, opened lazily in binary read mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the path is empty.
    pub fn with_path(path: Path) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::invalid_arguments(
                "can't create an in-stream without a path",
            ));
        }
        Ok(Self {
            imp: Arc::new(Mutex::new(FileInStream { path, file: None })),
        })
    }

    /// Creates a stream over owned bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the buffer is empty.
    pub fn with_memory(bytes: Vec<u8>) -> Result<Self> {
        Self::memory(Cow::Owned(bytes))
    }

    /// Creates a stream borrowing static bytes, releasing nothing on drop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the buffer is empty.
    pub fn with_static(bytes: &'static [u8]) -> Result<Self> {
        Self::memory(Cow::Borrowed(bytes))
    }

    fn memory(bytes: Cow<'static, [u8]>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::invalid_arguments(
                "can't create an in-stream without memory",
            ));
        }
        Ok(Self {
            imp: Arc::new(Mutex::new(MemInStream {
                bytes,
                offset: 0,
                opened: false,
            })),
        })
    }

    /// Creates a stream driven by user callbacks.
    ///
    /// Resources captured by the closures are released exactly once, when
    /// the last handle goes away.
    pub fn with_callbacks(callbacks: StreamCallbacks) -> Self {
        Self {
            imp: Arc::new(Mutex::new(CallbackInStream {
                callbacks,
                opened: false,
            })),
        }
    }

    /// Creates a stream concatenating the given sub-streams.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when `streams` is empty.
    pub fn multi(streams: Vec<InStream>) -> Result<Self> {
        if streams.is_empty() {
            return Err(Error::invalid_arguments(
                "can't create a multi in-stream without sub-streams",
            ));
        }
        Ok(Self {
            imp: Arc::new(Mutex::new(MultiInStream {
                children: streams,
                sizes: Vec::new(),
                offset: 0,
                opened: false,
            })),
        })
    }

    /// Opens the stream; reads and seeks are only valid while open.
    pub fn open(&self) -> Result<()> {
        self.imp.lock().unwrap().open()
    }

    /// Closes the stream.
    pub fn close(&self) {
        self.imp.lock().unwrap().close();
    }

    /// Returns `true` while the stream is open.
    pub fn opened(&self) -> bool {
        self.imp.lock().unwrap().opened()
    }

    /// Erases the backing store.
    ///
    /// Returns `false` without touching anything when the stream is open.
    /// [`EraseMode::Zero`] overwrites content with zeros before deletion
    /// where the backing supports it. A multi stream erases every child
    /// and succeeds only if all of them did.
    pub fn erase(&self, mode: EraseMode) -> Result<bool> {
        self.imp.lock().unwrap().erase(mode)
    }

    /// Reads up to `buf.len()` bytes at the current offset.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.imp.lock().unwrap().read(buf)
    }

    /// Moves the read offset; returns the new absolute position.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        self.imp.lock().unwrap().seek(pos)
    }

    /// The backing file path, for file-backed streams.
    pub fn path(&self) -> Option<Path> {
        self.imp.lock().unwrap().path().cloned()
    }

    pub(crate) fn reader(&self) -> crate::stream::InStreamReader {
        crate::stream::InStreamReader::new(self.clone())
    }

    /// Measures the stream length by seeking to the end, then rewinds.
    pub(crate) fn measure(&self) -> Result<u64> {
        let size = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(0))?;
        Ok(size)
    }
}

impl std::fmt::Debug for InStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InStream")
            .field("opened", &self.opened())
            .finish_non_exhaustive()
    }
}

/// Overwrites a file's content with zeros, in write-buffer sized chunks.
fn zero_fill(path: &Path) -> Result<()> {
    let len = path.stat()?.size;
    let mut file = path.open_for_updating()?;
    let chunk = vec![0u8; settings::stream_write_size().min(len.max(1) as usize)];
    let mut remaining = len;
    while remaining > 0 {
        let step = chunk.len().min(remaining as usize);
        file.write_all(&chunk[..step])?;
        remaining -= step as u64;
    }
    file.sync_all()?;
    Ok(())
}

pub(crate) fn erase_file(path: &Path, mode: EraseMode) -> Result<bool> {
    match path.exists() {
        None => Ok(true),
        Some(is_dir) => {
            if !is_dir && mode == EraseMode::Zero {
                zero_fill(path)?;
            }
            path.remove()?;
            Ok(true)
        }
    }
}

struct FileInStream {
    path: Path,
    file: Option<File>,
}

impl InStreamImp for FileInStream {
    fn open(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = self.path.open_for_reading().map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "can't open in-stream for reading at '{}': {e}",
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

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.file.as_mut() {
            Some(file) => Ok(file.read(buf)?),
            None => Err(Error::invalid_arguments("the in-stream is not open")),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self.file.as_mut() {
            Some(file) => Ok(file.seek(pos)?),
            None => Err(Error::invalid_arguments("the in-stream is not open")),
        }
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

struct MemInStream {
    bytes: Cow<'static, [u8]>,
    offset: u64,
    opened: bool,
}

impl InStreamImp for MemInStream {
    fn open(&mut self) -> Result<()> {
        self.offset = 0;
        self.opened = true;
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
            if let Cow::Owned(bytes) = &mut self.bytes {
                bytes.fill(0);
            }
        }
        Ok(true)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.opened {
            return Err(Error::invalid_arguments("the in-stream is not open"));
        }
        let available = (self.bytes.len() as u64).saturating_sub(self.offset) as usize;
        let step = buf.len().min(available);
        if step > 0 {
            let start = self.offset as usize;
            buf[..step].copy_from_slice(&self.bytes[start..start + step]);
            self.offset += step as u64;
        }
        Ok(step)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.opened {
            return Err(Error::invalid_arguments("the in-stream is not open"));
        }
        self.offset = resolve_seek(pos, self.offset, self.bytes.len() as u64)?;
        Ok(self.offset)
    }
}

/// User callbacks backing an [`InStream`].
///
/// `open` returning `false` fails the stream open with an I/O error.
/// `seek` and `read` return `None` to signal failure.
pub struct StreamCallbacks {
    /// Prepares the source; `false` aborts the open.
    pub open: Box<dyn FnMut() -> bool + Send>,
    /// Releases the source.
    pub close: Box<dyn FnMut() + Send>,
    /// Moves the position; returns the new absolute position.
    pub seek: Box<dyn FnMut(SeekFrom) -> Option<u64> + Send>,
    /// Reads into the buffer; returns the number of bytes read.
    pub read: Box<dyn FnMut(&mut [u8]) -> Option<usize> + Send>,
}

struct CallbackInStream {
    callbacks: StreamCallbacks,
    opened: bool,
}

/// The close callback runs even when the last handle drops while open;
/// resources captured by the closures are released right after.
impl Drop for CallbackInStream {
    fn drop(&mut self) {
        if self.opened {
            self.opened = false;
            (self.callbacks.close)();
        }
    }
}

impl InStreamImp for CallbackInStream {
    fn open(&mut self) -> Result<()> {
        if !self.opened {
            if !(self.callbacks.open)() {
                return Err(Error::Io(std::io::Error::other(
                    "can't open in-stream using the open callback",
                )));
            }
            self.opened = true;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.opened {
            self.opened = false;
            (self.callbacks.close)();
        }
    }

    fn opened(&self) -> bool {
        self.opened
    }

    fn erase(&mut self, _mode: EraseMode) -> Result<bool> {
        // Nothing to erase behind user callbacks.
        Ok(!self.opened)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.opened {
            return Err(Error::invalid_arguments("the in-stream is not open"));
        }
        (self.callbacks.read)(buf)
            .ok_or_else(|| Error::Io(std::io::Error::other("the read callback failed")))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.opened {
            return Err(Error::invalid_arguments("the in-stream is not open"));
        }
        (self.callbacks.seek)(pos)
            .ok_or_else(|| Error::Io(std::io::Error::other("the seek callback failed")))
    }
}

struct MultiInStream {
    children: Vec<InStream>,
    sizes: Vec<u64>,
    offset: u64,
    opened: bool,
}

impl MultiInStream {
    fn total(&self) -> u64 {
        self.sizes.iter().sum()
    }
}

impl InStreamImp for MultiInStream {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.sizes.clear();
        for (index, child) in self.children.iter().enumerate() {
            child.open()?;
            let size = child.measure().map_err(|e| {
                Error::invalid_arguments(format!("can't seek sub-stream at index {index}: {e}"))
            })?;
            self.sizes.push(size);
        }
        self.offset = 0;
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        for child in &self.children {
            child.close();
        }
        self.sizes.clear();
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
        for child in &self.children {
            if !child.erase(mode)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.opened {
            return Err(Error::invalid_arguments("the in-stream is not open"));
        }
        let mut filled = 0usize;
        while filled < buf.len() {
            let mut child_start = 0u64;
            let mut located = None;
            for (index, size) in self.sizes.iter().enumerate() {
                if self.offset < child_start + size {
                    located = Some((index, self.offset - child_start));
                    break;
                }
                child_start += size;
            }
            let Some((index, local_offset)) = located else {
                break;
            };
            let child = &self.children[index];
            child.seek(SeekFrom::Start(local_offset))?;
            let within = (self.sizes[index] - local_offset) as usize;
            let step = (buf.len() - filled).min(within);
            let n = child.read(&mut buf[filled..filled + step])?;
            if n == 0 {
                break;
            }
            filled += n;
            self.offset += n as u64;
        }
        Ok(filled)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.opened {
            return Err(Error::invalid_arguments("the in-stream is not open"));
        }
        self.offset = resolve_seek(pos, self.offset, self.total())?;
        Ok(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_rejects_empty() {
        let err = InStream::with_memory(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn test_file_rejects_empty_path() {
        let err = InStream::with_path(Path::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn test_memory_read_and_seek() {
        let stream = InStream::with_memory(b"0123456789".to_vec()).unwrap();
        assert!(!stream.opened());
        stream.open().unwrap();
        assert!(stream.opened());

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");

        assert!(stream.seek(SeekFrom::Current(5)).is_err());
        assert!(stream.seek(SeekFrom::Start(11)).is_err());
        stream.close();
        assert!(!stream.opened());
    }

    #[test]
    fn test_read_while_closed_fails() {
        let stream = InStream::with_memory(vec![1, 2, 3]).unwrap();
        let mut buf = [0u8; 1];
        assert!(stream.read(&mut buf).is_err());
        assert!(stream.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn test_erase_refused_while_open() {
        let stream = InStream::with_memory(vec![1, 2, 3]).unwrap();
        stream.open().unwrap();
        assert!(!stream.erase(EraseMode::None).unwrap());
        stream.close();
        assert!(stream.erase(EraseMode::Zero).unwrap());
    }

    #[test]
    fn test_static_buffer() {
        static BYTES: &[u8] = b"static content";
        let stream = InStream::with_static(BYTES).unwrap();
        stream.open().unwrap();
        assert_eq!(stream.measure().unwrap(), BYTES.len() as u64);
        stream.close();
        assert!(stream.erase(EraseMode::Zero).unwrap());
    }

    #[test]
    fn test_file_stream_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Path::new(&dir.path().to_string_lossy()).appending("data.bin");
        std::fs::write(path.as_str(), b"file bytes").unwrap();

        let stream = InStream::with_path(path.clone()).unwrap();
        stream.open().unwrap();
        assert_eq!(stream.measure().unwrap(), 10);
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf, b"file bytes");
        assert_eq!(stream.path().unwrap(), path);
        stream.close();

        assert!(stream.erase(EraseMode::Zero).unwrap());
        assert!(path.exists().is_none());
    }

    #[test]
    fn test_callback_stream() {
        let data = Arc::new(b"callback data".to_vec());
        let offset = Arc::new(Mutex::new(0u64));

        let read_data = Arc::clone(&data);
        let read_offset = Arc::clone(&offset);
        let seek_data = Arc::clone(&data);
        let seek_offset = Arc::clone(&offset);

        let stream = InStream::with_callbacks(StreamCallbacks {
            open: Box::new(|| true),
            close: Box::new(|| {}),
            seek: Box::new(move |pos| {
                let size = seek_data.len() as u64;
                let mut offset = seek_offset.lock().unwrap();
                let target = match pos {
                    SeekFrom::Start(v) => v as i64,
                    SeekFrom::Current(d) => *offset as i64 + d,
                    SeekFrom::End(d) => size as i64 + d,
                };
                if target < 0 || target as u64 > size {
                    return None;
                }
                *offset = target as u64;
                Some(*offset)
            }),
            read: Box::new(move |buf| {
                let mut offset = read_offset.lock().unwrap();
                let start = *offset as usize;
                let step = buf.len().min(read_data.len().saturating_sub(start));
                buf[..step].copy_from_slice(&read_data[start..start + step]);
                *offset += step as u64;
                Some(step)
            }),
        });

        stream.open().unwrap();
        assert_eq!(stream.measure().unwrap(), 13);
        let mut all = vec![0u8; 13];
        assert_eq!(stream.read(&mut all).unwrap(), 13);
        assert_eq!(all, b"callback data");
        stream.close();
    }

    #[test]
    fn test_callback_open_failure() {
        let stream = InStream::with_callbacks(StreamCallbacks {
            open: Box::new(|| false),
            close: Box::new(|| {}),
            seek: Box::new(|_| None),
            read: Box::new(|_| None),
        });
        assert!(matches!(stream.open().unwrap_err(), Error::Io(_)));
    }

    #[test]
    fn test_multi_concatenates() {
        let first = InStream::with_memory(b"01234".to_vec()).unwrap();
        let second = InStream::with_memory(b"56789".to_vec()).unwrap();
        let third = InStream::with_memory(b"abcde".to_vec()).unwrap();
        let multi = InStream::multi(vec![first, second, third]).unwrap();

        multi.open().unwrap();
        assert_eq!(multi.measure().unwrap(), 15);

        let mut all = vec![0u8; 15];
        assert_eq!(multi.read(&mut all).unwrap(), 15);
        assert_eq!(all, b"0123456789abcde");

        multi.seek(SeekFrom::Start(3)).unwrap();
        let mut across = vec![0u8; 4];
        assert_eq!(multi.read(&mut across).unwrap(), 4);
        assert_eq!(across, b"3456");
        multi.close();
    }

    #[test]
    fn test_multi_rejects_empty() {
        assert!(InStream::multi(Vec::new()).is_err());
    }
}
