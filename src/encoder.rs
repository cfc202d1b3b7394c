//! Archive encoder engine.
//!
//! An [`Encoder`] collects entries (filesystem paths or in-streams),
//! validates its configuration on [`open`], and writes the container on
//! [`compress`]. The destination is any [`OutStream`]; a multi-volume
//! sink partitions the produced bytes without the encoder seeing part
//! boundaries.
//!
//! [`open`]: Encoder::open
//! [`compress`]: Encoder::compress

use std::fs::File;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use sevenz_rust2::{ArchiveEntry, ArchiveWriter, EncoderConfiguration, EncoderMethod, SourceReader};
use sevenz_rust2::encoder_options::{EncoderOptions, LZMA2Options, PPMDOptions};

use crate::codec::{self, FileType, Method};
use crate::error::{Error, Result};
use crate::path::Path;
use crate::progress::{AbortHandle, ProgressDelegate, ProgressTracker};
use crate::settings;
use crate::stream::{InStream, InStreamReader, OutStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Opened,
    Finished,
    Terminal,
}

enum EntrySource {
    File(Path),
    Stream(InStream),
    None,
}

struct PendingEntry {
    source: EntrySource,
    archive_path: Path,
    is_dir: bool,
}

enum EntryReader {
    File(File),
    Stream(InStreamReader),
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            EntryReader::File(file) => file.read(buf),
            EntryReader::Stream(reader) => reader.read(buf),
        }
    }
}

/// Reader wrapper that reports consumed bytes and polls for abort.
struct ProgressReader<R> {
    inner: R,
    path: String,
    started: bool,
    consumed: u64,
    tracker: Arc<Mutex<ProgressTracker>>,
    abort: AbortHandle,
}

impl<R> ProgressReader<R> {
    fn new(inner: R, path: &str, tracker: Arc<Mutex<ProgressTracker>>, abort: AbortHandle) -> Self {
        Self {
            inner,
            path: path.to_string(),
            started: false,
            consumed: 0,
            tracker,
            abort,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Err(e) = self.abort.check() {
            return Err(e.into_io());
        }
        if !self.started {
            self.started = true;
            self.tracker.lock().unwrap().begin_item(&self.path);
        }
        let n = self.inner.read(buf)?;
        let mut tracker = self.tracker.lock().unwrap();
        if n == 0 {
            tracker.finish_item(self.consumed);
        } else {
            self.consumed += n as u64;
            tracker.advance(n as u64);
        }
        Ok(n)
    }
}

/// Encodes one archive container into an [`OutStream`].
pub struct Encoder {
    stream: OutStream,
    file_type: FileType,
    method: Method,
    level: u32,
    password: Option<String>,
    solid: bool,
    header_compression: bool,
    header_encryption: bool,
    content_encryption: bool,
    entries: Vec<PendingEntry>,
    tracker: Arc<Mutex<ProgressTracker>>,
    abort: AbortHandle,
    state: State,
}

impl Encoder {
    /// Creates an encoder writing the given container type and method to
    /// the destination stream.
    ///
    /// Pass [`OutMultiStream::as_out_stream`] to produce a multi-volume
    /// container.
    ///
    /// [`OutMultiStream::as_out_stream`]: crate::OutMultiStream::as_out_stream
    pub fn new(stream: OutStream, file_type: FileType, method: Method) -> Self {
        Self {
            stream,
            file_type,
            method,
            level: 5,
            password: None,
            solid: true,
            header_compression: true,
            header_encryption: false,
            content_encryption: true,
            entries: Vec::new(),
            tracker: Arc::default(),
            abort: AbortHandle::new(),
            state: State::Fresh,
        }
    }

    /// Arms AES-256 encryption with the given password (7z only).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] on builds without the `crypto`
    /// feature.
    pub fn set_password(&mut self, password: &str) -> Result<()> {
        if cfg!(not(feature = "crypto")) {
            return Err(Error::invalid_arguments(
                "crypto support is not compiled in (enable the `crypto` feature)",
            ));
        }
        if self.state != State::Fresh {
            return Err(Error::invalid_arguments(
                "the encoder is no longer configurable",
            ));
        }
        self.password = Some(password.to_string());
        Ok(())
    }

    /// Sets the password from UTF-16 text.
    pub fn set_password_wide(&mut self, password: &[u16]) -> Result<()> {
        let utf8 = String::from_utf16(password)
            .map_err(|_| Error::invalid_arguments("the password is not valid UTF-16"))?;
        self.set_password(&utf8)
    }

    /// Installs or clears the progress delegate.
    pub fn set_progress_delegate(&mut self, delegate: Option<Box<dyn ProgressDelegate>>) {
        self.tracker.lock().unwrap().set_delegate(delegate);
    }

    /// Sets the compression level, `0..=9`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for levels above 9.
    pub fn set_compression_level(&mut self, level: u32) -> Result<()> {
        if level > 9 {
            return Err(Error::invalid_arguments(format!(
                "compression level {level} is out of range (0..=9)"
            )));
        }
        self.level = level;
        Ok(())
    }

    /// Packs all content into one solid block (7z only; default on).
    pub fn set_solid(&mut self, solid: bool) {
        self.solid = solid;
    }

    /// Compresses the 7z header (advisory; default on).
    pub fn set_header_compression(&mut self, enabled: bool) {
        self.header_compression = enabled;
    }

    /// Encrypts the 7z header when a password is set (default off).
    pub fn set_header_encryption(&mut self, enabled: bool) {
        self.header_encryption = enabled;
    }

    /// Encrypts the 7z content when a password is set (default on).
    pub fn set_content_encryption(&mut self, enabled: bool) {
        self.content_encryption = enabled;
    }

    /// Returns a handle that cancels a running compression from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Requests cancellation of the current compression.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Adds the filesystem entry at `path`, recursing into directories.
    ///
    /// The entry is archived under its last path component; directory
    /// content keeps its relative layout below that.
    pub fn add_path(&mut self, path: &Path) -> Result<()> {
        let name = path.last_component();
        if name.is_empty() {
            return Err(Error::invalid_arguments(format!(
                "'{path}' has no usable archive name"
            )));
        }
        self.add_path_as(path, name)
    }

    /// Adds the filesystem entry at `path` under the given archive name.
    pub fn add_path_as(&mut self, path: &Path, archive_name: Path) -> Result<()> {
        self.check_configurable()?;
        if archive_name.is_empty() {
            return Err(Error::invalid_arguments(
                "can't add an entry without an archive name",
            ));
        }
        match path.exists() {
            None => Err(Error::invalid_arguments(format!("'{path}' does not exist"))),
            Some(false) => {
                self.entries.push(PendingEntry {
                    source: EntrySource::File(path.clone()),
                    archive_path: archive_name,
                    is_dir: false,
                });
                Ok(())
            }
            Some(true) => {
                self.entries.push(PendingEntry {
                    source: EntrySource::None,
                    archive_path: archive_name.clone(),
                    is_dir: true,
                });
                for entry in path.open_dir()? {
                    let entry = entry?;
                    self.entries.push(PendingEntry {
                        source: if entry.is_dir {
                            EntrySource::None
                        } else {
                            EntrySource::File(entry.full)
                        },
                        archive_path: archive_name.appending(entry.relative.as_str()),
                        is_dir: entry.is_dir,
                    });
                }
                Ok(())
            }
        }
    }

    /// Adds a single entry whose bytes come from the given stream.
    pub fn add_stream(&mut self, stream: InStream, archive_name: Path) -> Result<()> {
        self.check_configurable()?;
        if archive_name.is_empty() {
            return Err(Error::invalid_arguments(
                "can't add an entry without an archive name",
            ));
        }
        self.entries.push(PendingEntry {
            source: EntrySource::Stream(stream),
            archive_path: archive_name,
            is_dir: false,
        });
        Ok(())
    }

    /// Validates the configuration and opens the destination stream.
    pub fn open(&mut self) -> Result<bool> {
        codec::initialize();
        codec::check_file_type_supported(self.file_type)?;
        if self.state != State::Fresh {
            return Err(Error::invalid_arguments("the encoder is already open"));
        }
        if self.entries.is_empty() {
            return Err(Error::invalid_arguments(
                "can't encode an archive without entries",
            ));
        }
        match self.file_type {
            FileType::SevenZ => {}
            FileType::Xz => {
                if self.method != Method::Lzma2 {
                    return Err(Error::invalid_arguments(format!(
                        "the xz container supports LZMA2 only, not {}",
                        self.method
                    )));
                }
                if self.entries.len() != 1 || self.entries[0].is_dir {
                    return Err(Error::invalid_arguments(
                        "the xz container holds exactly one file entry",
                    ));
                }
                if self.password.is_some() {
                    return Err(Error::invalid_arguments(
                        "the xz container does not support encryption",
                    ));
                }
            }
            FileType::Tar => {
                if self.password.is_some() {
                    return Err(Error::invalid_arguments(
                        "the tar container does not support encryption",
                    ));
                }
            }
        }
        self.stream.open()?;
        self.state = State::Opened;
        log::debug!(
            "encoding {} entries as {} with {}",
            self.entries.len(),
            self.file_type,
            self.method
        );
        Ok(true)
    }

    /// Writes the container.
    ///
    /// Returns `false` on graceful abort. After either outcome the encoder
    /// is finished; construct a new one for the next archive.
    pub fn compress(&mut self) -> Result<bool> {
        codec::initialize();
        if self.state != State::Opened {
            return Err(Error::invalid_arguments("the encoder is not open"));
        }
        let total = self.measure_sources()?;
        self.tracker.lock().unwrap().begin(total);

        let outcome = match self.file_type {
            FileType::SevenZ => self.compress_seven_z(),
            FileType::Xz => self.compress_xz(),
            FileType::Tar => self.compress_tar(),
        };
        self.close_entry_streams();
        match outcome {
            Ok(()) => {
                if let Some(stashed) = self.stream.take_error() {
                    self.terminate();
                    return Err(stashed);
                }
                self.stream.close();
                self.state = State::Finished;
                self.tracker.lock().unwrap().complete();
                Ok(true)
            }
            Err(Error::Aborted) => {
                self.terminate();
                Ok(false)
            }
            Err(e) => {
                self.terminate();
                Err(match self.stream.take_error() {
                    Some(stashed) => stashed,
                    None => e,
                })
            }
        }
    }

    fn terminate(&mut self) {
        self.stream.close();
        self.state = State::Terminal;
    }

    fn check_configurable(&self) -> Result<()> {
        if self.state == State::Fresh {
            Ok(())
        } else {
            Err(Error::invalid_arguments(
                "the encoder is no longer configurable",
            ))
        }
    }

    /// Opens stream sources and computes the total payload size.
    fn measure_sources(&mut self) -> Result<u64> {
        let mut total = 0u64;
        for entry in &self.entries {
            total += match &entry.source {
                EntrySource::File(path) => path.stat()?.size,
                EntrySource::Stream(stream) => {
                    stream.open()?;
                    stream.measure()?
                }
                EntrySource::None => 0,
            };
        }
        Ok(total)
    }

    fn close_entry_streams(&self) {
        for entry in &self.entries {
            if let EntrySource::Stream(stream) = &entry.source {
                stream.close();
            }
        }
    }

    fn archive_entry(&self, pending: &PendingEntry) -> ArchiveEntry {
        let name = pending.archive_path.as_str().replace('\\', "/");
        let mut entry = if pending.is_dir {
            ArchiveEntry::new_directory(&name)
        } else {
            ArchiveEntry::new_file(&name)
        };
        let stat = match &pending.source {
            EntrySource::File(path) => path.stat().ok(),
            _ => None,
        };
        let modification = stat
            .map(|s| s.modification)
            .filter(|&secs| secs > 0)
            .map(|secs| UNIX_EPOCH + std::time::Duration::from_secs(secs as u64))
            .unwrap_or_else(SystemTime::now);
        if let Ok(time) = sevenz_rust2::NtTime::try_from(modification) {
            entry.has_last_modified_date = true;
            entry.last_modified_date = time;
        }
        entry
    }

    fn entry_reader(&self, pending: &PendingEntry) -> Result<ProgressReader<EntryReader>> {
        let inner = match &pending.source {
            EntrySource::File(path) => EntryReader::File(path.open_for_reading()?),
            EntrySource::Stream(stream) => {
                stream.seek(std::io::SeekFrom::Start(0))?;
                EntryReader::Stream(stream.reader())
            }
            EntrySource::None => {
                return Err(Error::internal("a directory entry has no reader"));
            }
        };
        Ok(ProgressReader::new(
            inner,
            pending.archive_path.as_str(),
            Arc::clone(&self.tracker),
            self.abort.clone(),
        ))
    }

    fn content_methods(&self) -> Vec<EncoderConfiguration> {
        let mut methods = Vec::new();
        #[cfg(feature = "crypto")]
        if self.content_encryption {
            if let Some(password) = &self.password {
                methods.push(
                    sevenz_rust2::encoder_options::AesEncoderOptions::new(
                        sevenz_rust2::Password::from(password.as_str()),
                    )
                    .into(),
                );
            }
        }
        methods.push(match self.method {
            Method::Lzma => EncoderConfiguration::new(EncoderMethod::LZMA)
                .with_options(EncoderOptions::LZMA2(LZMA2Options::with_preset(self.level))),
            Method::Lzma2 => EncoderConfiguration::new(EncoderMethod::LZMA2)
                .with_options(EncoderOptions::LZMA2(LZMA2Options::with_preset(self.level))),
            Method::Ppmd => EncoderConfiguration::new(EncoderMethod::PPMD)
                .with_options(EncoderOptions::PPMD(PPMDOptions::from_level(self.level))),
        });
        methods
    }

    fn compress_seven_z(&mut self) -> Result<()> {
        let mut writer = ArchiveWriter::new(self.stream.writer())?;
        writer.set_content_methods(self.content_methods());
        #[cfg(feature = "crypto")]
        if self.header_encryption && self.password.is_some() {
            writer.set_encrypt_header(true);
        }

        if self.solid {
            let mut file_entries = Vec::new();
            let mut readers = Vec::new();
            for pending in &self.entries {
                if pending.is_dir {
                    writer.push_archive_entry::<EntryReader>(self.archive_entry(pending), None)?;
                } else {
                    file_entries.push(self.archive_entry(pending));
                    readers.push(SourceReader::new(self.entry_reader(pending)?));
                }
            }
            if !file_entries.is_empty() {
                writer.push_archive_entries(file_entries, readers)?;
            }
        } else {
            for pending in &self.entries {
                if pending.is_dir {
                    writer.push_archive_entry::<EntryReader>(self.archive_entry(pending), None)?;
                } else {
                    writer
                        .push_archive_entry(self.archive_entry(pending), Some(self.entry_reader(pending)?))?;
                }
            }
        }
        writer.finish().map_err(Error::Io)?;
        Ok(())
    }

    fn compress_xz(&mut self) -> Result<()> {
        let pending = &self.entries[0];
        let mut encoder = xz2::write::XzEncoder::new(self.stream.writer(), self.level);
        let mut reader = self.entry_reader(pending)?;
        let mut buf = vec![0u8; settings::stream_read_size()];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    return Err(Error::Aborted);
                }
                Err(e) => return Err(Error::Io(e)),
            };
            encoder.write_all(&buf[..n]).map_err(map_write_error)?;
        }
        encoder.finish().map_err(map_write_error)?;
        Ok(())
    }

    #[cfg(feature = "tar")]
    fn compress_tar(&mut self) -> Result<()> {
        let mut builder = tar::Builder::new(self.stream.writer());
        for pending in &self.entries {
            let name = pending.archive_path.as_str().replace('\\', "/");
            let mut header = tar::Header::new_gnu();
            if pending.is_dir {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_mtime(now_epoch());
                builder
                    .append_data(&mut header, format!("{name}/"), std::io::empty())
                    .map_err(map_write_error)?;
            } else {
                let (size, mtime) = match &pending.source {
                    EntrySource::File(path) => {
                        let stat = path.stat()?;
                        (stat.size, stat.modification.max(0) as u64)
                    }
                    EntrySource::Stream(stream) => (stream.measure()?, now_epoch()),
                    EntrySource::None => (0, now_epoch()),
                };
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(size);
                header.set_mode(0o644);
                header.set_mtime(mtime);
                let reader = self.entry_reader(pending)?;
                builder
                    .append_data(&mut header, name, reader)
                    .map_err(map_write_error)?;
            }
        }
        let writer = builder.into_inner().map_err(map_write_error)?;
        drop(writer);
        Ok(())
    }

    #[cfg(not(feature = "tar"))]
    fn compress_tar(&mut self) -> Result<()> {
        Err(Error::invalid_arguments(
            "tar support is not compiled in (enable the `tar` feature)",
        ))
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("file_type", &self.file_type)
            .field("method", &self.method)
            .field("level", &self.level)
            .field("solid", &self.solid)
            .field("header_compression", &self.header_compression)
            .field("header_encryption", &self.header_encryption)
            .field("content_encryption", &self.content_encryption)
            .field("entries", &self.entries.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn map_write_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::Interrupted {
        Error::Aborted
    } else {
        Error::Io(e)
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
