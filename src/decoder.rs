//! Archive decoder engine.
//!
//! A [`Decoder`] binds an [`InStream`] to a container type, parses the
//! container on [`open`], and drives extraction or integrity testing of
//! the listed items. One decoder serves one source: after a fault or an
//! abort it is terminal and a fresh decoder must be constructed.
//!
//! [`open`]: Decoder::open

use std::collections::HashMap;
use std::io::{Read, SeekFrom};

use sevenz_rust2::{ArchiveReader, EncoderMethod, Password as ArchivePassword};

use crate::checksum::Crc32Reader;
use crate::codec::{self, FileType, signature};
use crate::error::{Error, Result};
use crate::item::{Item, ItemArray, ItemOutStreamMap};
use crate::path::Path;
use crate::progress::{AbortHandle, ProgressDelegate, ProgressTracker};
use crate::settings;
use crate::stream::{InStream, InStreamReader, OutStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Opened,
    Terminal,
}

enum Destination<'a> {
    Directory { dir: &'a Path, full_paths: bool },
    Streams(&'a ItemOutStreamMap),
    Test,
}

/// Decodes one archive container from an [`InStream`].
pub struct Decoder {
    stream: InStream,
    file_type: FileType,
    password: Option<String>,
    items: ItemArray,
    seven_z: Option<ArchiveReader<InStreamReader>>,
    index_by_name: HashMap<String, usize>,
    tracker: ProgressTracker,
    abort: AbortHandle,
    state: State,
}

impl Decoder {
    /// Creates a decoder over the given source stream and container type.
    ///
    /// Nothing is read until [`open`](Self::open).
    pub fn new(stream: InStream, file_type: FileType) -> Self {
        Self {
            stream,
            file_type,
            password: None,
            items: ItemArray::new(),
            seven_z: None,
            index_by_name: HashMap::new(),
            tracker: ProgressTracker::default(),
            abort: AbortHandle::new(),
            state: State::Fresh,
        }
    }

    /// Sets the password used for encrypted headers and content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] on builds without the `crypto`
    /// feature, or when an operation already ran.
    pub fn set_password(&mut self, password: &str) -> Result<()> {
        if cfg!(not(feature = "crypto")) {
            return Err(Error::invalid_arguments(
                "crypto support is not compiled in (enable the `crypto` feature)",
            ));
        }
        if self.state == State::Terminal {
            return Err(Error::invalid_arguments(
                "the decoder is no longer configurable",
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
        self.tracker.set_delegate(delegate);
    }

    /// Returns a handle that cancels a running operation from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Requests cancellation of the current operation.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Parses the container headers and builds the item table.
    ///
    /// Returns `false` when the source is not a structurally valid
    /// container of the bound type.
    ///
    /// # Errors
    ///
    /// I/O faults, codec faults, and password failures on encrypted 7z
    /// headers are errors; see [`Error`].
    pub fn open(&mut self) -> Result<bool> {
        codec::initialize();
        codec::check_file_type_supported(self.file_type)?;
        if self.state != State::Fresh {
            return Err(Error::invalid_arguments("the decoder is already open"));
        }
        log::debug!("opening {} container", self.file_type);
        self.stream.open()?;
        let outcome = match self.file_type {
            FileType::SevenZ => self.open_seven_z(),
            FileType::Xz => self.open_xz(),
            FileType::Tar => self.open_tar(),
        };
        match outcome {
            Ok(true) => {
                self.state = State::Opened;
                log::debug!("container holds {} items", self.items.len());
                Ok(true)
            }
            Ok(false) => {
                self.terminate();
                Ok(false)
            }
            Err(e) => {
                self.terminate();
                Err(e)
            }
        }
    }

    /// Returns the number of items; zero before [`open`](Self::open).
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns the item at the given index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the index is out of range.
    pub fn item_at(&self, index: usize) -> Result<Item> {
        self.items.at(index).cloned().ok_or_else(|| {
            Error::invalid_arguments(format!(
                "item index {index} is out of range (count {})",
                self.items.len()
            ))
        })
    }

    /// Returns a copy of the item table; empty before [`open`](Self::open).
    pub fn items(&self) -> ItemArray {
        self.items.clone()
    }

    /// Extracts every item below `dir`, reproducing relative paths.
    ///
    /// With `full_paths` disabled, items are flattened to their last path
    /// component. Returns `false` on abort.
    pub fn extract(&mut self, dir: &Path, full_paths: bool) -> Result<bool> {
        self.run(None, Destination::Directory { dir, full_paths })
    }

    /// Extracts only the given items below `dir`.
    pub fn extract_items(
        &mut self,
        items: &ItemArray,
        dir: &Path,
        full_paths: bool,
    ) -> Result<bool> {
        let selection = items.iter().map(|item| item.index).collect();
        self.run(
            Some(selection),
            Destination::Directory { dir, full_paths },
        )
    }

    /// Writes each paired item's plain bytes to its [`OutStream`].
    ///
    /// The pairs need not cover every item; unpaired items are skipped.
    pub fn extract_to_streams(&mut self, map: &ItemOutStreamMap) -> Result<bool> {
        let selection = map.iter().map(|(item, _)| item.index).collect();
        self.run(Some(selection), Destination::Streams(map))
    }

    /// Decodes every item into a test sink and verifies integrity.
    ///
    /// Returns `false` when any item fails its check or on abort.
    pub fn test(&mut self) -> Result<bool> {
        self.run(None, Destination::Test)
    }

    fn run(&mut self, selection: Option<Vec<usize>>, destination: Destination<'_>) -> Result<bool> {
        codec::initialize();
        if self.state != State::Opened {
            return Err(Error::invalid_arguments("the decoder is not open"));
        }
        let selection = selection.map(|mut indices: Vec<usize>| {
            indices.sort_unstable();
            indices.dedup();
            indices
        });
        let total = self
            .items
            .iter()
            .filter(|item| !item.is_dir && selected(&selection, item.index))
            .map(|item| item.size)
            .sum();
        self.tracker.begin(total);

        let outcome = match self.file_type {
            FileType::SevenZ => self.run_seven_z(&selection, &destination),
            FileType::Xz => self.run_xz(&selection, &destination),
            FileType::Tar => self.run_tar(&selection, &destination),
        };
        match outcome {
            Ok(true) => {
                self.tracker.complete();
                Ok(true)
            }
            Ok(false) => {
                self.terminate();
                Ok(false)
            }
            Err(Error::Aborted) => {
                self.terminate();
                Ok(false)
            }
            Err(e) => {
                self.terminate();
                Err(e)
            }
        }
    }

    fn terminate(&mut self) {
        self.seven_z = None;
        self.stream.close();
        self.state = State::Terminal;
    }

    fn open_seven_z(&mut self) -> Result<bool> {
        let mut header = [0u8; 6];
        self.stream.seek(SeekFrom::Start(0))?;
        if read_fully(&mut self.stream.reader(), &mut header)? != header.len()
            || header != signature::SEVEN_Z
        {
            return Ok(false);
        }
        self.stream.seek(SeekFrom::Start(0))?;

        let password = match &self.password {
            Some(text) => ArchivePassword::from(text.as_str()),
            None => ArchivePassword::empty(),
        };
        let reader = match ArchiveReader::new(self.stream.reader(), password) {
            Ok(reader) => reader,
            Err(e) => {
                return match Error::from(e) {
                    // The signature was valid, so a parse failure with a
                    // password set means the encrypted header did not
                    // decrypt to anything sensible.
                    Error::InvalidFormat(_) if self.password.is_some() => {
                        Err(Error::WrongPassword { path: None })
                    }
                    Error::InvalidFormat(_) => Ok(false),
                    other => Err(other),
                };
            }
        };

        let archive = reader.archive();
        let mut items = ItemArray::new();
        let mut index_by_name = HashMap::new();
        for (index, file) in archive.files.iter().enumerate() {
            let name = if file.name.is_empty() {
                format!("untitled_{index}")
            } else {
                file.name.clone()
            };
            let mut item = Item::new(Path::new(&name), index)?;
            item.size = file.size;
            item.pack_size = file.compressed_size;
            item.is_dir = file.is_directory;
            if file.has_crc {
                item.crc32 = file.crc as u32;
            }
            if file.has_creation_date {
                item.creation = nt_time_to_epoch(file.creation_date);
            }
            if file.has_access_date {
                item.access = nt_time_to_epoch(file.access_date);
            }
            if file.has_last_modified_date {
                item.modification = nt_time_to_epoch(file.last_modified_date);
            }
            item.encrypted = archive.stream_map.file_block_index[index]
                .map(|block| {
                    archive.blocks[block]
                        .coders
                        .iter()
                        .any(|coder| coder.encoder_method_id() == EncoderMethod::ID_AES256SHA256)
                })
                .unwrap_or(false);
            index_by_name.insert(file.name.clone(), index);
            items.push(item);
        }
        self.items = items;
        self.index_by_name = index_by_name;
        self.seven_z = Some(reader);
        Ok(true)
    }

    fn open_xz(&mut self) -> Result<bool> {
        let mut header = [0u8; 6];
        self.stream.seek(SeekFrom::Start(0))?;
        if read_fully(&mut self.stream.reader(), &mut header)? != header.len()
            || header != signature::XZ
        {
            return Ok(false);
        }
        self.stream.seek(SeekFrom::Start(0))?;

        let mut decoder = xz2::read::XzDecoder::new(self.stream.reader());
        let mut size = 0u64;
        let mut buf = vec![0u8; settings::decoder_read_size()];
        loop {
            self.abort.check()?;
            let n = match decoder.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => return Ok(false),
                Err(e) => return Err(Error::Io(e)),
            };
            if n == 0 {
                break;
            }
            size += n as u64;
        }

        let name = self
            .stream
            .path()
            .map(|path| path.last_component())
            .filter(|component| !component.is_empty())
            .map(|component| {
                let text = component.as_str();
                match text.strip_suffix(".xz") {
                    Some(stem) if !stem.is_empty() => stem.to_string(),
                    _ => text.to_string(),
                }
            })
            .unwrap_or_else(|| "untitled".to_string());

        let mut item = Item::new(Path::new(&name), 0)?;
        item.size = size;
        item.pack_size = self.stream.seek(SeekFrom::End(0))?;
        self.stream.seek(SeekFrom::Start(0))?;
        let mut items = ItemArray::new();
        items.push(item);
        self.items = items;
        Ok(true)
    }

    #[cfg(feature = "tar")]
    fn open_tar(&mut self) -> Result<bool> {
        let mut block = [0u8; 512];
        self.stream.seek(SeekFrom::Start(0))?;
        let read = read_fully(&mut self.stream.reader(), &mut block)?;
        if read < block.len() || codec::detect_file_type(&block) != Some(FileType::Tar) {
            return Ok(false);
        }
        self.stream.seek(SeekFrom::Start(0))?;

        let mut archive = tar::Archive::new(self.stream.reader());
        let mut items = ItemArray::new();
        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(_) => return Ok(false),
        };
        for (index, entry) in entries.enumerate() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) if items.is_empty() => return Ok(false),
                Err(e) => return Err(Error::Io(e)),
            };
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let mut item = Item::new(Path::new(&name), index)?;
            item.size = entry.header().size().unwrap_or(0);
            item.modification = entry.header().mtime().unwrap_or(0) as i64;
            item.is_dir = entry.header().entry_type().is_dir();
            // tar stores no content checksum; the CRC stays zero.
            items.push(item);
        }
        self.items = items;
        Ok(true)
    }

    #[cfg(not(feature = "tar"))]
    fn open_tar(&mut self) -> Result<bool> {
        Err(Error::invalid_arguments(
            "tar support is not compiled in (enable the `tar` feature)",
        ))
    }

    fn run_seven_z(
        &mut self,
        selection: &Option<Vec<usize>>,
        destination: &Destination<'_>,
    ) -> Result<bool> {
        let reader = self
            .seven_z
            .as_mut()
            .ok_or_else(|| Error::internal("the 7z reader is missing"))?;

        let items = &self.items;
        let index_by_name = &self.index_by_name;
        let tracker = &mut self.tracker;
        let abort = &self.abort;

        let mut failure: Option<Error> = None;
        let mut passed = true;
        reader.for_each_entries(&mut |entry: &sevenz_rust2::ArchiveEntry, content: &mut dyn Read| {
            let Some(&index) = index_by_name.get(entry.name()) else {
                return Ok(true);
            };
            let item = match items.at(index) {
                Some(item) => item,
                None => return Ok(true),
            };
            if !selected(selection, index) {
                return match drain(content, abort) {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        failure = Some(e);
                        Ok(false)
                    }
                };
            }
            match deliver(item, content, destination, tracker, abort) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    passed = false;
                    Ok(false)
                }
                Err(e) => {
                    failure = Some(e);
                    Ok(false)
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(passed)
    }

    fn run_xz(
        &mut self,
        selection: &Option<Vec<usize>>,
        destination: &Destination<'_>,
    ) -> Result<bool> {
        let Some(item) = self.items.at(0) else {
            return Ok(true);
        };
        if !selected(selection, 0) {
            return Ok(true);
        }
        self.stream.seek(SeekFrom::Start(0))?;
        let mut decoder = xz2::read::XzDecoder::new(self.stream.reader());
        match deliver(item, &mut decoder, destination, &mut self.tracker, &self.abort) {
            Ok(passed) => Ok(passed),
            Err(Error::Io(e))
                if e.kind() == std::io::ErrorKind::InvalidData
                    && matches!(destination, Destination::Test) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(feature = "tar")]
    fn run_tar(
        &mut self,
        selection: &Option<Vec<usize>>,
        destination: &Destination<'_>,
    ) -> Result<bool> {
        self.stream.seek(SeekFrom::Start(0))?;
        let mut archive = tar::Archive::new(self.stream.reader());
        for (index, entry) in archive.entries()?.enumerate() {
            self.abort.check()?;
            let mut entry = entry?;
            let Some(item) = self.items.at(index) else {
                break;
            };
            if !selected(selection, index) {
                continue;
            }
            if !deliver(item, &mut entry, destination, &mut self.tracker, &self.abort)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    #[cfg(not(feature = "tar"))]
    fn run_tar(
        &mut self,
        _selection: &Option<Vec<usize>>,
        _destination: &Destination<'_>,
    ) -> Result<bool> {
        Err(Error::invalid_arguments(
            "tar support is not compiled in (enable the `tar` feature)",
        ))
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("file_type", &self.file_type)
            .field("items", &self.items.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn selected(selection: &Option<Vec<usize>>, index: usize) -> bool {
    match selection {
        Some(indices) => indices.binary_search(&index).is_ok(),
        None => true,
    }
}

fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn nt_time_to_epoch(time: sevenz_rust2::NtTime) -> i64 {
    if u64::from(time) == 0 {
        return 0;
    }
    match std::time::SystemTime::from(time).duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Drains a content reader without delivering its bytes anywhere.
fn drain(content: &mut dyn Read, abort: &AbortHandle) -> Result<()> {
    let mut buf = vec![0u8; settings::decoder_write_size()];
    loop {
        abort.check()?;
        if content.read(&mut buf)? == 0 {
            return Ok(());
        }
    }
}

/// Copies one item's plain bytes to the destination, verifying its CRC.
///
/// Returns `false` when an integrity check fails under [`Destination::Test`].
fn deliver(
    item: &Item,
    content: &mut dyn Read,
    destination: &Destination<'_>,
    tracker: &mut ProgressTracker,
    abort: &AbortHandle,
) -> Result<bool> {
    tracker.begin_item(item.path.as_str());

    if item.is_dir {
        if let Destination::Directory { dir, full_paths } = destination {
            if *full_paths {
                dir.appending(item.path.as_str()).create_dir(true)?;
            }
        }
        tracker.finish_item(0);
        return Ok(true);
    }

    let (sink, target_path): (OutStream, Option<Path>) = match destination {
        Destination::Directory { dir, full_paths } => {
            let relative = if *full_paths {
                item.path.clone()
            } else {
                item.path.last_component()
            };
            let target = dir.appending(relative.as_str());
            target.removing_last_component().create_dir(true)?;
            (OutStream::with_path(target.clone())?, Some(target))
        }
        Destination::Streams(map) => {
            let paired = map
                .iter()
                .find(|(paired, _)| paired.index == item.index)
                .map(|(_, stream)| stream.clone());
            match paired {
                Some(stream) => (stream, None),
                None => {
                    drain(content, abort)?;
                    tracker.finish_item(item.size);
                    return Ok(true);
                }
            }
        }
        Destination::Test => (OutStream::test_sink(), None),
    };

    sink.open()?;
    let mut content = Crc32Reader::new(content);
    let mut written = 0u64;
    let mut buf = vec![0u8; settings::decoder_write_size()];
    let outcome = loop {
        if let Err(e) = abort.check() {
            break Err(e);
        }
        let n = match content.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(Error::Io(e)),
        };
        let mut offset = 0;
        let mut write_failure: Option<Error> = None;
        while offset < n {
            match sink.write(&buf[offset..n]) {
                Ok(step) if step > 0 => offset += step,
                Ok(_) => {
                    write_failure = Some(Error::internal("the out-stream consumed no bytes"));
                    break;
                }
                Err(e) => {
                    write_failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = write_failure {
            break Err(sink.take_error().unwrap_or(e));
        }
        written += n as u64;
        tracker.advance(n as u64);
    };
    sink.close();
    if let Some(stashed) = sink.take_error() {
        return Err(stashed);
    }
    outcome?;

    if item.crc32 != 0 && content.crc() != item.crc32 {
        if matches!(destination, Destination::Test) {
            log::warn!("integrity check failed for '{}'", item.path);
            return Ok(false);
        }
        return Err(Error::CrcMismatch {
            index: item.index,
            path: item.path.as_str().to_string(),
            expected: item.crc32,
            actual: content.crc(),
        });
    }

    if let Some(target) = target_path {
        if item.modification != 0 || item.access != 0 {
            let _ = target.apply_timestamps(item.access, item.modification);
        }
    }
    tracker.finish_item(written.max(item.size));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_decoder_is_empty() {
        let stream = InStream::with_memory(vec![0u8; 16]).unwrap();
        let decoder = Decoder::new(stream, FileType::SevenZ);
        assert_eq!(decoder.count(), 0);
        assert_eq!(decoder.items().len(), 0);
        assert!(decoder.item_at(0).is_err());
    }

    #[test]
    fn test_open_rejects_garbage() {
        let stream = InStream::with_memory(vec![0xAB; 64]).unwrap();
        let mut decoder = Decoder::new(stream, FileType::SevenZ);
        assert!(!decoder.open().unwrap());
    }

    #[test]
    fn test_open_twice_rejected() {
        let stream = InStream::with_memory(vec![0xAB; 64]).unwrap();
        let mut decoder = Decoder::new(stream, FileType::Xz);
        assert!(!decoder.open().unwrap());
        assert!(decoder.open().is_err());
    }

    #[test]
    fn test_extract_requires_open() {
        let stream = InStream::with_memory(vec![0u8; 16]).unwrap();
        let mut decoder = Decoder::new(stream, FileType::SevenZ);
        let err = decoder.extract(&Path::new("/tmp/nowhere"), true).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[cfg(feature = "crypto")]
    #[test]
    fn test_set_password_accepted() {
        let stream = InStream::with_memory(vec![0u8; 16]).unwrap();
        let mut decoder = Decoder::new(stream, FileType::SevenZ);
        decoder.set_password("secret").unwrap();
        let wide: Vec<u16> = "secret".encode_utf16().collect();
        decoder.set_password_wide(&wide).unwrap();
    }

    #[cfg(not(feature = "crypto"))]
    #[test]
    fn test_set_password_rejected_without_crypto() {
        let stream = InStream::with_memory(vec![0u8; 16]).unwrap();
        let mut decoder = Decoder::new(stream, FileType::SevenZ);
        assert!(decoder.set_password("secret").is_err());
    }

    #[test]
    fn test_selected() {
        assert!(selected(&None, 5));
        assert!(selected(&Some(vec![1, 3, 5]), 5));
        assert!(!selected(&Some(vec![1, 3, 5]), 2));
        assert!(!selected(&Some(Vec::new()), 0));
    }

    #[test]
    fn test_nt_time_zero_maps_to_zero() {
        assert_eq!(nt_time_to_epoch(sevenz_rust2::NtTime::from(0u64)), 0);
    }
}
