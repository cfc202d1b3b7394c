//! Filesystem path type with engine-specific normalization.
//!
//! [`Path`] is a value type holding normalized UTF-8 text. Both `/` and `\`
//! are treated as separators on every platform; normalization rewrites them
//! to the platform separator and collapses runs. A UTF-16 view is produced
//! on demand and always agrees with the UTF-8 view.
//!
//! # Normalization
//!
//! Applied on every mutation:
//!
//! - every run of separators collapses to one platform separator;
//! - a run of two or more separators immediately after a drive prefix
//!   (`X:`) collapses to exactly two, a single one stays single;
//! - a trailing separator collapses to one and is preserved;
//! - the root (`/`, `X:/`) is preserved.
//!
//! ```rust
//! use lzarch::Path;
//!
//! let sep = std::path::MAIN_SEPARATOR;
//! let path = Path::new("a//b\\c");
//! assert_eq!(path.as_str(), format!("a{sep}b{sep}c"));
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;

use crate::error::{Error, Result};

const SEP: char = std::path::MAIN_SEPARATOR;

fn is_sep(c: char) -> bool {
    c == '/' || c == '\\'
}

fn has_drive_prefix(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), Some(':')) if c.is_ascii_alphabetic()
    )
}

fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    if has_drive_prefix(text) {
        out.push_str(&text[..2]);
        rest = &text[2..];
        let run = rest.chars().take_while(|&c| is_sep(c)).count();
        if run >= 2 {
            out.push(SEP);
            out.push(SEP);
        } else if run == 1 {
            out.push(SEP);
        }
        rest = rest.trim_start_matches(is_sep);
    }
    let mut previous_was_sep = false;
    for c in rest.chars() {
        if is_sep(c) {
            if !previous_was_sep {
                out.push(SEP);
            }
            previous_was_sep = true;
        } else {
            out.push(c);
            previous_was_sep = false;
        }
    }
    out
}

/// File metadata as returned by [`Path::stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathStat {
    /// File size in bytes; zero for directories.
    pub size: u64,
    /// Creation time as Unix epoch seconds; zero when unknown.
    pub creation: i64,
    /// Last access time as Unix epoch seconds; zero when unknown.
    pub access: i64,
    /// Last modification time as Unix epoch seconds; zero when unknown.
    pub modification: i64,
}

/// A normalized filesystem path.
///
/// An empty path is legal and denotes "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(String);

impl Path {
    /// Creates a path from UTF-8 text, normalizing it.
    pub fn new(text: &str) -> Self {
        Self(normalize(text))
    }

    /// Creates a path from UTF-16 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the text is not valid UTF-16.
    pub fn from_wide(text: &[u16]) -> Result<Self> {
        let utf8 = String::from_utf16(text)
            .map_err(|_| Error::invalid_arguments("the path is not valid UTF-16"))?;
        Ok(Self::new(&utf8))
    }

    /// Replaces the path content, normalizing the new text.
    pub fn set(&mut self, text: &str) {
        self.0 = normalize(text);
    }

    /// Clears the path.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns the UTF-8 view.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the UTF-16 view.
    pub fn wide(&self) -> Vec<u16> {
        self.0.encode_utf16().collect()
    }

    /// Returns the number of Unicode scalar values.
    pub fn count(&self) -> usize {
        self.0.chars().count()
    }

    /// Returns `true` when the path is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when the path is a filesystem root (`/`, `X:/`).
    pub fn is_root(&self) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let body = if has_drive_prefix(&self.0) {
            &self.0[2..]
        } else {
            &self.0
        };
        body.chars().all(is_sep)
    }

    /// Appends one component, joining with a single separator.
    ///
    /// Appending an empty string is a no-op; appending to an empty path
    /// sets it.
    pub fn append(&mut self, component: &str) {
        if component.is_empty() {
            return;
        }
        if self.0.is_empty() {
            self.0 = normalize(component);
        } else {
            self.0 = normalize(&format!("{}{}{}", self.0, SEP, component));
        }
    }

    /// Returns a copy with one component appended.
    #[must_use]
    pub fn appending(&self, component: &str) -> Self {
        let mut copy = self.clone();
        copy.append(component);
        copy
    }

    /// Returns the last path component.
    ///
    /// A trailing separator is ignored; roots and empty paths yield an
    /// empty path.
    pub fn last_component(&self) -> Self {
        if self.is_empty() || self.is_root() {
            return Self::default();
        }
        let body = self.0.trim_end_matches(is_sep);
        let component = match body.rfind(is_sep) {
            Some(idx) => &body[idx + SEP.len_utf8()..],
            None if has_drive_prefix(body) => &body[2..],
            None => body,
        };
        Self(component.to_string())
    }

    /// Drops the last component and the separator before it.
    ///
    /// A root stays the root; an empty path stays empty; a one-component
    /// relative path becomes empty.
    pub fn remove_last_component(&mut self) {
        if self.is_empty() || self.is_root() {
            return;
        }
        let body: String = self.0.trim_end_matches(is_sep).to_string();
        match body.rfind(is_sep) {
            None => self.0.clear(),
            Some(idx) => {
                let mut run_start = idx;
                while run_start > 0 && body[..run_start].ends_with(is_sep) {
                    run_start -= SEP.len_utf8();
                }
                let prefix = &body[..run_start];
                if prefix.is_empty() {
                    self.0 = SEP.to_string();
                } else if has_drive_prefix(prefix) && prefix.len() == 2 {
                    self.0 = body[..idx + SEP.len_utf8()].to_string();
                } else {
                    self.0 = prefix.to_string();
                }
            }
        }
    }

    /// Returns a copy with the last component dropped.
    #[must_use]
    pub fn removing_last_component(&self) -> Self {
        let mut copy = self.clone();
        copy.remove_last_component();
        copy
    }

    /// Appends a random, unused, filesystem-safe component.
    ///
    /// The component is the base-36 form of 128 bits from the OS random
    /// source, prefixed with a stable letter; generation retries while the
    /// resulting path exists on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the OS random source fails.
    pub fn append_random_component(&mut self) -> Result<()> {
        loop {
            let candidate = self.appending(&random_component()?);
            if candidate.exists().is_none() {
                *self = candidate;
                return Ok(());
            }
        }
    }

    /// Returns a copy with a random, unused component appended.
    pub fn appending_random_component(&self) -> Result<Self> {
        let mut copy = self.clone();
        copy.append_random_component()?;
        Ok(copy)
    }

    /// Returns the temporary directory of the host.
    pub fn tmp_path() -> Self {
        Self::new(&std::env::temp_dir().to_string_lossy())
    }

    /// Queries existence: `None` when absent, `Some(is_dir)` when present.
    pub fn exists(&self) -> Option<bool> {
        if self.0.is_empty() {
            return None;
        }
        fs::metadata(&self.0).ok().map(|m| m.is_dir())
    }

    /// Returns `true` when the path exists and is readable.
    pub fn readable(&self) -> bool {
        match self.exists() {
            Some(true) => fs::read_dir(&self.0).is_ok(),
            Some(false) => File::open(&self.0).is_ok(),
            None => false,
        }
    }

    /// Returns `true` when the path exists and is writable.
    pub fn writable(&self) -> bool {
        match fs::metadata(&self.0) {
            Ok(meta) => !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    /// Returns `true` when the path exists and is both readable and writable.
    pub fn readable_and_writable(&self) -> bool {
        self.readable() && self.writable()
    }

    /// Opens the file for reading in binary mode.
    pub fn open_for_reading(&self) -> Result<File> {
        self.check_non_empty("can't open a file without a path")?;
        File::open(&self.0).map_err(Error::Io)
    }

    /// Opens the file for writing in binary mode, truncating existing content.
    pub fn create_for_writing(&self) -> Result<File> {
        self.check_non_empty("can't create a file without a path")?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.0)
            .map_err(Error::Io)
    }

    /// Opens the existing file for reading and writing without truncation.
    pub fn open_for_updating(&self) -> Result<File> {
        self.check_non_empty("can't open a file without a path")?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.0)
            .map_err(Error::Io)
    }

    /// Creates the directory, with all missing parents when `recursive`.
    pub fn create_dir(&self, recursive: bool) -> Result<()> {
        self.check_non_empty("can't create a directory without a path")?;
        let result = if recursive {
            fs::create_dir_all(&self.0)
        } else {
            fs::create_dir(&self.0)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.exists() == Some(true) => {
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Removes the file, or the directory with its contents.
    ///
    /// Removing a path that does not exist succeeds.
    pub fn remove(&self) -> Result<()> {
        match self.exists() {
            None => Ok(()),
            Some(true) => fs::remove_dir_all(&self.0).map_err(Error::Io),
            Some(false) => fs::remove_file(&self.0).map_err(Error::Io),
        }
    }

    /// Returns size and timestamps of the file or directory.
    pub fn stat(&self) -> Result<PathStat> {
        self.check_non_empty("can't stat without a path")?;
        let meta = fs::metadata(&self.0)?;
        Ok(PathStat {
            size: if meta.is_dir() { 0 } else { meta.len() },
            creation: meta.created().map(system_time_to_epoch).unwrap_or(0),
            access: meta.accessed().map(system_time_to_epoch).unwrap_or(0),
            modification: meta.modified().map(system_time_to_epoch).unwrap_or(0),
        })
    }

    /// Applies access and modification times, as Unix epoch seconds.
    ///
    /// Zero values are replaced with the current time.
    pub fn apply_timestamps(&self, access: i64, modification: i64) -> Result<()> {
        self.check_non_empty("can't apply timestamps without a path")?;
        let now = system_time_to_epoch(SystemTime::now());
        let pick = |value: i64| if value == 0 { now } else { value };
        filetime::set_file_times(
            &self.0,
            FileTime::from_unix_time(pick(access), 0),
            FileTime::from_unix_time(pick(modification), 0),
        )
        .map_err(Error::Io)
    }

    /// Returns a recursive iterator over the directory content.
    pub fn open_dir(&self) -> Result<DirIterator> {
        self.check_non_empty("can't iterate a directory without a path")?;
        if self.exists() != Some(true) {
            return Err(Error::invalid_arguments(format!(
                "'{}' is not a directory",
                self.0
            )));
        }
        Ok(DirIterator {
            root: self.clone(),
            pending: vec![Path::default()],
            current: Vec::new(),
        })
    }

    fn check_non_empty(&self, message: &str) -> Result<()> {
        if self.0.is_empty() {
            Err(Error::invalid_arguments(message))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Path {
    fn from(text: String) -> Self {
        Self::new(&text)
    }
}

impl AsRef<std::path::Path> for Path {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

fn system_time_to_epoch(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

fn random_component() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes)
        .map_err(|e| Error::internal(format!("random source failed: {e}")))?;
    let mut value = u128::from_le_bytes(bytes);
    let mut token = String::with_capacity(28);
    token.push('t');
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    while value > 0 {
        token.push(DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    Ok(token)
}

/// One entry yielded by [`Path::open_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// The entry name.
    pub name: String,
    /// The path relative to the iterated root.
    pub relative: Path,
    /// The full path.
    pub full: Path,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Recursive directory iterator.
///
/// Directories are yielded before their content; iteration order within a
/// directory follows the host.
pub struct DirIterator {
    root: Path,
    pending: Vec<Path>,
    current: Vec<DirEntry>,
}

impl Iterator for DirIterator {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current.pop() {
                if entry.is_dir {
                    self.pending.push(entry.relative.clone());
                }
                return Some(Ok(entry));
            }
            let relative_dir = self.pending.pop()?;
            let full_dir = if relative_dir.is_empty() {
                self.root.clone()
            } else {
                self.root.appending(relative_dir.as_str())
            };
            let read = match fs::read_dir(full_dir.as_str()) {
                Ok(read) => read,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            for dir_entry in read {
                let dir_entry = match dir_entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(Error::Io(e))),
                };
                let name = dir_entry.file_name().to_string_lossy().into_owned();
                let is_dir = match dir_entry.file_type() {
                    Ok(kind) => kind.is_dir(),
                    Err(e) => return Some(Err(Error::Io(e))),
                };
                let relative = if relative_dir.is_empty() {
                    Path::new(&name)
                } else {
                    relative_dir.appending(&name)
                };
                let full = self.root.appending(relative.as_str());
                self.current.push(DirEntry {
                    name,
                    relative,
                    full,
                    is_dir,
                });
            }
        }
    }
}
