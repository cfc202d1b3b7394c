//! Container and method catalog, one-time engine initialization.
//!
//! The catalog binds the numeric 7z codec ids to their capabilities so the
//! engine (and its callers) can query what a build supports. The engine
//! composes dedicated crates for the actual byte work; the catalog is the
//! registry the drivers consult.

use std::sync::OnceLock;

use crate::checksum::{Checksum, Crc32, Crc64};
use crate::error::{Error, Result};

/// Supported archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FileType {
    /// 7-Zip container.
    SevenZ,
    /// xz container (single compressed stream).
    Xz,
    /// tar container (uncompressed).
    Tar,
}

impl FileType {
    /// Returns the canonical name of the container.
    pub fn name(&self) -> &'static str {
        match self {
            FileType::SevenZ => "7z",
            FileType::Xz => "xz",
            FileType::Tar => "tar",
        }
    }

    /// Returns the conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::SevenZ => "7z",
            FileType::Xz => "xz",
            FileType::Tar => "tar",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compression methods accepted by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Method {
    /// LZMA.
    Lzma,
    /// LZMA2.
    Lzma2,
    /// PPMd (7z variant H).
    Ppmd,
}

impl Method {
    /// Returns the canonical name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Lzma => "LZMA",
            Method::Lzma2 => "LZMA2",
            Method::Ppmd => "PPMd",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Container signatures.
pub mod signature {
    /// 7z signature at offset 0.
    pub const SEVEN_Z: [u8; 6] = [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];
    /// xz signature at offset 0.
    pub const XZ: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];
    /// tar `ustar` magic, found at [`TAR_MAGIC_OFFSET`].
    pub const TAR_MAGIC: [u8; 5] = *b"ustar";
    /// Offset of the tar magic inside the first header block.
    pub const TAR_MAGIC_OFFSET: usize = 257;
}

/// Sniffs the container type from the first bytes of a source.
///
/// `prefix` should hold at least the first 512 bytes for tar detection;
/// shorter prefixes can still detect 7z and xz.
pub fn detect_file_type(prefix: &[u8]) -> Option<FileType> {
    if prefix.starts_with(&signature::SEVEN_Z) {
        return Some(FileType::SevenZ);
    }
    if prefix.starts_with(&signature::XZ) {
        return Some(FileType::Xz);
    }
    let magic_end = signature::TAR_MAGIC_OFFSET + signature::TAR_MAGIC.len();
    if prefix.len() >= magic_end
        && prefix[signature::TAR_MAGIC_OFFSET..magic_end] == signature::TAR_MAGIC
    {
        return Some(FileType::Tar);
    }
    None
}

/// One entry of the codec catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    /// Numeric 7z method id.
    pub id: u64,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether this build can decode the method.
    pub decoder: bool,
    /// Whether this build can encode the method.
    pub encoder: bool,
}

const CODECS: &[CodecInfo] = &[
    CodecInfo { id: 0x00, name: "Copy", decoder: true, encoder: false },
    CodecInfo { id: 0x03_01_01, name: "LZMA", decoder: true, encoder: true },
    CodecInfo { id: 0x21, name: "LZMA2", decoder: true, encoder: true },
    CodecInfo { id: 0x03_04_01, name: "PPMd", decoder: true, encoder: true },
    CodecInfo { id: 0x03_03_01_03, name: "BCJ", decoder: true, encoder: false },
    CodecInfo { id: 0x03_03_01_1B, name: "BCJ2", decoder: true, encoder: false },
    CodecInfo {
        id: 0x06_F1_07_01,
        name: "7zAES",
        decoder: cfg!(feature = "crypto"),
        encoder: cfg!(feature = "crypto"),
    },
    CodecInfo {
        id: 0x06_F0_01_81,
        name: "AES-256-CBC",
        decoder: cfg!(feature = "crypto"),
        encoder: cfg!(feature = "crypto"),
    },
];

/// Returns the catalog of known codecs.
pub fn codecs() -> &'static [CodecInfo] {
    CODECS
}

/// Looks up a codec by its numeric 7z method id.
pub fn codec_by_id(id: u64) -> Option<&'static CodecInfo> {
    CODECS.iter().find(|info| info.id == id)
}

const _: () = {
    assert!(size_of::<u64>() == 8);
    assert!(size_of::<i64>() == size_of::<u64>());
};

/// Runs the idempotent one-time engine initialization.
///
/// Warms the CRC-32 and CRC-64 tables so the first real operation pays no
/// lazy-init cost mid-stream. Called at the start of every engine
/// operation.
pub(crate) fn initialize() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let warmup = [0xA5u8; 64];
        let _ = Crc32::compute(&warmup);
        let _ = Crc64::compute(&warmup);
        log::debug!("engine initialized: {} codecs registered", CODECS.len());
    });
}

/// Rejects configurations that this build cannot satisfy.
pub(crate) fn check_file_type_supported(file_type: FileType) -> Result<()> {
    match file_type {
        FileType::Tar if cfg!(not(feature = "tar")) => Err(Error::invalid_arguments(
            "tar support is not compiled in (enable the `tar` feature)",
        )),
        _ => Ok(()),
    }
}
