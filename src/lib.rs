//! # lzarch
//!
//! A library for reading and writing compressed archive containers (7z, xz
//! and tar) over pluggable random-access streams.
//!
//! The crate is an archive I/O engine: it owns the stream abstraction layer
//! (file, memory, callback and concatenated/split-volume sources and sinks),
//! the item data model, the decoder and encoder drivers, and the
//! progress/abort/password contract. The container layouts and the
//! compression math (LZMA, LZMA2, PPMd, BCJ/BCJ2, 7z-AES, xz, tar) are
//! delegated to dedicated codec crates.
//!
//! ## Quick Start
//!
//! ### Extracting an archive
//!
//! ```rust,no_run
//! use lzarch::{Decoder, FileType, InStream, Path, Result};
//!
//! fn main() -> Result<()> {
//!     let stream = InStream::with_path(Path::new("archive.7z"))?;
//!     let mut decoder = Decoder::new(stream, FileType::SevenZ);
//!     if decoder.open()? {
//!         let items = decoder.items();
//!         for item in items.iter() {
//!             println!("{}: {} bytes", item.path, item.size);
//!         }
//!         decoder.extract(&Path::new("./output"), true)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an archive
//!
//! ```rust,no_run
//! use lzarch::{Encoder, FileType, Method, OutStream, Path, Result};
//!
//! fn main() -> Result<()> {
//!     let stream = OutStream::with_path(Path::new("archive.7z"))?;
//!     let mut encoder = Encoder::new(stream, FileType::SevenZ, Method::Lzma2);
//!     encoder.set_compression_level(9)?;
//!     encoder.add_path(&Path::new("documents"))?;
//!     encoder.open()?;
//!     encoder.compress()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Multi-volume output
//!
//! ```rust,no_run
//! use lzarch::{Encoder, FileType, Method, OutMultiStream, PartNameFormat, Path, Result};
//!
//! fn main() -> Result<()> {
//!     let stream = OutMultiStream::with_directory(
//!         Path::new("./volumes"),
//!         "archive",
//!         "7z",
//!         PartNameFormat::NameExt00x,
//!         32 * 1024,
//!     )?;
//!     let mut encoder = Encoder::new(stream.as_out_stream(), FileType::SevenZ, Method::Lzma);
//!     encoder.add_path(&Path::new("big-file.bin"))?;
//!     encoder.open()?;
//!     encoder.compress()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `crypto` | Yes     | AES-256 encryption for 7z content and headers |
//! | `tar`    | Yes     | tar container support |
//!
//! Without `crypto`, [`Decoder::set_password`] and [`Encoder::set_password`]
//! fail with [`Error::InvalidArguments`]. Without `tar`, opening or creating
//! a tar container fails the same way.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Correctable conditions (graceful abort,
//! a structurally invalid container) are reported as `Ok(false)` from the
//! engine methods; faults (I/O, memory, wrong password) are errors.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod item;
pub mod path;
pub mod progress;
pub mod settings;
pub mod stream;

pub use codec::{CodecInfo, FileType, Method};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use item::{Item, ItemArray, ItemOutStreamMap};
pub use path::Path;
pub use progress::{AbortHandle, ProgressDelegate, progress_fn};
pub use stream::{EraseMode, InStream, OutMultiStream, OutStream, PartNameFormat, StreamCallbacks};

/// Returns the library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_non_empty() {
        assert!(!version().is_empty());
        assert!(version().split('.').count() >= 2);
    }
}
