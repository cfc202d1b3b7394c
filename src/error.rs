//! Error types for archive engine operations.
//!
//! This module provides the [`Error`] enum which represents all failure
//! modes of the engine, along with a convenient [`Result<T>`] type alias.
//!
//! Faults raised by the reused container and codec crates are translated
//! into [`Error`] at the engine boundary, so callers only ever match on one
//! type:
//!
//! ```rust,no_run
//! use lzarch::{Decoder, Error, FileType, InStream, Path};
//!
//! fn open(path: &str) -> lzarch::Result<()> {
//!     let stream = InStream::with_path(Path::new(path))?;
//!     let mut decoder = Decoder::new(stream, FileType::SevenZ);
//!     match decoder.open() {
//!         Ok(true) => println!("{} items", decoder.count()),
//!         Ok(false) => println!("not a valid archive"),
//!         Err(Error::PasswordRequired) => println!("archive is encrypted"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

/// The main error type for archive engine operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system and stream operations |
/// | Usage | [`InvalidArguments`][Self::InvalidArguments] | Bad input to a public call |
/// | Resources | [`NotEnoughMemory`][Self::NotEnoughMemory] | Required size beyond the platform limit |
/// | Format | [`InvalidFormat`][Self::InvalidFormat] | Malformed container data |
/// | Security | [`PasswordRequired`][Self::PasswordRequired], [`WrongPassword`][Self::WrongPassword] | Encrypted content |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch] | Data corruption |
/// | Internal | [`Internal`][Self::Internal], [`Unknown`][Self::Unknown] | Invariant violations, unclassified faults |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during a file or stream operation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad input to a public call.
    ///
    /// Examples: an empty path for a file stream, a zero part size for a
    /// multi-volume stream, a compression level above 9, a password on a
    /// build without the `crypto` feature, an item index out of range.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A required allocation exceeds what the platform can address.
    #[error("not enough memory: {0}")]
    NotEnoughMemory(String),

    /// The container data is malformed or uses an unsupported layout.
    #[error("invalid container: {0}")]
    InvalidFormat(String),

    /// A password is required but none was provided.
    #[error("password required for encrypted content")]
    PasswordRequired,

    /// The provided password does not decrypt the content.
    #[error("{}", WrongPasswordDisplay { path: path.as_deref() })]
    WrongPassword {
        /// Archive path of the entry where the failure was detected, if known.
        path: Option<String>,
    },

    /// The CRC-32 of extracted data does not match the stored value.
    #[error("CRC mismatch for item {index} ({path}): expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// Index of the item that failed verification.
        index: usize,
        /// Archive path of the item.
        path: String,
        /// The CRC-32 stored in the container.
        expected: u32,
        /// The CRC-32 of the extracted bytes.
        actual: u32,
    },

    /// The operation was aborted.
    ///
    /// This variant is an engine-internal sentinel: public methods translate
    /// it into a `false` return value instead of surfacing it.
    #[error("operation aborted")]
    Aborted,

    /// An engine invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),

    /// An unclassified fault.
    #[error("unknown error: {0}")]
    Unknown(String),
}

struct WrongPasswordDisplay<'a> {
    path: Option<&'a str>,
}

impl std::fmt::Display for WrongPasswordDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wrong password")?;
        if let Some(path) = self.path {
            write!(f, " for '{}'", path)?;
        }
        Ok(())
    }
}

impl Error {
    /// Creates an [`Error::InvalidArguments`].
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Error::InvalidArguments(message.into())
    }

    /// Creates an [`Error::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Returns `true` for password-related failures.
    pub fn is_password_error(&self) -> bool {
        matches!(self, Error::PasswordRequired | Error::WrongPassword { .. })
    }

    /// Returns `true` for data corruption failures.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CrcMismatch { .. } | Error::InvalidFormat(_)
        )
    }

    /// Returns `true` if the operation was aborted.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Wraps the error into an [`io::Error`] without losing the value.
    ///
    /// Used when an engine fault has to cross a codec callback boundary
    /// that only understands `io::Error`; the engine recovers the typed
    /// fault on the other side via the stream error stash.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(e) => e,
            Error::Aborted => io::Error::new(io::ErrorKind::Interrupted, "operation aborted"),
            other => io::Error::other(other.to_string()),
        }
    }
}

impl From<sevenz_rust2::Error> for Error {
    fn from(value: sevenz_rust2::Error) -> Self {
        use sevenz_rust2::Error as Sz;
        match value {
            Sz::PasswordRequired => Error::PasswordRequired,
            Sz::MaybeBadPassword(_) => Error::WrongPassword { path: None },
            Sz::Io(e, context) => {
                if e.kind() == io::ErrorKind::Interrupted {
                    Error::Aborted
                } else if context.is_empty() {
                    Error::Io(e)
                } else {
                    Error::Io(io::Error::new(e.kind(), format!("{context}: {e}")))
                }
            }
            Sz::FileOpen(e, name) => Error::Io(io::Error::new(e.kind(), format!("{name}: {e}"))),
            Sz::MaxMemLimited { max_kb, actaul_kb } => Error::NotEnoughMemory(format!(
                "codec needs {actaul_kb} KiB, limit is {max_kb} KiB"
            )),
            Sz::BadSignature(_)
            | Sz::UnsupportedVersion { .. }
            | Sz::BadTerminatedStreamsInfo(_)
            | Sz::BadTerminatedUnpackInfo
            | Sz::BadTerminatedPackInfo(_)
            | Sz::BadTerminatedSubStreamsInfo
            | Sz::BadTerminatedheader(_)
            | Sz::NextHeaderCrcMismatch => Error::InvalidFormat(value.to_string()),
            Sz::ChecksumVerificationFailed => Error::InvalidFormat("checksum verification failed".into()),
            Sz::UnsupportedCompressionMethod(name) => {
                Error::InvalidFormat(format!("unsupported compression method: {name}"))
            }
            Sz::ExternalUnsupported | Sz::Unsupported(_) => Error::InvalidFormat(value.to_string()),
            Sz::FileNotFound => Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found")),
            other => Error::Unknown(other.to_string()),
        }
    }
}

/// A specialized `Result` type for archive engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_invalid_arguments() {
        let err = Error::invalid_arguments("the path is empty");
        assert_eq!(err.to_string(), "invalid arguments: the path is empty");
    }

    #[test]
    fn test_wrong_password_display() {
        let err = Error::WrongPassword { path: None };
        assert_eq!(err.to_string(), "wrong password");
        assert!(err.is_password_error());

        let err = Error::WrongPassword {
            path: Some("secret.txt".into()),
        };
        assert!(err.to_string().contains("secret.txt"));
    }

    #[test]
    fn test_password_required() {
        let err = Error::PasswordRequired;
        assert!(err.is_password_error());
        assert!(err.to_string().contains("password required"));
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = Error::CrcMismatch {
            index: 3,
            path: "a/b.bin".into(),
            expected: 0xDEADBEEF,
            actual: 0xCAFEBABE,
        };
        let msg = err.to_string();
        assert!(msg.contains("item 3"));
        assert!(msg.contains("a/b.bin"));
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("0xcafebabe"));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_aborted_round_trips_through_io() {
        let io_err = Error::Aborted.into_io();
        assert_eq!(io_err.kind(), io::ErrorKind::Interrupted);
        let back: Error = sevenz_rust2::Error::from(io_err).into();
        assert!(back.is_aborted());
    }

    #[test]
    fn test_sevenz_password_mapping() {
        let err: Error = sevenz_rust2::Error::PasswordRequired.into();
        assert!(matches!(err, Error::PasswordRequired));

        let io_err = io::Error::new(io::ErrorKind::InvalidData, "garbage");
        let err: Error = sevenz_rust2::Error::MaybeBadPassword(io_err).into();
        assert!(matches!(err, Error::WrongPassword { .. }));
    }

    #[test]
    fn test_sevenz_structural_mapping() {
        let err: Error = sevenz_rust2::Error::BadSignature([0; 6]).into();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
