//! Flat error taxonomy shared across every subsystem.
//!
//! The source organizes errors by throwing a kind + formatted message from
//! wherever the fault is detected; callers match on kind to pick an exit
//! code. `PgbrError` keeps that shape: one enum, one message, a source
//! location captured at construction.

use std::fmt;
use thiserror::Error;

/// Error kind. Mirrors the taxonomy callers use to pick process exit codes
/// and to decide whether a failure is a bug (`AssertError`) versus bad input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AssertError,
    FormatError,
    FileMissingError,
    FileOpenError,
    FileReadError,
    FileWriteError,
    FileCloseError,
    FileSyncError,
    FileRemoveError,
    FileMoveError,
    PathMissingError,
    PathOpenError,
    PathCreateError,
    PathRemoveError,
    PathSyncError,
    PathCloseError,
    CryptoError,
    MemoryError,
    OptionInvalidError,
    OptionRequiredError,
    OptionInvalidValueError,
    CommandInvalidError,
    CommandRequiredError,
    ParamInvalidError,
    ParamRequiredError,
    JsonFormatError,
    VersionNotSupportedError,
    ProtocolError,
    ArchiveMismatchError,
    BackupMismatchError,
    DbConnectError,
    ServiceError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ErrorKind {
    /// Small positive process exit code for this kind. Groups by the
    /// subsystem the kind originates in, per §7's "exit code mapped from
    /// the kind".
    pub fn exit_code(self) -> i32 {
        use ErrorKind::*;
        match self {
            AssertError | MemoryError => 101,
            FormatError | JsonFormatError => 102,
            FileMissingError | PathMissingError => 103,
            FileOpenError | FileReadError | FileWriteError | FileCloseError | FileSyncError
            | FileRemoveError | FileMoveError | PathOpenError | PathCreateError
            | PathRemoveError | PathSyncError | PathCloseError => 104,
            CryptoError => 105,
            OptionInvalidError | OptionRequiredError | OptionInvalidValueError
            | CommandInvalidError | CommandRequiredError | ParamInvalidError
            | ParamRequiredError => 106,
            VersionNotSupportedError | ProtocolError | ArchiveMismatchError
            | BackupMismatchError | DbConnectError | ServiceError => 107,
        }
    }
}

/// A single error value flowing through `Result`s across the crate.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct PgbrError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

impl PgbrError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), file: "", line: 0 }
    }

    /// Attach the call site. Used by the `err!` macro below so
    /// `--log-level-stderr=detail` can append it (§7).
    pub fn at(mut self, file: &'static str, line: u32) -> Self {
        self.file = file;
        self.line = line;
        self
    }

    pub fn detail(&self) -> String {
        if self.file.is_empty() {
            format!("{}: {}", self.kind, self.message)
        } else {
            format!("{}: {}\n    at {}:{}", self.kind, self.message, self.file, self.line)
        }
    }
}

/// Construct a `PgbrError` with the call site already attached.
macro_rules! err {
    ($kind:expr, $($arg:tt)*) => {
        $crate::error::PgbrError::new($kind, format!($($arg)*)).at(file!(), line!())
    };
}
pub(crate) use err;

impl From<std::io::Error> for PgbrError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        let kind = match e.kind() {
            IoKind::NotFound => ErrorKind::FileMissingError,
            IoKind::PermissionDenied => ErrorKind::FileOpenError,
            _ => ErrorKind::FileReadError,
        };
        err!(kind, "{}", e)
    }
}

pub type Result<T> = std::result::Result<T, PgbrError>;
