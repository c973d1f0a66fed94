// SPDX-License-Identifier: Apache-2.0

use thiserror::Error as DeriveError;

/// Domain-independent error codes a module can report in addition to a raw
/// `errno`. Kept deliberately small and closed, mirroring the narrow set of
/// conditions the kernel itself needs to reason about (as opposed to every
/// possible module-specific failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveError)]
pub enum ErrorCode {
    #[error("out of memory")]
    OutOfMemory,
    #[error("module registration limit exceeded")]
    ModuleLimitExceeded,
    #[error("operation requires an irrevocable transaction")]
    IrrevocabilityRequired,
    #[error("transaction is not in a state that permits this operation")]
    InvalidState,
    #[error("other error")]
    Other,
}

/// The three kinds of failure the kernel distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveError)]
pub enum ErrorKind {
    #[error("conflict with transaction {0:?}")]
    Conflicting(Option<u64>),
    #[error("error code: {0}")]
    ErrorCode(ErrorCode),
    #[error("errno: {0}")]
    Errno(i32),
}

/// The tagged error value carried by every fallible kernel call.
///
/// A `Conflicting` kind never reaches user code: the retry loop in
/// [`crate::atomically`] intercepts it and restarts the transaction.
/// `ErrorCode` and `Errno` are forwarded to the caller's recovery branch.
/// `non_recoverable` is set when undoing the side effect that produced this
/// error is itself impossible (a failed teardown callback, for instance); the
/// driver treats that as fatal rather than attempting a rollback it cannot
/// trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub non_recoverable: bool,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.non_recoverable {
            write!(f, " (non-recoverable)")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn conflicting(other_tx: Option<u64>) -> Self {
        Error {
            kind: ErrorKind::Conflicting(other_tx),
            non_recoverable: false,
        }
    }

    pub fn code(code: ErrorCode) -> Self {
        Error {
            kind: ErrorKind::ErrorCode(code),
            non_recoverable: false,
        }
    }

    pub fn errno(errno: i32) -> Self {
        Error {
            kind: ErrorKind::Errno(errno),
            non_recoverable: false,
        }
    }

    pub fn mark_as_non_recoverable(mut self) -> Self {
        self.non_recoverable = true;
        self
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, ErrorKind::Conflicting(_))
    }

    pub fn is_non_recoverable(&self) -> bool {
        self.non_recoverable
    }

    pub fn status(&self) -> ErrorKind {
        self.kind
    }

    pub fn as_error_code(&self) -> Option<ErrorCode> {
        match self.kind {
            ErrorKind::ErrorCode(code) => Some(code),
            _ => None,
        }
    }

    pub fn as_errno(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Errno(errno) => Some(errno),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
