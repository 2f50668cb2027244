// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A kind tag so the RPC boundary can serialize a numeric wire code (RESPONSE_SLURM_RC)
//    instead of just a string, per the error taxonomy in the spec.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// Error kinds, matching the taxonomy every RPC handler serializes back
/// to RESPONSE_SLURM_RC. `wire_code` is stable across releases; it is
/// what actually crosses the wire, not the Rust enum discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AccessDenied,
    ConstraintViolation,
    AlreadyDone,
    TemporaryFailure,
    ConfigurationError,
    InternalError,
    Shutdown,
}

impl ErrorKind {
    pub fn wire_code(self) -> i32 {
        match self {
            ErrorKind::InvalidInput => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::AccessDenied => 3,
            ErrorKind::ConstraintViolation => 4,
            ErrorKind::AlreadyDone => 5,
            ErrorKind::TemporaryFailure => 6,
            ErrorKind::ConfigurationError => 7,
            ErrorKind::InternalError => 8,
            ErrorKind::Shutdown => 9,
        }
    }

    /// Recoverable kinds may be handled locally (retried or turned into
    /// a no-op); everything else must propagate to the RPC boundary.
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorKind::TemporaryFailure | ErrorKind::AlreadyDone)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "latticed", kind = ?kind, "{:?}", err);
        Error {
            kind,
            inner: DynBacktraceError::from(err),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.inner)
    }
}

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {
    fn description(&self) -> &str {
        &self.0
    }
}

/// Wrap an external error as `ErrorKind::InternalError` — used at
/// library boundaries (e.g. `?` on a `std::io::Error`) where no more
/// specific kind applies.
impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::InternalError, err)
    }
}

pub fn err(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

pub fn invalid_input(msg: impl Into<Cow<'static, str>>) -> Error {
    err(ErrorKind::InvalidInput, msg)
}

pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Error {
    err(ErrorKind::NotFound, msg)
}

pub fn access_denied(msg: impl Into<Cow<'static, str>>) -> Error {
    err(ErrorKind::AccessDenied, msg)
}

pub fn constraint_violation(msg: impl Into<Cow<'static, str>>) -> Error {
    err(ErrorKind::ConstraintViolation, msg)
}

#[test]
fn test_error() {
    let e = invalid_input("test error");
    assert_eq!(e.kind(), ErrorKind::InvalidInput);
    assert_eq!(e.kind().wire_code(), 1);
}

#[test]
fn test_recoverable() {
    assert!(ErrorKind::TemporaryFailure.is_recoverable());
    assert!(!ErrorKind::InternalError.is_recoverable());
}
