//! Type-erased errors with tracing functionalities.
use crate::SharedString;
use std::{error, fmt};

mod kind;

pub use kind::ErrorKind;

/// A error type backed by an allocation-optimized string.
#[derive(Debug)]
pub struct Error {
    /// Error kind.
    kind: ErrorKind,
    /// Error message.
    message: SharedString,
    /// Error source.
    source: Option<Box<Error>>,
}

impl Error {
    /// Creates a new instance with the supplied message.
    #[inline]
    pub fn new(message: impl Into<SharedString>) -> Self {
        Self {
            kind: ErrorKind::Other,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new instance with the supplied kind and message.
    #[inline]
    pub fn with_kind(kind: ErrorKind, message: impl Into<SharedString>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new instance with the supplied message and the error source.
    #[inline]
    pub fn with_source(message: impl Into<SharedString>, source: impl Into<Error>) -> Self {
        let source = source.into();
        Self {
            kind: source.kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns a new instance with the supplied message and `self` as the error source.
    /// The kind of `self` is preserved.
    #[inline]
    pub fn wrap(self, message: impl Into<SharedString>) -> Self {
        Self {
            kind: self.kind,
            message: message.into(),
            source: Some(Box::new(self)),
        }
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message.
    #[inline]
    pub fn message(&self) -> &str {
        self.message.as_ref()
    }

    /// Returns the source.
    #[inline]
    pub fn source(&self) -> Option<&Error> {
        self.source.as_deref()
    }

    /// Returns `true` if the error should abort construction of the middleware.
    #[inline]
    pub fn is_configuration_error(&self) -> bool {
        self.kind.is_configuration_error()
    }
}

impl<E: error::Error + 'static> From<E> for Error {
    #[inline]
    fn from(err: E) -> Self {
        Self {
            kind: ErrorKind::Other,
            message: err.to_string().into(),
            source: err.source().map(|err| Box::new(Self::new(err.to_string()))),
        }
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = &self.message;
        if let Some(source) = &self.source {
            write!(f, "{message}: {source}")
        } else {
            write!(f, "{message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn it_wraps_error_sources() {
        let err = Error::with_kind(ErrorKind::InvalidCallSite, "call site `a b` is invalid");
        let err = err.wrap("fail to load the `server-timing` config");
        assert_eq!(err.kind(), ErrorKind::InvalidCallSite);
        assert!(err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "fail to load the `server-timing` config: call site `a b` is invalid"
        );
        assert_eq!(
            err.source().map(|source| source.message()),
            Some("call site `a b` is invalid")
        );
    }

    #[test]
    fn it_converts_std_errors() {
        let err = Error::from("x".parse::<u8>().unwrap_err());
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(!err.is_configuration_error());
    }
}
