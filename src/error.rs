//! Error and Result module.

use std::error::Error as StdError;
use std::fmt;

/// Result type often returned from methods that can have halyard `Error`s.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Represents errors that can occur handling HTTP streams.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// A message failed to parse.
    Parse(ParseError),
    /// A name or value was rejected by a validating header container.
    InvalidHeader,
    /// An aggregated body grew past the configured limit.
    TooLongFrame,
    /// The peer closed while responses were still outstanding.
    PrematureClose { missing: usize },
    /// An `io::Error` from the transport below the codec.
    Io,
    /// The caller misused the API.
    User(User),
}

#[derive(Debug)]
pub(crate) enum User {
    /// A write was attempted while a protocol upgrade was pending.
    WriteWhileUpgrading,
    /// A content frame arrived where a message head was required, or vice
    /// versa.
    UnexpectedFrame,
}

/// A lightweight description of a decode failure.
///
/// The decoder does not raise these as hard errors; it attaches them to the
/// message it was building (see [`DecodeResult`][crate::message::DecodeResult])
/// and moves to the bad-message state. Convert into [`Error`] when a hard
/// failure is wanted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The method token was malformed.
    Method,
    /// The protocol version was malformed.
    Version,
    /// The status code was not a number.
    Status,
    /// The start-line did not have enough parts.
    StartLine,
    /// A header field violated the name or value grammar.
    Header,
    /// The start-line or a header field exceeded a configured limit.
    TooLong,
    /// `Content-Length` was non-numeric, negative, or conflicting.
    ContentLength,
    /// A chunk-size line was not valid hex.
    ChunkSize,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn new_invalid_header() -> Error {
        Error::new(Kind::InvalidHeader)
    }

    pub(crate) fn new_too_long_frame() -> Error {
        Error::new(Kind::TooLongFrame)
    }

    pub(crate) fn new_premature_close(missing: usize) -> Error {
        Error::new(Kind::PrematureClose { missing })
    }

    pub(crate) fn new_user(user: User) -> Error {
        Error::new(Kind::User(user))
    }

    /// Returns true if this was an HTTP parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(_))
    }

    /// Returns true if a validating header container rejected an insertion.
    pub fn is_invalid_header(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidHeader)
    }

    /// Returns true if an aggregated message grew past its configured limit.
    pub fn is_too_long_frame(&self) -> bool {
        matches!(self.inner.kind, Kind::TooLongFrame)
    }

    /// Returns true if the connection closed while responses were still
    /// expected.
    pub fn is_premature_close(&self) -> bool {
        matches!(self.inner.kind, Kind::PrematureClose { .. })
    }

    /// Returns true if this error was caused by user code.
    pub fn is_user(&self) -> bool {
        matches!(self.inner.kind, Kind::User(_))
    }

    /// Returns true if this error came from the transport.
    pub fn is_io(&self) -> bool {
        matches!(self.inner.kind, Kind::Io)
    }

    /// For a premature-close error, the number of responses still owed.
    pub fn missing_responses(&self) -> Option<usize> {
        match self.inner.kind {
            Kind::PrematureClose { missing } => Some(missing),
            _ => None,
        }
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Parse(ref p) => p.description(),
            Kind::InvalidHeader => "invalid header name or value",
            Kind::TooLongFrame => "message content exceeds maximum length",
            Kind::PrematureClose { .. } => "channel closed while awaiting responses",
            Kind::Io => "transport error",
            Kind::User(User::WriteWhileUpgrading) => {
                "write attempted while a protocol upgrade is in progress"
            }
            Kind::User(User::UnexpectedFrame) => "frame received in an unexpected state",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("halyard::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Kind::PrematureClose { missing } = self.inner.kind {
            return write!(f, "channel closed while awaiting {} response(s)", missing);
        }
        f.write_str(self.description())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::new(Kind::Parse(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::new(Kind::Io).with(err)
    }
}

impl ParseError {
    fn description(&self) -> &'static str {
        match *self {
            ParseError::Method => "invalid HTTP method",
            ParseError::Version => "invalid HTTP version",
            ParseError::Status => "invalid HTTP status code",
            ParseError::StartLine => "invalid HTTP start-line",
            ParseError::Header => "invalid HTTP header",
            ParseError::TooLong => "HTTP field exceeds configured limit",
            ParseError::ContentLength => "invalid Content-Length",
            ParseError::ChunkSize => "invalid chunk size line",
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl StdError for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_size_of() {
        assert_eq!(
            std::mem::size_of::<Error>(),
            std::mem::size_of::<usize>(),
            "Error size of pointer size"
        );
    }

    #[test]
    fn predicates() {
        let err: Error = ParseError::Header.into();
        assert!(err.is_parse());
        assert!(!err.is_user());

        let err = Error::new_premature_close(3);
        assert!(err.is_premature_close());
        assert_eq!(err.missing_responses(), Some(3));
        assert_eq!(
            err.to_string(),
            "channel closed while awaiting 3 response(s)"
        );
    }
}
