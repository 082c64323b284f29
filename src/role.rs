//! The two message kinds and their wire formats.
//!
//! There are two kinds of HTTP/1.x transactions, distinguished by the
//! subject of their start-line: requests carry a [`RequestLine`], responses
//! a [`Status`]. [`MessageKind`] is the seam the decoder, encoder and
//! aggregator use to stay generic over the two; its methods hold the
//! start-line grammar and the RFC 7230 §3.3.3 body classification rules.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::ParseError;
use crate::message::{DecodeResult, MessageHead, RequestLine};
use crate::method::Method;
use crate::status::Status;
use crate::version::Version;

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::message::RequestLine {}
    impl Sealed for crate::status::Status {}
}

/// How much body can follow a message head, before looking at framing
/// headers.
#[doc(hidden)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyMode {
    /// Framing headers decide.
    Readable,
    /// Inherently bodyless (1xx/204/304, HEAD response, …).
    Empty,
    /// Bodyless, and the connection stops being HTTP (CONNECT 2xx).
    EmptyUpgrade,
}

/// A start-line subject: either a request line or a response status.
///
/// Implemented by [`RequestLine`] and [`Status`] only; this trait is sealed.
pub trait MessageKind: sealed::Sealed + Sized + Clone + fmt::Debug {
    #[doc(hidden)]
    const IS_REQUEST: bool;

    /// Parses a start-line (without its CRLF) into version and subject.
    #[doc(hidden)]
    fn parse_initial(line: &[u8]) -> Result<(Version, Self), ParseError>;

    /// Writes the start-line including its CRLF.
    #[doc(hidden)]
    fn write_initial(head: &MessageHead<Self>, dst: &mut BytesMut);

    /// The placeholder head emitted when a message fails before its
    /// start-line parsed.
    #[doc(hidden)]
    fn invalid_head(err: ParseError) -> MessageHead<Self>;

    /// Head-based body classification, before framing headers are
    /// consulted. Responses need the method of the request they answer.
    #[doc(hidden)]
    fn body_mode(head: &MessageHead<Self>, request_method: Option<&Method>) -> BodyMode;
}

impl MessageKind for RequestLine {
    const IS_REQUEST: bool = true;

    fn parse_initial(line: &[u8]) -> Result<(Version, RequestLine), ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::StartLine)?;
        let (a, b, c) = split_initial(line).ok_or(ParseError::StartLine)?;
        let method = Method::from_token(a)?;
        if b.is_empty() {
            return Err(ParseError::StartLine);
        }
        let version = Version::parse(c)?;
        Ok((version, RequestLine(method, b.to_owned())))
    }

    fn write_initial(head: &MessageHead<RequestLine>, dst: &mut BytesMut) {
        let RequestLine(ref method, ref uri) = head.subject;
        dst.put_slice(method.as_str().as_bytes());
        dst.put_u8(b' ');
        write_request_target(method, uri, dst);
        dst.put_u8(b' ');
        dst.put_slice(head.version.to_string().as_bytes());
        dst.put_slice(b"\r\n");
    }

    fn invalid_head(err: ParseError) -> MessageHead<RequestLine> {
        MessageHead {
            version: Version::HTTP_10,
            subject: RequestLine(Method::Get, "/bad-request".to_owned()),
            headers: crate::header::Headers::new(),
            decode_result: DecodeResult::Failure(err),
        }
    }

    fn body_mode(_head: &MessageHead<RequestLine>, _request_method: Option<&Method>) -> BodyMode {
        // a request body is purely a matter of framing headers
        BodyMode::Readable
    }
}

impl MessageKind for Status {
    const IS_REQUEST: bool = false;

    fn parse_initial(line: &[u8]) -> Result<(Version, Status), ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::StartLine)?;
        let (a, b, c) = split_initial(line).ok_or(ParseError::StartLine)?;
        let version = Version::parse(a)?;
        let code: u16 = b.parse().map_err(|_| ParseError::Status)?;
        let status = Status::new(code);
        let status = if status.reason() == c {
            status
        } else {
            Status::with_reason(code, c.to_owned())
        };
        Ok((version, status))
    }

    fn write_initial(head: &MessageHead<Status>, dst: &mut BytesMut) {
        dst.put_slice(head.version.to_string().as_bytes());
        dst.put_u8(b' ');
        let mut buf = itoa::Buffer::new();
        dst.put_slice(buf.format(head.subject.code()).as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(head.subject.reason().as_bytes());
        dst.put_slice(b"\r\n");
    }

    fn invalid_head(err: ParseError) -> MessageHead<Status> {
        MessageHead {
            version: Version::HTTP_10,
            subject: Status::with_reason(999, "Unknown"),
            headers: crate::header::Headers::new(),
            decode_result: DecodeResult::Failure(err),
        }
    }

    fn body_mode(head: &MessageHead<Status>, request_method: Option<&Method>) -> BodyMode {
        let code = head.subject.code();
        if let Some(method) = request_method {
            if *method == Method::Head {
                return BodyMode::Empty;
            }
            if *method == Method::Connect && head.subject.is_success() {
                return BodyMode::EmptyUpgrade;
            }
        }
        match code {
            100..=199 | 204 | 304 => BodyMode::Empty,
            _ => BodyMode::Readable,
        }
    }
}

/// Splits a start-line into its three parts.
///
/// Parts are separated by runs of SP/HT. The third part runs to the end of
/// the line, so a response reason phrase may be empty or contain spaces.
fn split_initial(line: &str) -> Option<(&str, &str, &str)> {
    let a_start = line.find(|c| c != ' ' && c != '\t')?;
    let rest = &line[a_start..];
    let a_end = rest.find(|c| c == ' ' || c == '\t').unwrap_or(rest.len());
    let a = &rest[..a_end];

    let rest = &rest[a_end..];
    let b_start = rest.find(|c| c != ' ' && c != '\t')?;
    let rest = &rest[b_start..];
    let b_end = rest.find(|c| c == ' ' || c == '\t').unwrap_or(rest.len());
    let b = &rest[..b_end];

    let rest = &rest[b_end..];
    let c = match rest.find(|c| c != ' ' && c != '\t') {
        Some(c_start) => rest[c_start..].trim_end_matches(|c| c == ' ' || c == '\t'),
        None => "",
    };

    Some((a, b, c))
}

/// Writes a request-target, normalizing the shapes RFC 7230 tolerates.
///
/// An empty target becomes `/`. An absolute-form URL with no path segment
/// gains `/` ahead of any query. A bare path gains a leading `/`. CONNECT
/// targets (authority form) and `*` (asterisk form) pass through verbatim.
fn write_request_target(method: &Method, uri: &str, dst: &mut BytesMut) {
    if uri.is_empty() {
        dst.put_u8(b'/');
        return;
    }
    if *method == Method::Connect || uri == "*" {
        dst.put_slice(uri.as_bytes());
        return;
    }
    if let Some(scheme_end) = uri.find("://") {
        let after_scheme = scheme_end + 3;
        let authority_end = uri[after_scheme..]
            .find(|c| c == '/' || c == '?')
            .map(|i| after_scheme + i);
        match authority_end {
            Some(i) if uri.as_bytes()[i] == b'/' => dst.put_slice(uri.as_bytes()),
            Some(i) => {
                // absolute-form with a query but no path
                dst.put_slice(uri[..i].as_bytes());
                dst.put_u8(b'/');
                dst.put_slice(uri[i..].as_bytes());
            }
            None => {
                dst.put_slice(uri.as_bytes());
                dst.put_u8(b'/');
            }
        }
        return;
    }
    if !uri.starts_with('/') {
        dst.put_u8(b'/');
    }
    dst.put_slice(uri.as_bytes());
}
