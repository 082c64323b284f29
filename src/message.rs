//! The typed HTTP/1.x message stream.
//!
//! A message travels as a head ([`MessageHead`]) followed by zero or more
//! body chunks ([`Content`]) and exactly one terminator ([`LastContent`]).
//! [`Frame`] is the item type stages exchange; [`FullMessage`] is a whole
//! message after aggregation.

use bytes::Bytes;

use crate::error::ParseError;
use crate::header::Headers;
use crate::method::Method;
use crate::status::Status;
use crate::version::Version;

/// The outcome the decoder attached to an emitted message.
///
/// A failed message is still delivered, and downstream stages decide whether
/// to propagate or drop it, but no further frames follow it until the decoder
/// is reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeResult {
    /// The message parsed cleanly (so far).
    Success,
    /// The message violated the grammar or a configured limit.
    Failure(ParseError),
}

impl DecodeResult {
    /// Whether decoding succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, DecodeResult::Success)
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<ParseError> {
        match *self {
            DecodeResult::Success => None,
            DecodeResult::Failure(err) => Some(err),
        }
    }
}

/// An HTTP message head: start-line plus headers.
///
/// The subject is what distinguishes a request from a response: a
/// [`RequestLine`] or a [`Status`].
#[derive(Clone, Debug, PartialEq)]
pub struct MessageHead<S> {
    /// The protocol version of the start-line.
    pub version: Version,
    /// The request line or status of this message.
    pub subject: S,
    /// The header fields.
    pub headers: Headers,
    /// The decoder's verdict; always `Success` for locally built messages.
    pub decode_result: DecodeResult,
}

/// The method and request-target of a request start-line.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestLine(
    /// The request method.
    pub Method,
    /// The request-target.
    pub String,
);

/// An incoming or outgoing request head.
pub type RequestHead = MessageHead<RequestLine>;

/// An incoming or outgoing response head.
pub type ResponseHead = MessageHead<Status>;

impl<S> MessageHead<S> {
    /// Creates a head with the given subject, `HTTP/1.1`, and empty headers.
    pub fn new(subject: S) -> MessageHead<S> {
        MessageHead {
            version: Version::HTTP_11,
            subject,
            headers: Headers::new(),
            decode_result: DecodeResult::Success,
        }
    }
}

impl RequestHead {
    /// The request method.
    pub fn method(&self) -> &Method {
        &self.subject.0
    }

    /// The request-target.
    pub fn uri(&self) -> &str {
        &self.subject.1
    }
}

impl ResponseHead {
    /// The response status.
    pub fn status(&self) -> &Status {
        &self.subject
    }
}

/// One chunk of message body.
///
/// The payload is a reference-counted [`Bytes`]; duplicating shares the
/// underlying storage, dropping the last holder releases it.
#[derive(Clone, Debug, PartialEq)]
pub struct Content {
    data: Bytes,
}

impl Content {
    /// Wraps a payload.
    pub fn new(data: Bytes) -> Content {
        Content { data }
    }

    /// The payload bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A deep copy with its own storage.
    pub fn copy(&self) -> Content {
        Content {
            data: Bytes::copy_from_slice(&self.data),
        }
    }

    /// A view sharing this chunk's storage and reference count.
    pub fn duplicate(&self) -> Content {
        self.clone()
    }

    /// Replaces the payload, keeping nothing else (there is nothing else).
    pub fn replace_content(self, data: Bytes) -> Content {
        Content { data }
    }

    /// Unwraps the payload.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Bytes> for Content {
    fn from(data: Bytes) -> Content {
        Content { data }
    }
}

impl From<&'static str> for Content {
    fn from(data: &'static str) -> Content {
        Content {
            data: Bytes::from_static(data.as_bytes()),
        }
    }
}

/// The terminator of a message body, optionally carrying trailing headers.
#[derive(Clone, Debug, PartialEq)]
pub struct LastContent {
    data: Bytes,
    trailers: Headers,
    /// The decoder's verdict when this terminator reports a mid-body
    /// failure; `Success` otherwise.
    pub decode_result: DecodeResult,
}

impl LastContent {
    /// The empty terminator: no payload, no trailing headers.
    pub const EMPTY: LastContent = LastContent {
        data: Bytes::new(),
        trailers: Headers::EMPTY,
        decode_result: DecodeResult::Success,
    };

    /// Creates a terminator with payload and trailing headers.
    pub fn new(data: Bytes, trailers: Headers) -> LastContent {
        LastContent {
            data,
            trailers,
            decode_result: DecodeResult::Success,
        }
    }

    pub(crate) fn failed(err: ParseError) -> LastContent {
        LastContent {
            data: Bytes::new(),
            trailers: Headers::EMPTY,
            decode_result: DecodeResult::Failure(err),
        }
    }

    /// The payload bytes, usually empty.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The trailing headers.
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    /// A deep copy with its own storage.
    pub fn copy(&self) -> LastContent {
        LastContent {
            data: Bytes::copy_from_slice(&self.data),
            trailers: self.trailers.clone(),
            decode_result: self.decode_result.clone(),
        }
    }

    /// A view sharing this terminator's payload storage.
    pub fn duplicate(&self) -> LastContent {
        self.clone()
    }

    /// Unwraps into payload and trailers.
    pub fn into_parts(self) -> (Bytes, Headers) {
        (self.data, self.trailers)
    }
}

/// One item of the typed message stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame<S> {
    /// A request or response head.
    Head(MessageHead<S>),
    /// A chunk of body.
    Chunk(Content),
    /// The body terminator.
    End(LastContent),
    /// Opaque bytes after a protocol upgrade; no longer HTTP.
    Raw(Bytes),
}

impl<S> Frame<S> {
    /// Whether this frame is a message head.
    pub fn is_head(&self) -> bool {
        matches!(self, Frame::Head(_))
    }

    /// Whether this frame terminates a message.
    pub fn is_end(&self) -> bool {
        matches!(self, Frame::End(_))
    }

    /// The head, if this frame is one.
    pub fn head(&self) -> Option<&MessageHead<S>> {
        match self {
            Frame::Head(head) => Some(head),
            _ => None,
        }
    }
}

/// A whole message: head, body, and trailing headers.
///
/// The aggregator guarantees `Content-Length` reflects the body size on
/// every message it emits.
#[derive(Clone, Debug, PartialEq)]
pub struct FullMessage<S> {
    /// The message head.
    pub head: MessageHead<S>,
    /// The complete body.
    pub body: Bytes,
    /// Trailing headers collected from the terminator.
    pub trailers: Headers,
}

/// An aggregated request.
pub type FullRequest = FullMessage<RequestLine>;

/// An aggregated response.
pub type FullResponse = FullMessage<Status>;

impl<S> FullMessage<S> {
    /// Creates a full message with an empty body and no trailers.
    pub fn new(head: MessageHead<S>) -> FullMessage<S> {
        FullMessage {
            head,
            body: Bytes::new(),
            trailers: Headers::EMPTY,
        }
    }

    /// A deep copy: head cloned, body copied into fresh storage.
    pub fn copy(&self) -> FullMessage<S>
    where
        S: Clone,
    {
        FullMessage {
            head: self.head.clone(),
            body: Bytes::copy_from_slice(&self.body),
            trailers: self.trailers.clone(),
        }
    }

    /// A view sharing this message's body storage.
    pub fn duplicate(&self) -> FullMessage<S>
    where
        S: Clone,
    {
        self.clone()
    }

    /// Replaces the body, leaving head and trailers in place.
    ///
    /// The caller is responsible for any `Content-Length` fixup.
    pub fn replace_content(mut self, body: Bytes) -> FullMessage<S> {
        self.body = body;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_duplicate_shares_storage() {
        let content = Content::new(Bytes::from(vec![1u8, 2, 3]));
        let dup = content.duplicate();
        assert_eq!(content.data().as_ptr(), dup.data().as_ptr());

        let copy = content.copy();
        assert_ne!(content.data().as_ptr(), copy.data().as_ptr());
        assert_eq!(content, copy);
    }

    #[test]
    fn last_content_empty() {
        assert!(LastContent::EMPTY.data().is_empty());
        assert!(LastContent::EMPTY.trailers().is_empty());
        assert!(LastContent::EMPTY.decode_result.is_success());
    }

    #[test]
    fn head_accessors() {
        let head = MessageHead::new(RequestLine(Method::Get, "/hello".to_owned()));
        assert_eq!(*head.method(), Method::Get);
        assert_eq!(head.uri(), "/hello");
        assert_eq!(head.version, Version::HTTP_11);
    }
}
