//! The outbound message serializer.
//!
//! [`Encoder`] is the complement of the decoder: it turns the typed frame
//! stream back into wire bytes, choosing framing per message from its
//! headers (`Content-Length` vs. `Transfer-Encoding: chunked`) and holding
//! that choice in a small state machine until the terminator returns it to
//! idle.

use std::fmt::{self, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{Error, Result, User};
use crate::header::{names, Headers};
use crate::headers::is_transfer_encoding_chunked;
use crate::message::{Content, Frame, FullMessage, LastContent, MessageHead, RequestLine};
use crate::role::{BodyMode, MessageKind};
use crate::status::Status;

/// Serializes requests, as a client.
pub type RequestEncoder = Encoder<RequestLine>;

/// Serializes responses, as a server.
pub type ResponseEncoder = Encoder<Status>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EncodeState {
    Init,
    ContentNonChunk,
    ContentChunk,
    ContentAlwaysEmpty,
}

/// A stateful HTTP/1.x message serializer.
#[derive(Debug)]
pub struct Encoder<S: MessageKind> {
    state: EncodeState,
    max_chunk_size: Option<usize>,
    body_always_empty_next: bool,
    auto_date: bool,
    _kind: std::marker::PhantomData<fn(S)>,
}

impl<S: MessageKind> Encoder<S> {
    /// Creates an idle encoder.
    pub fn new() -> Encoder<S> {
        Encoder {
            state: EncodeState::Init,
            max_chunk_size: None,
            body_always_empty_next: false,
            auto_date: false,
            _kind: std::marker::PhantomData,
        }
    }

    /// Caps the size of emitted chunks; larger payloads are split.
    pub fn set_max_chunk_size(&mut self, max: usize) {
        self.max_chunk_size = Some(max);
    }

    /// Marks the next message head as having an inherently empty body even
    /// if its headers advertise one. The combined server codec uses this
    /// for responses to HEAD and to a successful CONNECT.
    pub fn set_body_always_empty(&mut self) {
        self.body_always_empty_next = true;
    }

    /// Whether the encoder is between messages.
    pub fn is_idle(&self) -> bool {
        self.state == EncodeState::Init
    }

    /// Serializes one frame onto `dst`.
    pub fn encode(&mut self, frame: Frame<S>, dst: &mut BytesMut) -> Result<()> {
        match frame {
            Frame::Head(head) => self.encode_head(head, dst),
            Frame::Chunk(content) => self.encode_chunk(content, dst),
            Frame::End(last) => self.encode_end(last, dst),
            // post-upgrade traffic passes through untouched
            Frame::Raw(bytes) => {
                dst.put_slice(&bytes);
                Ok(())
            }
        }
    }

    /// Serializes a whole message: head, body, terminator.
    pub fn encode_full(&mut self, msg: FullMessage<S>, dst: &mut BytesMut) -> Result<()> {
        let FullMessage {
            head,
            body,
            trailers,
        } = msg;
        self.encode(Frame::Head(head), dst)?;
        if !body.is_empty() {
            self.encode(Frame::Chunk(Content::new(body)), dst)?;
        }
        self.encode(Frame::End(LastContent::new(Bytes::new(), trailers)), dst)
    }

    fn encode_head(&mut self, head: MessageHead<S>, dst: &mut BytesMut) -> Result<()> {
        if self.state != EncodeState::Init {
            return Err(Error::new_user(User::UnexpectedFrame));
        }

        S::write_initial(&head, dst);
        write_headers(&head.headers, dst);
        if !S::IS_REQUEST && self.auto_date && !head.headers.contains(names::DATE) {
            dst.put_slice(b"Date: ");
            crate::date::extend(dst);
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");

        let always_empty = std::mem::replace(&mut self.body_always_empty_next, false)
            || S::body_mode(&head, None) != BodyMode::Readable;
        self.state = if always_empty {
            EncodeState::ContentAlwaysEmpty
        } else if is_transfer_encoding_chunked(&head.headers) {
            EncodeState::ContentChunk
        } else {
            EncodeState::ContentNonChunk
        };
        trace!("encoded head, state={:?}", self.state);
        Ok(())
    }

    fn encode_chunk(&mut self, content: Content, dst: &mut BytesMut) -> Result<()> {
        match self.state {
            EncodeState::Init => Err(Error::new_user(User::UnexpectedFrame)),
            EncodeState::ContentNonChunk => {
                dst.put_slice(content.data());
                Ok(())
            }
            EncodeState::ContentChunk => {
                self.write_chunked(content.data(), dst);
                Ok(())
            }
            EncodeState::ContentAlwaysEmpty => {
                trace!("dropping {} body bytes of bodyless message", content.len());
                Ok(())
            }
        }
    }

    fn encode_end(&mut self, last: LastContent, dst: &mut BytesMut) -> Result<()> {
        match self.state {
            EncodeState::Init => return Err(Error::new_user(User::UnexpectedFrame)),
            EncodeState::ContentNonChunk => {
                dst.put_slice(last.data());
            }
            EncodeState::ContentChunk => {
                self.write_chunked(last.data(), dst);
                dst.put_slice(b"0\r\n");
                write_headers(last.trailers(), dst);
                dst.put_slice(b"\r\n");
            }
            EncodeState::ContentAlwaysEmpty => (),
        }
        self.state = EncodeState::Init;
        Ok(())
    }

    // hex-size CRLF payload CRLF, split per max_chunk_size; an empty
    // payload writes nothing, a bare "0\r\n" mid-stream would end the body
    fn write_chunked(&self, mut data: &[u8], dst: &mut BytesMut) {
        while !data.is_empty() {
            let n = match self.max_chunk_size {
                Some(max) => std::cmp::min(max, data.len()),
                None => data.len(),
            };
            let (chunk, rest) = data.split_at(n);
            write!(BytesWriter(dst), "{:X}\r\n", chunk.len())
                .expect("fmt onto BytesMut cannot fail");
            dst.put_slice(chunk);
            dst.put_slice(b"\r\n");
            data = rest;
        }
    }
}

impl<S: MessageKind> Default for Encoder<S> {
    fn default() -> Encoder<S> {
        Encoder::new()
    }
}

impl ResponseEncoder {
    /// Appends a `Date` header to responses that lack one, from a cached
    /// once-per-second IMF-fixdate snapshot.
    pub fn set_auto_date(&mut self, enabled: bool) {
        self.auto_date = enabled;
    }
}

/// Writes `name ": " value CRLF` for every entry. Header text is US-ASCII;
/// non-ASCII octets in a value are replaced with `?`.
fn write_headers(headers: &Headers, dst: &mut BytesMut) {
    for (name, value) in headers {
        dst.put_slice(name.as_str().as_bytes());
        dst.put_slice(b": ");
        let bytes = value.as_bytes();
        if bytes.is_ascii() {
            dst.put_slice(bytes);
        } else {
            for &b in bytes {
                dst.put_u8(if b < 0x80 { b } else { b'?' });
            }
        }
        dst.put_slice(b"\r\n");
    }
}

struct BytesWriter<'a>(&'a mut BytesMut);

impl fmt::Write for BytesWriter<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_slice(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DecodeResult, RequestHead, ResponseHead};
    use crate::method::Method;
    use crate::version::Version;

    fn request_head(method: Method, uri: &str) -> RequestHead {
        MessageHead::new(RequestLine(method, uri.to_owned()))
    }

    fn response_head(status: Status) -> ResponseHead {
        MessageHead::new(status)
    }

    #[test]
    fn encode_simple_request() {
        let mut head = request_head(Method::Get, "/hello");
        head.headers.add("Host", "example.com").unwrap();

        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::End(LastContent::EMPTY), &mut dst)
            .unwrap();

        assert_eq!(&dst[..], b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n".as_ref());
        assert!(encoder.is_idle());
    }

    #[test]
    fn encode_response_with_content_length() {
        let mut head = response_head(Status::OK);
        head.headers.set("Content-Length", 5u64).unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("hello")), &mut dst)
            .unwrap();
        encoder
            .encode(Frame::End(LastContent::EMPTY), &mut dst)
            .unwrap();

        assert_eq!(
            &dst[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".as_ref()
        );
    }

    #[test]
    fn encode_chunked_body() {
        let mut head = response_head(Status::OK);
        head.headers.set("Transfer-Encoding", "chunked").unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("foo bar")), &mut dst)
            .unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("baz quux herp")), &mut dst)
            .unwrap();
        encoder
            .encode(Frame::End(LastContent::EMPTY), &mut dst)
            .unwrap();

        let expected = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              7\r\nfoo bar\r\nD\r\nbaz quux herp\r\n0\r\n\r\n";
        assert_eq!(&dst[..], expected.as_ref());
    }

    #[test]
    fn encode_chunked_trailers() {
        let mut head = response_head(Status::OK);
        head.headers.set("Transfer-Encoding", "chunked").unwrap();

        let mut trailers = Headers::new();
        trailers.add("X-Checksum", "abcd").unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(
                Frame::End(LastContent::new(Bytes::from_static(b"tail"), trailers)),
                &mut dst,
            )
            .unwrap();

        let expected = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              4\r\ntail\r\n0\r\nX-Checksum: abcd\r\n\r\n";
        assert_eq!(&dst[..], expected.as_ref());
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut head = response_head(Status::OK);
        head.headers.set("Transfer-Encoding", "chunked").unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        let before = dst.len();
        encoder
            .encode(Frame::Chunk(Content::new(Bytes::new())), &mut dst)
            .unwrap();
        assert_eq!(dst.len(), before, "empty chunk must not write 0\\r\\n");
    }

    #[test]
    fn max_chunk_size_splits_writes() {
        let mut head = response_head(Status::OK);
        head.headers.set("Transfer-Encoding", "chunked").unwrap();

        let mut encoder = ResponseEncoder::new();
        encoder.set_max_chunk_size(4);
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("abcdefghij")), &mut dst)
            .unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.ends_with("4\r\nabcd\r\n4\r\nefgh\r\n2\r\nij\r\n"));
    }

    #[test]
    fn bodyless_status_drops_payload() {
        let mut head = response_head(Status::new(304));
        head.headers.set("Content-Length", 10u64).unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("should vanish")), &mut dst)
            .unwrap();
        encoder
            .encode(Frame::End(LastContent::EMPTY), &mut dst)
            .unwrap();

        assert_eq!(
            &dst[..],
            b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n".as_ref()
        );
        assert!(encoder.is_idle());
    }

    #[test]
    fn head_response_via_latch() {
        let mut head = response_head(Status::OK);
        head.headers.set("Content-Length", 42u64).unwrap();

        let mut encoder = ResponseEncoder::new();
        encoder.set_body_always_empty();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("the body")), &mut dst)
            .unwrap();
        encoder
            .encode(Frame::End(LastContent::EMPTY), &mut dst)
            .unwrap();

        assert!(dst.ends_with(b"Content-Length: 42\r\n\r\n"));

        // the latch applies to one message only
        let mut head = response_head(Status::OK);
        head.headers.set("Content-Length", 2u64).unwrap();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        encoder
            .encode(Frame::Chunk(Content::from("ok")), &mut dst)
            .unwrap();
        assert!(dst.ends_with(b"ok"));
    }

    #[test]
    fn non_ascii_header_bytes_become_question_marks() {
        let mut head = response_head(Status::OK);
        head.headers.set("X-Name", "caf\u{e9}").unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.contains("X-Name: caf??\r\n"));
    }

    #[test]
    fn auto_date_fills_missing_date() {
        let head = response_head(Status::OK);
        let mut encoder = ResponseEncoder::new();
        encoder.set_auto_date(true);
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.contains("\r\nDate: "), "{:?}", text);

        // a caller-provided Date wins
        let mut head = response_head(Status::OK);
        head.headers
            .set("Date", "Sun, 06 Nov 1994 08:49:37 GMT")
            .unwrap();
        encoder
            .encode(Frame::End(LastContent::EMPTY), &mut BytesMut::new())
            .unwrap();
        let mut dst = BytesMut::new();
        encoder.encode(Frame::Head(head), &mut dst).unwrap();
        let text = std::str::from_utf8(&dst).unwrap();
        assert_eq!(text.matches("Date: ").count(), 1);
    }

    #[test]
    fn frames_out_of_order_are_user_errors() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        let err = encoder
            .encode(Frame::Chunk(Content::from("early")), &mut dst)
            .unwrap_err();
        assert!(err.is_user());

        encoder
            .encode(Frame::Head(response_head(Status::OK)), &mut dst)
            .unwrap();
        let err = encoder
            .encode(Frame::Head(response_head(Status::OK)), &mut dst)
            .unwrap_err();
        assert!(err.is_user());
    }

    #[test]
    fn encode_full_message() {
        let mut head = request_head(Method::Post, "/submit");
        head.headers.set("Content-Length", 4u64).unwrap();
        head.decode_result = DecodeResult::Success;
        head.version = Version::HTTP_11;

        let msg = FullMessage {
            head,
            body: Bytes::from_static(b"data"),
            trailers: Headers::EMPTY,
        };

        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode_full(msg, &mut dst).unwrap();
        assert_eq!(
            &dst[..],
            b"POST /submit HTTP/1.1\r\nContent-Length: 4\r\n\r\ndata".as_ref()
        );
        assert!(encoder.is_idle());
    }
}
