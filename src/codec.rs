//! Combined client and server codecs.
//!
//! [`ClientCodec`] and [`ServerCodec`] pair a decoder with the opposite
//! direction's encoder and carry the per-connection method FIFO that makes
//! response framing decidable: the body of a `200 OK` depends on whether
//! the request it answers was a HEAD or a CONNECT, which only the sender of
//! those requests knows.

use std::collections::VecDeque;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::decode::{DecoderConfig, RequestDecoder, ResponseDecoder};
use crate::encode::{RequestEncoder, ResponseEncoder};
use crate::error::{Error, Result};
use crate::message::{Frame, RequestLine};
use crate::method::Method;
use crate::status::Status;

/// The HTTP/1.x codec for the client end of a connection.
///
/// Requests go out through the encoder, responses come back through the
/// decoder. Every outbound request head enqueues its method; every decoded
/// response terminator dequeues one, so pipelined responses always pair with
/// the request they answer.
#[derive(Debug)]
pub struct ClientCodec {
    decoder: ResponseDecoder,
    encoder: RequestEncoder,
    queue: VecDeque<Method>,
    fail_on_missing_response: bool,
}

impl ClientCodec {
    /// Creates a client codec with default decoder limits.
    pub fn new() -> ClientCodec {
        ClientCodec::with_config(DecoderConfig::default())
    }

    /// Creates a client codec with the given decoder limits.
    pub fn with_config(config: DecoderConfig) -> ClientCodec {
        ClientCodec {
            decoder: ResponseDecoder::with_config(config),
            encoder: RequestEncoder::new(),
            queue: VecDeque::new(),
            fail_on_missing_response: true,
        }
    }

    /// Whether connection close with responses outstanding is an error
    /// (default) or silently tolerated.
    pub fn set_fail_on_missing_response(&mut self, fail: bool) {
        self.fail_on_missing_response = fail;
    }

    /// Serializes an outbound request frame.
    pub fn encode(&mut self, frame: Frame<RequestLine>, dst: &mut BytesMut) -> Result<()> {
        if let Frame::Head(ref head) = frame {
            trace!("enqueueing outbound method {}", head.method());
            self.queue.push_back(head.method().clone());
        }
        self.encoder.encode(frame, dst)
    }

    /// Decodes at most one inbound response frame.
    pub fn decode(&mut self, src: &mut BytesMut) -> Option<Frame<Status>> {
        self.decoder
            .set_request_method(self.queue.front().cloned());
        let frame = self.decoder.decode(src)?;
        if frame.is_end() {
            self.queue.pop_front();
        }
        Some(frame)
    }

    /// Signals end of input; may flush a close-delimited response body.
    pub fn read_eof(&mut self) -> Option<Frame<Status>> {
        let frame = self.decoder.read_eof()?;
        if frame.is_end() {
            self.queue.pop_front();
        }
        Some(frame)
    }

    /// Called when the connection goes away. Errs with the premature-closure
    /// error if responses are still owed (after [`read_eof`][Self::read_eof]
    /// has been given its chance to finish a close-delimited body).
    pub fn channel_inactive(&mut self) -> Result<()> {
        let missing = self.queue.len();
        if missing > 0 && self.fail_on_missing_response {
            debug!("connection closed with {} responses outstanding", missing);
            return Err(Error::new_premature_close(missing));
        }
        Ok(())
    }

    /// Number of requests written whose responses have not completed.
    pub fn outstanding_responses(&self) -> usize {
        self.queue.len()
    }

    /// Whether a successful CONNECT switched this connection out of HTTP.
    pub fn is_upgraded(&self) -> bool {
        self.decoder.is_upgraded()
    }

    /// The inbound decoder, for reset after a rejected message.
    pub fn decoder_mut(&mut self) -> &mut ResponseDecoder {
        &mut self.decoder
    }
}

impl Default for ClientCodec {
    fn default() -> ClientCodec {
        ClientCodec::new()
    }
}

/// The HTTP/1.x codec for the server end of a connection.
///
/// The method FIFO here runs the other way around: decoded request heads
/// enqueue, outbound final responses dequeue, letting the encoder suppress
/// the body of responses to HEAD and to a successful CONNECT.
#[derive(Debug)]
pub struct ServerCodec {
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
    queue: VecDeque<Method>,
}

impl ServerCodec {
    /// Creates a server codec with default decoder limits.
    pub fn new() -> ServerCodec {
        ServerCodec::with_config(DecoderConfig::default())
    }

    /// Creates a server codec with the given decoder limits.
    pub fn with_config(config: DecoderConfig) -> ServerCodec {
        ServerCodec {
            decoder: RequestDecoder::with_config(config),
            encoder: ResponseEncoder::new(),
            queue: VecDeque::new(),
        }
    }

    /// Decodes at most one inbound request frame.
    pub fn decode(&mut self, src: &mut BytesMut) -> Option<Frame<RequestLine>> {
        let frame = self.decoder.decode(src)?;
        if let Frame::Head(ref head) = frame {
            self.queue.push_back(head.method().clone());
        }
        Some(frame)
    }

    /// Serializes an outbound response frame.
    ///
    /// Interim (1xx) responses do not consume the method FIFO; a request may
    /// see a `100 Continue` before its real response.
    pub fn encode(&mut self, frame: Frame<Status>, dst: &mut BytesMut) -> Result<()> {
        if let Frame::Head(ref head) = frame {
            if !head.subject.is_informational() {
                match self.queue.pop_front() {
                    Some(Method::Head) => self.encoder.set_body_always_empty(),
                    Some(Method::Connect) if head.subject.is_success() => {
                        self.encoder.set_body_always_empty()
                    }
                    _ => (),
                }
            }
        }
        self.encoder.encode(frame, dst)
    }

    /// The inbound decoder, for reset after a rejected message.
    pub fn decoder_mut(&mut self) -> &mut RequestDecoder {
        &mut self.decoder
    }

    /// The outbound encoder.
    pub fn encoder_mut(&mut self) -> &mut ResponseEncoder {
        &mut self.encoder
    }
}

impl Default for ServerCodec {
    fn default() -> ServerCodec {
        ServerCodec::new()
    }
}

#[cfg(feature = "codec")]
mod tokio_codec {
    //! `tokio_util::codec` adapters, so the pieces drop into a `Framed`
    //! transport.

    use bytes::BytesMut;
    use tokio_util::codec;

    use crate::decode::Decoder;
    use crate::encode::Encoder;
    use crate::error::Error;
    use crate::message::{Frame, RequestLine};
    use crate::role::MessageKind;
    use crate::status::Status;

    impl<S: MessageKind> codec::Decoder for Decoder<S> {
        type Item = Frame<S>;
        type Error = Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame<S>>, Error> {
            Ok(Decoder::decode(self, src))
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame<S>>, Error> {
            if let Some(frame) = Decoder::decode(self, src) {
                return Ok(Some(frame));
            }
            Ok(self.read_eof())
        }
    }

    impl<S: MessageKind> codec::Encoder<Frame<S>> for Encoder<S> {
        type Error = Error;

        fn encode(&mut self, frame: Frame<S>, dst: &mut BytesMut) -> Result<(), Error> {
            Encoder::encode(self, frame, dst)
        }
    }

    impl codec::Decoder for super::ClientCodec {
        type Item = Frame<Status>;
        type Error = Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame<Status>>, Error> {
            Ok(super::ClientCodec::decode(self, src))
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame<Status>>, Error> {
            if let Some(frame) = super::ClientCodec::decode(self, src) {
                return Ok(Some(frame));
            }
            if let Some(frame) = self.read_eof() {
                return Ok(Some(frame));
            }
            self.channel_inactive()?;
            Ok(None)
        }
    }

    impl codec::Encoder<Frame<RequestLine>> for super::ClientCodec {
        type Error = Error;

        fn encode(&mut self, frame: Frame<RequestLine>, dst: &mut BytesMut) -> Result<(), Error> {
            super::ClientCodec::encode(self, frame, dst)
        }
    }

    impl codec::Decoder for super::ServerCodec {
        type Item = Frame<RequestLine>;
        type Error = Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame<RequestLine>>, Error> {
            Ok(super::ServerCodec::decode(self, src))
        }
    }

    impl codec::Encoder<Frame<Status>> for super::ServerCodec {
        type Error = Error;

        fn encode(&mut self, frame: Frame<Status>, dst: &mut BytesMut) -> Result<(), Error> {
            super::ServerCodec::encode(self, frame, dst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{LastContent, MessageHead};

    fn request(method: Method, uri: &str) -> Frame<RequestLine> {
        Frame::Head(MessageHead::new(RequestLine(method, uri.to_owned())))
    }

    fn drain_client(codec: &mut ClientCodec, src: &mut BytesMut) -> Vec<Frame<Status>> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(src) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn head_response_skips_advertised_body() {
        let mut codec = ClientCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(request(Method::Head, "/"), &mut wire).unwrap();
        codec
            .encode(Frame::End(LastContent::EMPTY), &mut wire)
            .unwrap();
        assert_eq!(codec.outstanding_responses(), 1);

        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n"[..]);
        let frames = drain_client(&mut codec, &mut src);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Frame::End(LastContent::EMPTY));
        assert_eq!(codec.outstanding_responses(), 0);

        // and the decoder is ready for the next pipelined response
        src.extend_from_slice(b"HTTP/1.1 204 No Content\r\n\r\n");
        codec.encode(request(Method::Get, "/next"), &mut wire).unwrap();
        let frames = drain_client(&mut codec, &mut src);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn pipelined_responses_pair_with_their_methods() {
        let mut codec = ClientCodec::new();
        let mut wire = BytesMut::new();
        for (method, uri) in [(Method::Head, "/a"), (Method::Get, "/b")] {
            codec.encode(request(method, uri), &mut wire).unwrap();
            codec
                .encode(Frame::End(LastContent::EMPTY), &mut wire)
                .unwrap();
        }

        let mut src = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n\
               HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc"[..],
        );
        let frames = drain_client(&mut codec, &mut src);
        // HEAD response body is skipped, GET response body is read
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[1], Frame::End(LastContent::EMPTY));
        match &frames[3] {
            Frame::Chunk(content) => assert_eq!(&content.data()[..], b"abc"),
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn connect_2xx_leaves_http() {
        let mut codec = ClientCodec::new();
        let mut wire = BytesMut::new();
        codec
            .encode(request(Method::Connect, "example.com:443"), &mut wire)
            .unwrap();
        codec
            .encode(Frame::End(LastContent::EMPTY), &mut wire)
            .unwrap();
        assert!(wire.starts_with(b"CONNECT example.com:443 HTTP/1.1\r\n"));

        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\n\r\n\x16\x03\x01tls"[..]);
        let frames = drain_client(&mut codec, &mut src);
        assert!(codec.is_upgraded());
        assert_eq!(frames.len(), 3);
        match &frames[2] {
            Frame::Raw(bytes) => assert_eq!(&bytes[..], b"\x16\x03\x01tls"),
            other => panic!("expected raw, got {:?}", other),
        }
    }

    #[test]
    fn premature_close_reports_missing_count() {
        let mut codec = ClientCodec::new();
        let mut wire = BytesMut::new();
        for uri in ["/1", "/2"] {
            codec.encode(request(Method::Get, uri), &mut wire).unwrap();
            codec
                .encode(Frame::End(LastContent::EMPTY), &mut wire)
                .unwrap();
        }

        let err = codec.channel_inactive().unwrap_err();
        assert!(err.is_premature_close());
        assert_eq!(err.missing_responses(), Some(2));

        codec.set_fail_on_missing_response(false);
        assert!(codec.channel_inactive().is_ok());
    }

    #[test]
    fn close_delimited_response_finishes_on_eof() {
        let mut codec = ClientCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(request(Method::Get, "/"), &mut wire).unwrap();
        codec
            .encode(Frame::End(LastContent::EMPTY), &mut wire)
            .unwrap();

        let mut src = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nold style body"[..]);
        let frames = drain_client(&mut codec, &mut src);
        assert_eq!(frames.len(), 2); // head + chunk, no end yet

        assert!(codec.read_eof().unwrap().is_end());
        assert!(codec.channel_inactive().is_ok());
    }

    #[test]
    fn server_codec_suppresses_head_response_body() {
        let mut codec = ServerCodec::new();
        let mut src = BytesMut::from(&b"HEAD /file HTTP/1.1\r\n\r\n"[..]);
        while codec.decode(&mut src).is_some() {}

        let mut head = MessageHead::new(Status::OK);
        head.headers.set("Content-Length", 5u64).unwrap();
        let mut wire = BytesMut::new();
        codec.encode(Frame::Head(head), &mut wire).unwrap();
        codec
            .encode(Frame::Chunk(crate::message::Content::from("hello")), &mut wire)
            .unwrap();
        codec
            .encode(Frame::End(LastContent::EMPTY), &mut wire)
            .unwrap();

        assert_eq!(
            &wire[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n".as_ref()
        );
    }

    #[test]
    fn interim_response_keeps_method_queued() {
        let mut codec = ServerCodec::new();
        let mut src = BytesMut::from(
            &b"HEAD /a HTTP/1.1\r\nExpect: 100-continue\r\n\r\n"[..],
        );
        while codec.decode(&mut src).is_some() {}

        let mut wire = BytesMut::new();
        codec
            .encode(Frame::Head(MessageHead::new(Status::CONTINUE)), &mut wire)
            .unwrap();
        codec
            .encode(Frame::End(LastContent::EMPTY), &mut wire)
            .unwrap();

        // the final response still knows the request was a HEAD
        let mut head = MessageHead::new(Status::OK);
        head.headers.set("Content-Length", 2u64).unwrap();
        codec.encode(Frame::Head(head), &mut wire).unwrap();
        codec
            .encode(Frame::Chunk(crate::message::Content::from("no")), &mut wire)
            .unwrap();
        codec
            .encode(Frame::End(LastContent::EMPTY), &mut wire)
            .unwrap();

        assert!(!wire.ends_with(b"no"), "HEAD response body must be dropped");
    }
}
