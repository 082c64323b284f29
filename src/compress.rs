//! Content compression and decompression stages.
//!
//! These decorate the codec rather than replace it: each maps one frame to
//! zero or more frames, transforming `Content` payloads through a streaming
//! gzip/zlib codec and finishing the stream on the terminator.
//!
//! [`ContentDecompressor`] sits after the decoder and inflates bodies whose
//! head carries a supported `Content-Encoding`. [`ContentCompressor`] sits
//! before the encoder on a server and deflates response bodies according to
//! the request's `Accept-Encoding`.

use std::collections::VecDeque;
use std::io::Write;

use bytes::Bytes;
use flate2::write::{DeflateDecoder, GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use tracing::{debug, trace};

use crate::error::Result;
use crate::header::{names, HeaderValue};
use crate::message::{Content, Frame, LastContent, RequestHead};
use crate::method::Method;
use crate::role::{BodyMode, MessageKind};
use crate::status::Status;

/// A content coding this crate can apply to an outbound body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentEncoding {
    /// RFC 1952 gzip.
    Gzip,
    /// RFC 1950 zlib, sent as `deflate`.
    Deflate,
}

impl ContentEncoding {
    /// The token used in `Content-Encoding`.
    pub fn as_str(&self) -> &'static str {
        match *self {
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
        }
    }
}

/// Picks the coding for a response given the request's `Accept-Encoding`.
///
/// Each comma-separated token contributes its `q=` weight (missing weight is
/// 1.0, an unparseable one is 0.0). gzip wins ties with deflate; `*` is a
/// fallback for whichever coding was not explicitly listed. `None` means
/// send identity.
pub fn select_encoding(accept: &str) -> Option<ContentEncoding> {
    let mut star_q: f32 = -1.0;
    let mut gzip_q: f32 = -1.0;
    let mut deflate_q: f32 = -1.0;

    for part in accept.split(',') {
        let mut params = part.split(';');
        let token = params.next().unwrap_or("").trim();
        let mut q = 1.0f32;
        for param in params {
            let param = param.trim();
            if let Some(value) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
                q = value.trim().parse().unwrap_or(0.0);
                break;
            }
        }
        if token.contains('*') {
            star_q = q;
        } else if token.to_ascii_lowercase().contains("gzip") && q > gzip_q {
            gzip_q = q;
        } else if token.to_ascii_lowercase().contains("deflate") && q > deflate_q {
            deflate_q = q;
        }
    }

    if gzip_q > 0.0 || deflate_q > 0.0 {
        if gzip_q >= deflate_q {
            return Some(ContentEncoding::Gzip);
        }
        return Some(ContentEncoding::Deflate);
    }
    if star_q > 0.0 {
        if gzip_q == -1.0 {
            return Some(ContentEncoding::Gzip);
        }
        if deflate_q == -1.0 {
            return Some(ContentEncoding::Deflate);
        }
    }
    None
}

enum Inflater {
    Gzip(GzDecoder<Vec<u8>>),
    Zlib(ZlibDecoder<Vec<u8>>),
    Raw(DeflateDecoder<Vec<u8>>),
    /// `deflate` bodies in the wild are sometimes raw, sometimes zlib;
    /// buffer until two octets say which.
    Undecided(Vec<u8>),
}

impl Inflater {
    fn write(&mut self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        if let Inflater::Undecided(buffered) = self {
            buffered.extend_from_slice(data);
            if buffered.len() < 2 {
                return Ok(Vec::new());
            }
            let looks_like_zlib =
                (buffered[0] & 0x0f) == 8 && (u16::from(buffered[0]) << 8 | u16::from(buffered[1])) % 31 == 0;
            trace!("deflate body looks like zlib: {}", looks_like_zlib);
            let buffered = std::mem::take(buffered);
            *self = if looks_like_zlib {
                Inflater::Zlib(ZlibDecoder::new(Vec::new()))
            } else {
                Inflater::Raw(DeflateDecoder::new(Vec::new()))
            };
            return self.write(&buffered);
        }

        match self {
            Inflater::Gzip(d) => {
                d.write_all(data)?;
                Ok(std::mem::take(d.get_mut()))
            }
            Inflater::Zlib(d) => {
                d.write_all(data)?;
                Ok(std::mem::take(d.get_mut()))
            }
            Inflater::Raw(d) => {
                d.write_all(data)?;
                Ok(std::mem::take(d.get_mut()))
            }
            Inflater::Undecided(_) => unreachable!("handled above"),
        }
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            Inflater::Gzip(d) => d.finish(),
            Inflater::Zlib(d) => d.finish(),
            Inflater::Raw(d) => d.finish(),
            // fewer than two body octets; whatever they were, they were not
            // a complete deflate stream worth reporting on
            Inflater::Undecided(_) => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Inflater::Gzip(_) => "Inflater::Gzip",
            Inflater::Zlib(_) => "Inflater::Zlib",
            Inflater::Raw(_) => "Inflater::Raw",
            Inflater::Undecided(_) => "Inflater::Undecided",
        })
    }
}

/// Inflates inbound message bodies according to `Content-Encoding`.
#[derive(Debug, Default)]
pub struct ContentDecompressor {
    inflater: Option<Inflater>,
}

impl ContentDecompressor {
    /// Creates a pass-through decompressor; it activates per message.
    pub fn new() -> ContentDecompressor {
        ContentDecompressor::default()
    }

    /// Consumes one inbound frame, yielding the transformed frame(s).
    pub fn read<S: MessageKind>(&mut self, frame: Frame<S>) -> Result<Vec<Frame<S>>> {
        match frame {
            Frame::Head(mut head) => {
                self.inflater = None;
                if !head.decode_result.is_success() {
                    return Ok(vec![Frame::Head(head)]);
                }
                let encoding = head
                    .headers
                    .get(names::CONTENT_ENCODING)
                    .and_then(HeaderValue::to_str)
                    .map(str::trim)
                    .map(str::to_ascii_lowercase);
                self.inflater = match encoding.as_deref() {
                    Some("gzip") | Some("x-gzip") => {
                        Some(Inflater::Gzip(GzDecoder::new(Vec::new())))
                    }
                    Some("deflate") | Some("x-deflate") => Some(Inflater::Undecided(Vec::new())),
                    _ => None,
                };
                if self.inflater.is_some() {
                    trace!("decompressing {} body", encoding.as_deref().unwrap_or(""));
                    head.headers.remove(names::CONTENT_ENCODING);
                    // the true length is only known at the end of the stream
                    if head.headers.remove(names::CONTENT_LENGTH) {
                        head.headers
                            .set(names::TRANSFER_ENCODING, "chunked")
                            .expect("static header is valid");
                    }
                }
                Ok(vec![Frame::Head(head)])
            }
            Frame::Chunk(content) => match self.inflater.as_mut() {
                Some(inflater) => {
                    let out = inflater.write(content.data())?;
                    if out.is_empty() {
                        Ok(Vec::new())
                    } else {
                        Ok(vec![Frame::Chunk(Content::new(Bytes::from(out)))])
                    }
                }
                None => Ok(vec![Frame::Chunk(content)]),
            },
            Frame::End(last) => match self.inflater.take() {
                Some(mut inflater) => {
                    let mut tail = inflater.write(last.data())?;
                    let finished = inflater.finish()?;
                    tail.extend_from_slice(&finished);
                    let (_, trailers) = last.into_parts();
                    let mut out = Vec::with_capacity(2);
                    if !tail.is_empty() {
                        out.push(Frame::Chunk(Content::new(Bytes::from(tail))));
                    }
                    out.push(Frame::End(LastContent::new(Bytes::new(), trailers)));
                    Ok(out)
                }
                None => Ok(vec![Frame::End(last)]),
            },
            raw @ Frame::Raw(_) => Ok(vec![raw]),
        }
    }

    /// Drops any in-flight inflate stream; call when the connection dies.
    pub fn channel_inactive(&mut self) {
        self.inflater = None;
    }
}

enum Deflater {
    Gzip(GzEncoder<Vec<u8>>),
    Zlib(ZlibEncoder<Vec<u8>>),
}

impl Deflater {
    fn new(encoding: ContentEncoding, level: Compression) -> Deflater {
        match encoding {
            ContentEncoding::Gzip => Deflater::Gzip(GzEncoder::new(Vec::new(), level)),
            ContentEncoding::Deflate => Deflater::Zlib(ZlibEncoder::new(Vec::new(), level)),
        }
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Deflater::Gzip(e) => {
                e.write_all(data)?;
                Ok(std::mem::take(e.get_mut()))
            }
            Deflater::Zlib(e) => {
                e.write_all(data)?;
                Ok(std::mem::take(e.get_mut()))
            }
        }
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            Deflater::Gzip(e) => e.finish(),
            Deflater::Zlib(e) => e.finish(),
        }
    }
}

impl std::fmt::Debug for Deflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Deflater::Gzip(_) => "Deflater::Gzip",
            Deflater::Zlib(_) => "Deflater::Zlib",
        })
    }
}

/// Deflates outbound response bodies according to each request's
/// `Accept-Encoding`.
///
/// Feed it every inbound request head via
/// [`on_request`][ContentCompressor::on_request] so pipelined responses pair
/// with the right preferences.
#[derive(Debug)]
pub struct ContentCompressor {
    level: Compression,
    requests: VecDeque<(Method, Option<String>)>,
    deflater: Option<Deflater>,
}

impl ContentCompressor {
    /// Creates a compressor with the default compression level.
    pub fn new() -> ContentCompressor {
        ContentCompressor {
            level: Compression::default(),
            requests: VecDeque::new(),
            deflater: None,
        }
    }

    /// Records an inbound request head's method and `Accept-Encoding`.
    pub fn on_request(&mut self, head: &RequestHead) {
        let accept = head
            .headers
            .get(names::ACCEPT_ENCODING)
            .and_then(HeaderValue::to_str)
            .map(str::to_owned);
        self.requests.push_back((head.method().clone(), accept));
    }

    /// Consumes one outbound response frame, yielding the transformed
    /// frame(s).
    pub fn write(&mut self, frame: Frame<Status>) -> Result<Vec<Frame<Status>>> {
        match frame {
            Frame::Head(mut head) => {
                // interim responses are never transformed and never consume
                // the request pairing
                if head.subject.is_informational() {
                    return Ok(vec![Frame::Head(head)]);
                }

                let (method, accept) = self
                    .requests
                    .pop_front()
                    .unwrap_or((Method::Get, None));

                let already_encoded = head
                    .headers
                    .get(names::CONTENT_ENCODING)
                    .and_then(HeaderValue::to_str)
                    .map_or(false, |v| !v.trim().eq_ignore_ascii_case("identity"));

                let selected = if method == Method::Head
                    || already_encoded
                    || Status::body_mode(&head, None) != BodyMode::Readable
                {
                    None
                } else {
                    accept.as_deref().and_then(select_encoding)
                };

                if let Some(encoding) = selected {
                    debug!("compressing response body as {}", encoding.as_str());
                    head.headers
                        .set(names::CONTENT_ENCODING, encoding.as_str())
                        .expect("static header is valid");
                    head.headers.remove(names::CONTENT_LENGTH);
                    head.headers
                        .set(names::TRANSFER_ENCODING, "chunked")
                        .expect("static header is valid");
                    self.deflater = Some(Deflater::new(encoding, self.level));
                }
                Ok(vec![Frame::Head(head)])
            }
            Frame::Chunk(content) => match self.deflater.as_mut() {
                Some(deflater) => {
                    let out = deflater.write(content.data())?;
                    if out.is_empty() {
                        Ok(Vec::new())
                    } else {
                        Ok(vec![Frame::Chunk(Content::new(Bytes::from(out)))])
                    }
                }
                None => Ok(vec![Frame::Chunk(content)]),
            },
            Frame::End(last) => match self.deflater.take() {
                Some(mut deflater) => {
                    let mut tail = deflater.write(last.data())?;
                    let finished = deflater.finish()?;
                    tail.extend_from_slice(&finished);
                    let (_, trailers) = last.into_parts();
                    let mut out = Vec::with_capacity(2);
                    if !tail.is_empty() {
                        out.push(Frame::Chunk(Content::new(Bytes::from(tail))));
                    }
                    out.push(Frame::End(LastContent::new(Bytes::new(), trailers)));
                    Ok(out)
                }
                None => Ok(vec![Frame::End(last)]),
            },
            raw @ Frame::Raw(_) => Ok(vec![raw]),
        }
    }

    /// Drops any in-flight deflate stream; call when the connection dies.
    pub fn channel_inactive(&mut self) {
        self.deflater = None;
        self.requests.clear();
    }
}

impl Default for ContentCompressor {
    fn default() -> ContentCompressor {
        ContentCompressor::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageHead, RequestLine};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut e = GzEncoder::new(Vec::new(), Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut e = ZlibEncoder::new(Vec::new(), Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut e = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn response_head_with(encoding: &str, len: usize) -> Frame<Status> {
        let mut head = MessageHead::new(Status::OK);
        head.headers.set("Content-Encoding", encoding).unwrap();
        head.headers.set("Content-Length", len as u64).unwrap();
        Frame::Head(head)
    }

    fn body_of(frames: &[Frame<Status>]) -> Vec<u8> {
        let mut body = Vec::new();
        for frame in frames {
            if let Frame::Chunk(c) = frame {
                body.extend_from_slice(c.data());
            }
        }
        body
    }

    fn decompress_body(encoding: &str, wire_body: Vec<u8>) -> (Vec<Frame<Status>>, Vec<u8>) {
        let mut stage = ContentDecompressor::new();
        let mut frames = Vec::new();
        frames.extend(
            stage
                .read(response_head_with(encoding, wire_body.len()))
                .unwrap(),
        );
        // feed in two slices to prove the stream survives splits
        let mid = wire_body.len() / 2;
        for part in [&wire_body[..mid], &wire_body[mid..]] {
            frames.extend(
                stage
                    .read(Frame::Chunk(Content::new(Bytes::copy_from_slice(part))))
                    .unwrap(),
            );
        }
        frames.extend(stage.read(Frame::End(LastContent::EMPTY)).unwrap());
        let body = body_of(&frames);
        (frames, body)
    }

    #[test]
    fn inflates_gzip() {
        let (frames, body) = decompress_body("gzip", gzip(b"hello gzip world"));
        assert_eq!(body, b"hello gzip world");
        let head = frames[0].head().unwrap();
        assert!(!head.headers.contains("content-encoding"));
        assert!(!head.headers.contains("content-length"));
        assert_eq!(head.headers.get("transfer-encoding").unwrap(), "chunked");
        assert!(frames.last().unwrap().is_end());
    }

    #[test]
    fn inflates_zlib_flavored_deflate() {
        let (_, body) = decompress_body("deflate", zlib(b"zlib flavored"));
        assert_eq!(body, b"zlib flavored");
    }

    #[test]
    fn inflates_raw_deflate() {
        let (_, body) = decompress_body("deflate", raw_deflate(b"raw flavored"));
        assert_eq!(body, b"raw flavored");
    }

    #[test]
    fn identity_passes_through() {
        let mut stage = ContentDecompressor::new();
        let frames = stage
            .read(response_head_with("identity", 4))
            .unwrap();
        let head = frames[0].head().unwrap();
        assert_eq!(head.headers.get_u64("content-length"), Some(4));

        let frames = stage
            .read::<Status>(Frame::Chunk(Content::from("asis")))
            .unwrap();
        assert_eq!(body_of(&frames), b"asis");
    }

    #[test]
    fn unknown_coding_passes_through() {
        let mut stage = ContentDecompressor::new();
        let frames = stage.read(response_head_with("br", 4)).unwrap();
        let head = frames[0].head().unwrap();
        assert_eq!(head.headers.get("content-encoding").unwrap(), "br");
    }

    fn get_request(accept: Option<&str>) -> RequestHead {
        let mut head = MessageHead::new(RequestLine(Method::Get, "/".to_owned()));
        if let Some(accept) = accept {
            head.headers.set("Accept-Encoding", accept).unwrap();
        }
        head
    }

    #[test]
    fn compresses_when_client_accepts_gzip() {
        let mut stage = ContentCompressor::new();
        stage.on_request(&get_request(Some("gzip, deflate")));

        let mut head = MessageHead::new(Status::OK);
        head.headers.set("Content-Length", 11u64).unwrap();
        let mut frames = stage.write(Frame::Head(head)).unwrap();
        frames.extend(stage.write(Frame::Chunk(Content::from("hello there"))).unwrap());
        frames.extend(stage.write(Frame::End(LastContent::EMPTY)).unwrap());

        let head = frames[0].head().unwrap();
        assert_eq!(head.headers.get("content-encoding").unwrap(), "gzip");
        assert_eq!(head.headers.get("transfer-encoding").unwrap(), "chunked");
        assert!(!head.headers.contains("content-length"));

        let mut d = GzDecoder::new(Vec::new());
        d.write_all(&body_of(&frames)).unwrap();
        assert_eq!(d.finish().unwrap(), b"hello there");
    }

    #[test]
    fn head_responses_are_not_compressed() {
        let mut stage = ContentCompressor::new();
        let mut head = MessageHead::new(RequestLine(Method::Head, "/".to_owned()));
        head.headers.set("Accept-Encoding", "gzip").unwrap();
        stage.on_request(&head);

        let frames = stage.write(Frame::Head(MessageHead::new(Status::OK))).unwrap();
        assert!(!frames[0].head().unwrap().headers.contains("content-encoding"));
    }

    #[test]
    fn already_encoded_responses_are_not_reencoded() {
        let mut stage = ContentCompressor::new();
        stage.on_request(&get_request(Some("gzip")));

        let mut head = MessageHead::new(Status::OK);
        head.headers.set("Content-Encoding", "br").unwrap();
        let frames = stage.write(Frame::Head(head)).unwrap();
        assert_eq!(
            frames[0].head().unwrap().headers.get("content-encoding").unwrap(),
            "br"
        );
    }

    #[test]
    fn interim_response_keeps_request_pairing() {
        let mut stage = ContentCompressor::new();
        stage.on_request(&get_request(Some("gzip")));

        let frames = stage
            .write(Frame::Head(MessageHead::new(Status::CONTINUE)))
            .unwrap();
        assert!(!frames[0].head().unwrap().headers.contains("content-encoding"));

        // the real response still sees the recorded Accept-Encoding
        let frames = stage.write(Frame::Head(MessageHead::new(Status::OK))).unwrap();
        assert_eq!(
            frames[0].head().unwrap().headers.get("content-encoding").unwrap(),
            "gzip"
        );
    }

    #[test]
    fn selection_honors_weights() {
        assert_eq!(select_encoding("gzip"), Some(ContentEncoding::Gzip));
        assert_eq!(select_encoding("deflate"), Some(ContentEncoding::Deflate));
        assert_eq!(
            select_encoding("gzip;q=0.5, deflate;q=0.9"),
            Some(ContentEncoding::Deflate)
        );
        // ties go to gzip
        assert_eq!(
            select_encoding("deflate;q=0.7, gzip;q=0.7"),
            Some(ContentEncoding::Gzip)
        );
        assert_eq!(select_encoding("gzip, deflate"), Some(ContentEncoding::Gzip));
        // zero weight rules a coding out
        assert_eq!(select_encoding("gzip;q=0"), None);
        assert_eq!(
            select_encoding("gzip;q=0, deflate"),
            Some(ContentEncoding::Deflate)
        );
        // a broken weight counts as zero
        assert_eq!(select_encoding("gzip;q=banana"), None);
        // wildcard backs up whatever was not listed
        assert_eq!(select_encoding("*"), Some(ContentEncoding::Gzip));
        assert_eq!(
            select_encoding("gzip;q=0, *"),
            Some(ContentEncoding::Deflate)
        );
        assert_eq!(select_encoding("identity"), None);
        assert_eq!(select_encoding(""), None);
    }
}
