//! The inbound byte-stream decoder.
//!
//! [`Decoder`] is a resumable parser: feed it the connection's read buffer
//! and it emits typed [`Frame`]s: a head, zero or more content chunks, and
//! a terminator. It picks up mid-message on the next call when bytes run
//! out. Grammar violations and limit overruns do not tear the stage down;
//! the partially built message is emitted with a failure attached and the
//! decoder swallows input until [`Decoder::reset`].

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::header::{names, Headers, IntoHeaderValue, Validation};
use crate::headers::{content_length, is_transfer_encoding_chunked};
use crate::message::{Content, DecodeResult, Frame, LastContent, MessageHead, RequestLine};
use crate::method::Method;
use crate::role::{BodyMode, MessageKind};
use crate::status::Status;

/// Decodes a client's request stream, as a server.
pub type RequestDecoder = Decoder<RequestLine>;

/// Decodes a server's response stream, as a client.
pub type ResponseDecoder = Decoder<Status>;

/// Limits and knobs for a [`Decoder`].
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    max_initial_line_length: usize,
    max_header_size: usize,
    max_chunk_size: usize,
    initial_buffer_size: usize,
    validate_headers: bool,
}

impl Default for DecoderConfig {
    fn default() -> DecoderConfig {
        DecoderConfig {
            max_initial_line_length: 4096,
            max_header_size: 8192,
            max_chunk_size: 8192,
            initial_buffer_size: 128,
            validate_headers: true,
        }
    }
}

impl DecoderConfig {
    /// Starts from the defaults.
    pub fn new() -> DecoderConfig {
        DecoderConfig::default()
    }

    /// Maximum length of a start-line (and of a chunk-size line).
    pub fn max_initial_line_length(mut self, max: usize) -> Self {
        self.max_initial_line_length = max;
        self
    }

    /// Maximum length of a single header line, including trailers.
    pub fn max_header_size(mut self, max: usize) -> Self {
        self.max_header_size = max;
        self
    }

    /// Largest `Content` payload the decoder will emit; bigger bodies are
    /// split into several chunks.
    pub fn max_chunk_size(mut self, max: usize) -> Self {
        self.max_chunk_size = max;
        self
    }

    /// Suggested initial capacity for the read buffer this decoder is fed
    /// from. The decoder does not allocate it; transport glue should.
    pub fn initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    /// Whether decoded headers go through the validating container.
    pub fn validate_headers(mut self, validate: bool) -> Self {
        self.validate_headers = validate;
        self
    }

    /// The configured read-buffer size hint.
    pub fn suggested_buffer_size(&self) -> usize {
        self.initial_buffer_size
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    SkipControlChars,
    ReadInitial,
    ReadHeader,
    ReadVariableLengthContent,
    ReadFixedLengthContent { remaining: u64 },
    ReadChunkSize,
    ReadChunkedContent { remaining: u64 },
    ReadChunkDelimiter,
    ReadChunkFooter,
    BadMessage,
    Upgraded,
}

enum Line {
    Complete(BytesMut),
    Partial,
    TooLong,
}

/// A resumable HTTP/1.x message decoder.
#[derive(Debug)]
pub struct Decoder<S: MessageKind> {
    config: DecoderConfig,
    state: State,
    head: Option<MessageHead<S>>,
    trailers: Option<Headers>,
    queued: Option<Frame<S>>,
    request_method: Option<Method>,
}

impl<S: MessageKind> Decoder<S> {
    /// Creates a decoder with default limits.
    pub fn new() -> Decoder<S> {
        Decoder::with_config(DecoderConfig::default())
    }

    /// Creates a decoder with the given limits.
    pub fn with_config(config: DecoderConfig) -> Decoder<S> {
        Decoder {
            config,
            state: State::SkipControlChars,
            head: None,
            trailers: None,
            queued: None,
            request_method: None,
        }
    }

    /// The configuration this decoder runs with.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Whether the stream left HTTP behind (successful CONNECT); remaining
    /// bytes come out as [`Frame::Raw`].
    pub fn is_upgraded(&self) -> bool {
        self.state == State::Upgraded
    }

    /// Whether the decoder is draining a failed message.
    pub fn is_bad_message(&self) -> bool {
        self.state == State::BadMessage
    }

    /// Returns the decoder to its initial state without touching unread
    /// bytes. Used after rejecting a message when the connection stays
    /// open for the next one.
    pub fn reset(&mut self) {
        trace!("decoder reset");
        self.state = State::SkipControlChars;
        self.head = None;
        self.trailers = None;
        self.queued = None;
        self.request_method = None;
    }

    /// Decodes at most one frame out of `src`.
    ///
    /// `None` means more bytes are needed; state survives to the next call.
    /// Decode failures ride the emitted message, never an `Err`.
    pub fn decode(&mut self, src: &mut BytesMut) -> Option<Frame<S>> {
        if let Some(frame) = self.queued.take() {
            return Some(frame);
        }
        loop {
            trace!("decode state={:?} buffered={}", self.state, src.len());
            match self.state {
                State::SkipControlChars => {
                    while let Some(&b) = src.first() {
                        if b.is_ascii_control() || b == b' ' {
                            src.advance(1);
                        } else {
                            break;
                        }
                    }
                    if src.is_empty() {
                        return None;
                    }
                    self.state = State::ReadInitial;
                }
                State::ReadInitial => {
                    match read_line(src, self.config.max_initial_line_length) {
                        Line::Partial => return None,
                        Line::TooLong => {
                            debug!("start-line over limit");
                            return Some(self.bad_message_head(src, ParseError::TooLong));
                        }
                        Line::Complete(line) => match S::parse_initial(&line) {
                            Ok((version, subject)) => {
                                let validation = if self.config.validate_headers {
                                    Validation::Strict
                                } else {
                                    Validation::Permissive
                                };
                                self.head = Some(MessageHead {
                                    version,
                                    subject,
                                    headers: Headers::with_validation(validation),
                                    decode_result: DecodeResult::Success,
                                });
                                self.state = State::ReadHeader;
                            }
                            Err(err) => {
                                debug!("invalid start-line: {}", err);
                                return Some(self.bad_message_head(src, err));
                            }
                        },
                    }
                }
                State::ReadHeader => match read_line(src, self.config.max_header_size) {
                    Line::Partial => return None,
                    Line::TooLong => {
                        debug!("header line over limit");
                        return Some(self.bad_message_head(src, ParseError::TooLong));
                    }
                    Line::Complete(line) => {
                        if line.is_empty() {
                            return Some(self.headers_complete());
                        }
                        let head = self.head.as_mut().expect("head built in ReadInitial");
                        if let Err(err) = read_header_line(&line, &mut head.headers, None) {
                            debug!("invalid header: {}", err);
                            return Some(self.bad_message_head(src, err));
                        }
                    }
                },
                State::ReadFixedLengthContent { remaining } => {
                    if src.is_empty() {
                        return None;
                    }
                    let n = chunk_len(src.len(), remaining, self.config.max_chunk_size);
                    let data = src.split_to(n).freeze();
                    let remaining = remaining - n as u64;
                    if remaining == 0 {
                        self.queued = Some(Frame::End(LastContent::EMPTY));
                        self.state = State::SkipControlChars;
                    } else {
                        self.state = State::ReadFixedLengthContent { remaining };
                    }
                    return Some(Frame::Chunk(Content::new(data)));
                }
                State::ReadVariableLengthContent => {
                    if src.is_empty() {
                        return None;
                    }
                    let n = std::cmp::min(src.len(), self.config.max_chunk_size);
                    let data = src.split_to(n).freeze();
                    return Some(Frame::Chunk(Content::new(data)));
                }
                State::ReadChunkSize => {
                    match read_line(src, self.config.max_initial_line_length) {
                        Line::Partial => return None,
                        Line::TooLong => {
                            debug!("chunk-size line over limit");
                            return Some(self.bad_chunk(src, ParseError::TooLong));
                        }
                        Line::Complete(line) => match parse_chunk_size(&line) {
                            Ok(0) => {
                                trace!("last chunk");
                                self.state = State::ReadChunkFooter;
                            }
                            Ok(size) => {
                                trace!("chunk of {} bytes", size);
                                self.state = State::ReadChunkedContent { remaining: size };
                            }
                            Err(err) => {
                                debug!("invalid chunk size line");
                                return Some(self.bad_chunk(src, err));
                            }
                        },
                    }
                }
                State::ReadChunkedContent { remaining } => {
                    if src.is_empty() {
                        return None;
                    }
                    let n = chunk_len(src.len(), remaining, self.config.max_chunk_size);
                    let data = src.split_to(n).freeze();
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 {
                        State::ReadChunkDelimiter
                    } else {
                        State::ReadChunkedContent { remaining }
                    };
                    return Some(Frame::Chunk(Content::new(data)));
                }
                State::ReadChunkDelimiter => match find_lf(src) {
                    Some(i) => {
                        src.advance(i + 1);
                        self.state = State::ReadChunkSize;
                    }
                    None => {
                        src.clear();
                        return None;
                    }
                },
                State::ReadChunkFooter => match read_line(src, self.config.max_header_size) {
                    Line::Partial => return None,
                    Line::TooLong => {
                        debug!("trailer line over limit");
                        return Some(self.bad_chunk(src, ParseError::TooLong));
                    }
                    Line::Complete(line) => {
                        if line.is_empty() {
                            let trailers = self.trailers.take();
                            self.state = State::SkipControlChars;
                            let last = match trailers {
                                Some(trailers) if !trailers.is_empty() => {
                                    LastContent::new(bytes::Bytes::new(), trailers)
                                }
                                _ => LastContent::EMPTY,
                            };
                            return Some(Frame::End(last));
                        }
                        let validation = if self.config.validate_headers {
                            Validation::Strict
                        } else {
                            Validation::Permissive
                        };
                        let trailers = self
                            .trailers
                            .get_or_insert_with(|| Headers::with_validation(validation));
                        if let Err(err) =
                            read_header_line(&line, trailers, Some(&FILTERED_TRAILER_NAMES))
                        {
                            debug!("invalid trailer: {}", err);
                            return Some(self.bad_chunk(src, err));
                        }
                    }
                },
                State::BadMessage => {
                    // swallow everything until reset
                    src.clear();
                    return None;
                }
                State::Upgraded => {
                    if src.is_empty() {
                        return None;
                    }
                    let data = src.split_to(src.len()).freeze();
                    return Some(Frame::Raw(data));
                }
            }
        }
    }

    /// Signals end of input from the transport.
    ///
    /// A close-delimited body is terminated by connection close; this flushes
    /// its [`Frame::End`].
    pub fn read_eof(&mut self) -> Option<Frame<S>> {
        if self.state == State::ReadVariableLengthContent {
            self.state = State::SkipControlChars;
            return Some(Frame::End(LastContent::EMPTY));
        }
        None
    }

    fn bad_message_head(&mut self, src: &mut BytesMut, err: ParseError) -> Frame<S> {
        self.state = State::BadMessage;
        src.clear();
        let head = match self.head.take() {
            Some(mut head) => {
                head.decode_result = DecodeResult::Failure(err);
                head
            }
            None => S::invalid_head(err),
        };
        Frame::Head(head)
    }

    fn bad_chunk(&mut self, src: &mut BytesMut, err: ParseError) -> Frame<S> {
        self.state = State::BadMessage;
        self.trailers = None;
        src.clear();
        Frame::End(LastContent::failed(err))
    }

    fn headers_complete(&mut self) -> Frame<S> {
        let mut head = self.head.take().expect("head built in ReadInitial");

        match S::body_mode(&head, self.request_method.as_ref()) {
            BodyMode::Empty => {
                self.queued = Some(Frame::End(LastContent::EMPTY));
                self.state = State::SkipControlChars;
                return Frame::Head(head);
            }
            BodyMode::EmptyUpgrade => {
                trace!("CONNECT succeeded, decoder leaving HTTP");
                self.queued = Some(Frame::End(LastContent::EMPTY));
                self.state = State::Upgraded;
                return Frame::Head(head);
            }
            BodyMode::Readable => (),
        }

        if is_transfer_encoding_chunked(&head.headers) {
            // RFC 7230 §3.3.3: chunked framing wins, Content-Length must go
            head.headers.remove(names::CONTENT_LENGTH);
            self.state = State::ReadChunkSize;
            return Frame::Head(head);
        }

        match content_length(&head.headers) {
            Ok(Some(0)) => {
                self.queued = Some(Frame::End(LastContent::EMPTY));
                self.state = State::SkipControlChars;
                Frame::Head(head)
            }
            Ok(Some(len)) => {
                self.state = State::ReadFixedLengthContent { remaining: len };
                Frame::Head(head)
            }
            Ok(None) => {
                if S::IS_REQUEST {
                    // a request without framing headers has no body
                    self.queued = Some(Frame::End(LastContent::EMPTY));
                    self.state = State::SkipControlChars;
                } else {
                    self.state = State::ReadVariableLengthContent;
                }
                Frame::Head(head)
            }
            Err(err) => {
                debug!("illegal Content-Length");
                self.state = State::BadMessage;
                head.decode_result = DecodeResult::Failure(err);
                Frame::Head(head)
            }
        }
    }
}

impl<S: MessageKind> Default for Decoder<S> {
    fn default() -> Decoder<S> {
        Decoder::new()
    }
}

impl ResponseDecoder {
    /// Tells the decoder which request method the next response answers, so
    /// HEAD responses and CONNECT tunnels frame correctly. The combined
    /// client codec maintains this from its method FIFO.
    pub fn set_request_method(&mut self, method: Option<Method>) {
        self.request_method = method;
    }
}

const FILTERED_TRAILER_NAMES: [&str; 3] = [
    names::CONTENT_LENGTH,
    names::TRANSFER_ENCODING,
    names::TRAILER,
];

fn find_lf(src: &BytesMut) -> Option<usize> {
    src.iter().position(|&b| b == b'\n')
}

/// Takes one line off `src`, where a line ends at LF and an optional
/// preceding CR is dropped. `limit` bounds the line's content length.
fn read_line(src: &mut BytesMut, limit: usize) -> Line {
    match find_lf(src) {
        Some(i) => {
            let mut line = src.split_to(i + 1);
            line.truncate(i);
            if line.last() == Some(&b'\r') {
                let len = line.len();
                line.truncate(len - 1);
            }
            if line.len() > limit {
                Line::TooLong
            } else {
                Line::Complete(line)
            }
        }
        None if src.len() > limit => Line::TooLong,
        None => Line::Partial,
    }
}

/// Parses one header line into `headers`, handling obsolete folding: a line
/// starting with SP/HT extends the previous field with one SP. Names in
/// `filtered` are silently dropped (trailing-header filtering).
fn read_header_line(
    line: &[u8],
    headers: &mut Headers,
    filtered: Option<&[&str; 3]>,
) -> Result<(), ParseError> {
    if line[0] == b' ' || line[0] == b'\t' {
        let folded = trim_ows(line);
        match headers.last_value_mut() {
            Some(value) => {
                let mut joined = BytesMut::with_capacity(value.len() + folded.len() + 1);
                joined.extend_from_slice(value.as_bytes());
                joined.extend_from_slice(b" ");
                joined.extend_from_slice(folded);
                *value = joined.freeze().into_header_value();
                return Ok(());
            }
            // a continuation with nothing to continue; tolerate a fold onto
            // a field that trailing-header filtering dropped
            None if filtered.is_some() => return Ok(()),
            None => return Err(ParseError::Header),
        }
    }

    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(ParseError::Header)?;
    let name = std::str::from_utf8(&line[..colon]).map_err(|_| ParseError::Header)?;
    if name.is_empty() {
        return Err(ParseError::Header);
    }
    let value = trim_ows(&line[colon + 1..]);

    if let Some(filtered) = filtered {
        if filtered.iter().any(|f| name.eq_ignore_ascii_case(f)) {
            trace!("dropping trailing header {:?}", name);
            return Ok(());
        }
    }

    headers.add(name, value).map_err(|_| ParseError::Header)
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let Some((&b' ' | &b'\t', rest)) = bytes.split_first() {
        bytes = rest;
    }
    while let Some((&b' ' | &b'\t', rest)) = bytes.split_last() {
        bytes = rest;
    }
    bytes
}

fn chunk_len(available: usize, remaining: u64, max_chunk_size: usize) -> usize {
    let n = std::cmp::min(available as u64, remaining);
    std::cmp::min(n, max_chunk_size as u64) as usize
}

/// Parses a chunk-size line: case-insensitive hex, with whitespace and any
/// `;`-prefixed extension stripped first.
fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let line = trim_ows(line);
    let end = line
        .iter()
        .position(|&b| b == b';' || b == b' ' || b == b'\t')
        .unwrap_or(line.len());
    let digits = &line[..end];
    if digits.is_empty() {
        return Err(ParseError::ChunkSize);
    }
    let mut size: u64 = 0;
    for &b in digits {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(ParseError::ChunkSize),
        };
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(digit as u64))
            .ok_or(ParseError::ChunkSize)?;
    }
    Ok(size)
}
