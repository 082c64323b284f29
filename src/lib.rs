#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # halyard
//!
//! halyard is an HTTP/1.x codec built for reactive, handler-chain style
//! transports: bytes in, a stream of typed message objects out, and back
//! again.
//!
//! The crate is deliberately runtime-agnostic. Every piece is a resumable
//! state machine over [`bytes`] buffers; the event loop, socket and pipeline
//! live outside and feed it. What it covers:
//!
//! - A strict-validating, insertion-ordered header multimap
//!   ([`Headers`], [`CombinedHeaders`]).
//! - A resumable inbound parser emitting heads, body chunks and terminators,
//!   with pipelining, chunked transfer coding and trailers
//!   ([`decode::Decoder`]).
//! - The complementary outbound serializer ([`encode::Encoder`]).
//! - Whole-message aggregation with `Expect: 100-continue` and oversize
//!   handling ([`aggregate::Aggregator`]).
//! - gzip/deflate content transforms ([`compress`], feature `compression`).
//! - Client and server protocol upgrade handshakes ([`upgrade`]).
//! - Combined client/server codecs that track pipelined request methods
//!   ([`codec::ClientCodec`], [`codec::ServerCodec`]).
//!
//! # Optional Features
//!
//! - `compression` (default): the content compressor/decompressor stages,
//!   backed by `flate2`.
//! - `codec`: `tokio_util::codec::{Decoder, Encoder}` impls so the pieces
//!   drop straight into a `Framed` transport.
//!
//! # A taste
//!
//! ```
//! use bytes::BytesMut;
//! use halyard::decode::RequestDecoder;
//! use halyard::message::Frame;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut src = BytesMut::from(&b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
//!
//! match decoder.decode(&mut src) {
//!     Some(Frame::Head(head)) => {
//!         assert_eq!(head.uri(), "/hello");
//!         assert_eq!(head.headers.get("host").unwrap(), "x");
//!     }
//!     other => panic!("expected a request head, got {:?}", other),
//! }
//! assert!(matches!(decoder.decode(&mut src), Some(Frame::End(_))));
//! ```

pub use crate::error::{Error, ParseError, Result};
pub use crate::header::{CombinedHeaders, HeaderName, HeaderValue, Headers, Validation};
pub use crate::message::{
    Content, DecodeResult, Frame, FullMessage, FullRequest, FullResponse, LastContent,
    MessageHead, RequestHead, RequestLine, ResponseHead,
};
pub use crate::method::Method;
pub use crate::status::{Status, StatusClass};
pub use crate::version::Version;

pub mod aggregate;
pub mod channel;
pub mod codec;
#[cfg(feature = "compression")]
#[cfg_attr(docsrs, doc(cfg(feature = "compression")))]
pub mod compress;
mod date;
pub mod decode;
pub mod encode;
mod error;
pub mod header;
mod headers;
pub mod message;
pub mod method;
pub mod role;
pub mod status;
pub mod upgrade;
pub mod version;
