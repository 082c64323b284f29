//! Aggregation of frame streams into whole messages.
//!
//! [`Aggregator`] sits after the decoder and buffers a message's frames
//! until the terminator, emitting one [`FullMessage`]. Along the way it
//! enforces a size limit (answering oversized requests with `413` and
//! failing oversized responses), and answers `Expect: 100-continue` before
//! the client commits to sending a body.

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::channel::{Channel, UserEvent};
use crate::error::{Error, Result, User};
use crate::header::{names, Headers};
use crate::headers::{content_length, is_keep_alive};
use crate::message::{
    Content, DecodeResult, Frame, FullMessage, LastContent, MessageHead, RequestLine,
};
use crate::role::MessageKind;
use crate::status::Status;

/// Aggregates inbound requests, as a server.
pub type RequestAggregator = Aggregator<RequestLine>;

/// Aggregates inbound responses, as a client.
pub type ResponseAggregator = Aggregator<Status>;

#[derive(Debug)]
enum AggState<S> {
    Idle,
    Aggregating {
        head: MessageHead<S>,
        body: BytesMut,
    },
    /// Swallowing the rest of a message that was already answered (417 or
    /// 413), so the next pipelined message can be read.
    Discarding,
}

/// Buffers a head plus its content frames into a [`FullMessage`].
#[derive(Debug)]
pub struct Aggregator<S: MessageKind> {
    max_content_length: usize,
    close_on_expectation_failed: bool,
    state: AggState<S>,
}

impl<S: MessageKind> Aggregator<S> {
    /// Creates an aggregator that tolerates bodies up to
    /// `max_content_length` bytes.
    pub fn new(max_content_length: usize) -> Aggregator<S> {
        Aggregator {
            max_content_length,
            close_on_expectation_failed: false,
            state: AggState::Idle,
        }
    }

    /// Whether a failed expectation closes the connection after the `417`
    /// goes out, instead of discarding the body and reading on.
    pub fn set_close_on_expectation_failed(&mut self, close: bool) {
        self.close_on_expectation_failed = close;
    }

    /// Consumes one inbound frame; yields a whole message when its
    /// terminator arrives.
    pub fn read(
        &mut self,
        ctx: &mut dyn Channel,
        frame: Frame<S>,
    ) -> Result<Option<FullMessage<S>>> {
        match frame {
            Frame::Head(head) => self.read_head(ctx, head),
            Frame::Chunk(content) => self.read_chunk(ctx, content),
            Frame::End(last) => Ok(self.read_end(last)),
            Frame::Raw(_) => Err(Error::new_user(User::UnexpectedFrame)),
        }
    }

    /// Drops any partially aggregated message; call when the connection
    /// goes away.
    pub fn channel_inactive(&mut self) {
        if matches!(self.state, AggState::Aggregating { .. }) {
            trace!("discarding partial aggregation on inactive channel");
        }
        self.state = AggState::Idle;
    }

    fn read_head(
        &mut self,
        ctx: &mut dyn Channel,
        head: MessageHead<S>,
    ) -> Result<Option<FullMessage<S>>> {
        if !matches!(self.state, AggState::Idle) {
            return Err(Error::new_user(User::UnexpectedFrame));
        }

        // a message that already failed to decode is passed on whole, so
        // downstream sees the failure exactly once
        if !head.decode_result.is_success() {
            return Ok(Some(FullMessage::new(head)));
        }

        let declared = content_length(&head.headers).ok().flatten();

        if S::IS_REQUEST && expects_continue(&head.headers) {
            if declared.map_or(false, |len| len > self.max_content_length as u64) {
                debug!("expectation failed: declared length {:?}", declared);
                ctx.write(expectation_failed());
                ctx.fire_event(UserEvent::ExpectationFailed);
                if self.close_on_expectation_failed {
                    ctx.schedule_close();
                }
                self.state = AggState::Discarding;
                return Ok(None);
            }
            trace!("replying 100 Continue");
            ctx.write(FullMessage::new(MessageHead::new(Status::CONTINUE)));
        } else if declared.map_or(false, |len| len > self.max_content_length as u64) {
            return self.oversized(ctx, &head, false).map(|()| None);
        }

        self.state = AggState::Aggregating {
            head,
            body: BytesMut::new(),
        };
        Ok(None)
    }

    fn read_chunk(
        &mut self,
        ctx: &mut dyn Channel,
        content: Content,
    ) -> Result<Option<FullMessage<S>>> {
        let over = match self.state {
            AggState::Discarding => return Ok(None),
            AggState::Idle => return Err(Error::new_user(User::UnexpectedFrame)),
            AggState::Aggregating { ref body, .. } => {
                body.len() + content.len() > self.max_content_length
            }
        };
        if over {
            let head = match std::mem::replace(&mut self.state, AggState::Idle) {
                AggState::Aggregating { head, .. } => head,
                _ => unreachable!("checked above"),
            };
            return self.oversized(ctx, &head, true).map(|()| None);
        }
        if let AggState::Aggregating { ref mut body, .. } = self.state {
            body.extend_from_slice(content.data());
        }
        Ok(None)
    }

    fn read_end(&mut self, last: LastContent) -> Option<FullMessage<S>> {
        match std::mem::replace(&mut self.state, AggState::Idle) {
            AggState::Discarding | AggState::Idle => None,
            AggState::Aggregating { mut head, mut body } => {
                let failed = last.decode_result.clone();
                let (data, trailers) = last.into_parts();
                body.extend_from_slice(&data);

                if let DecodeResult::Failure(_) = failed {
                    head.decode_result = failed;
                    return Some(FullMessage {
                        head,
                        body: body.freeze(),
                        trailers,
                    });
                }

                // chunked framing dissolves on aggregation
                head.headers.remove(names::TRANSFER_ENCODING);
                if !head.headers.contains(names::CONTENT_LENGTH) {
                    head.headers
                        .set(names::CONTENT_LENGTH, body.len() as u64)
                        .expect("length header is always valid");
                }
                Some(FullMessage {
                    head,
                    body: body.freeze(),
                    trailers,
                })
            }
        }
    }

    fn oversized(
        &mut self,
        ctx: &mut dyn Channel,
        head: &MessageHead<S>,
        mid_body: bool,
    ) -> Result<()> {
        if S::IS_REQUEST {
            debug!("request body over {} bytes, answering 413", self.max_content_length);
            ctx.write(entity_too_large());
            // the client may be committed to sending the rest; only a
            // fresh, quiet connection is worth keeping
            if mid_body || !is_keep_alive(&head.version, &head.headers) {
                ctx.schedule_close();
            }
            ctx.reset_decoder();
            self.state = AggState::Discarding;
            Ok(())
        } else {
            debug!("response body over {} bytes", self.max_content_length);
            ctx.schedule_close();
            self.state = AggState::Idle;
            Err(Error::new_too_long_frame())
        }
    }
}

fn expects_continue(headers: &Headers) -> bool {
    headers.contains_value(names::EXPECT, "100-continue", true)
}

fn expectation_failed() -> FullMessage<Status> {
    let mut head = MessageHead::new(Status::EXPECTATION_FAILED);
    head.headers
        .set(names::CONTENT_LENGTH, 0u64)
        .expect("length header is always valid");
    FullMessage::new(head)
}

fn entity_too_large() -> FullMessage<Status> {
    let mut head = MessageHead::new(Status::REQUEST_ENTITY_TOO_LARGE);
    head.headers
        .set(names::CONTENT_LENGTH, 0u64)
        .expect("length header is always valid");
    FullMessage::new(head)
}
