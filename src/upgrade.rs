//! Protocol upgrade handshakes (HTTP/1.1 → h2c, WebSocket, …).
//!
//! Both sides are specialized aggregators: they buffer the message that
//! carries the handshake, negotiate against a pluggable [`UpgradeCodec`] /
//! [`UpgradeCodecFactory`], and on success hand the pipeline swap to the
//! codec and fire the corresponding [`UserEvent`]. A failed negotiation is
//! not an error; traffic continues as plain HTTP/1.x.

use tracing::{debug, trace};

use crate::aggregate::{RequestAggregator, ResponseAggregator};
use crate::channel::{Channel, UserEvent};
use crate::error::{Error, Result, User};
use crate::header::{names, Headers};
use crate::message::{Frame, FullMessage, FullRequest, FullResponse, MessageHead, RequestLine};
use crate::status::Status;

/// A client-side collaborator that knows one protocol's handshake and how
/// to install its handlers once the server agrees.
pub trait UpgradeCodec {
    /// The protocol name sent in `Upgrade`.
    fn protocol(&self) -> &str;

    /// Adds protocol-specific headers to the upgrade request, returning the
    /// names of those that must be announced in `Connection`.
    fn setup_request(&self, headers: &mut Headers) -> Vec<String>;

    /// Performs the pipeline swap after the server accepted.
    fn upgrade(&self, ctx: &mut dyn Channel) -> Result<()>;
}

/// A server-side collaborator for one upgradable protocol.
pub trait ServerUpgradeCodec {
    /// Header names the client must announce in `Connection` and carry in
    /// the request.
    fn required_headers(&self) -> Vec<String>;

    /// Inspects the request and appends headers to the `101` response.
    /// Returning `false` aborts the upgrade.
    fn prepare_response(&self, request: &FullRequest, headers: &mut Headers) -> bool;

    /// Performs the pipeline swap after the `101` was written.
    fn upgrade(&self, ctx: &mut dyn Channel, request: &FullRequest) -> Result<()>;
}

/// Creates a [`ServerUpgradeCodec`] for a requested protocol, or `None` if
/// the protocol is not served.
pub trait UpgradeCodecFactory {
    /// Looks up a codec by protocol name.
    fn new_codec(&self, protocol: &str) -> Option<Box<dyn ServerUpgradeCodec>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UpgradeState {
    Idle,
    AwaitingResponse,
    Done,
}

/// Client side of the upgrade handshake.
///
/// The first outbound request is rewritten into an upgrade request; while
/// the response is pending, further outbound requests fail fast. The
/// response is aggregated: a matching `101` triggers the swap and is
/// consumed, anything else flows on as a normal response.
#[derive(Debug)]
pub struct ClientUpgradeHandler<C> {
    codec: C,
    state: UpgradeState,
    aggregator: ResponseAggregator,
}

impl<C: UpgradeCodec> ClientUpgradeHandler<C> {
    /// Creates a handler that will negotiate with `codec` and aggregate the
    /// handshake response up to `max_content_length` bytes.
    pub fn new(codec: C, max_content_length: usize) -> ClientUpgradeHandler<C> {
        ClientUpgradeHandler {
            codec,
            state: UpgradeState::Idle,
            aggregator: ResponseAggregator::new(max_content_length),
        }
    }

    /// Processes an outbound frame, returning what should go to the encoder.
    pub fn write(
        &mut self,
        ctx: &mut dyn Channel,
        frame: Frame<RequestLine>,
    ) -> Result<Frame<RequestLine>> {
        match self.state {
            UpgradeState::Idle => {
                if let Frame::Head(mut head) = frame {
                    self.set_upgrade_headers(&mut head.headers)?;
                    self.state = UpgradeState::AwaitingResponse;
                    ctx.fire_event(UserEvent::UpgradeIssued);
                    trace!("upgrade request issued for {:?}", self.codec.protocol());
                    return Ok(Frame::Head(head));
                }
                Ok(frame)
            }
            UpgradeState::AwaitingResponse => {
                if frame.is_head() {
                    return Err(Error::new_user(User::WriteWhileUpgrading));
                }
                Ok(frame)
            }
            UpgradeState::Done => Ok(frame),
        }
    }

    /// Processes an inbound frame; yields aggregated responses that should
    /// continue downstream. The accepted `101` itself yields nothing.
    pub fn read(
        &mut self,
        ctx: &mut dyn Channel,
        frame: Frame<Status>,
    ) -> Result<Option<FullResponse>> {
        let full = match self.aggregator.read(ctx, frame)? {
            Some(full) => full,
            None => return Ok(None),
        };

        if self.state != UpgradeState::AwaitingResponse {
            return Ok(Some(full));
        }
        self.state = UpgradeState::Done;

        let accepted = full.head.subject == Status::SWITCHING_PROTOCOLS
            && full
                .head
                .headers
                .get(names::UPGRADE)
                .map_or(false, |v| v.eq_ignore_case(self.codec.protocol()));

        if accepted {
            self.codec.upgrade(ctx)?;
            ctx.fire_event(UserEvent::UpgradeSuccessful);
            trace!("upgrade accepted");
            Ok(None)
        } else {
            debug!("upgrade rejected with status {}", full.head.subject);
            ctx.fire_event(UserEvent::UpgradeRejected);
            Ok(Some(full))
        }
    }

    fn set_upgrade_headers(&self, headers: &mut Headers) -> Result<()> {
        headers.set(names::UPGRADE, self.codec.protocol())?;
        let mut connection = self.codec.setup_request(headers).join(",");
        if !connection.is_empty() {
            connection.push(',');
        }
        connection.push_str("upgrade");
        headers.set(names::CONNECTION, connection)?;
        Ok(())
    }
}

/// Server side of the upgrade handshake.
///
/// Aggregates every inbound request; ones carrying a negotiable `Upgrade`
/// header are answered with `101 Switching Protocols` and consumed, all
/// others (including failed negotiations) come back out whole.
pub struct ServerUpgradeHandler<F> {
    factory: F,
    aggregator: RequestAggregator,
}

impl<F: UpgradeCodecFactory> ServerUpgradeHandler<F> {
    /// Creates a handler negotiating via `factory`, aggregating requests up
    /// to `max_content_length` bytes.
    pub fn new(factory: F, max_content_length: usize) -> ServerUpgradeHandler<F> {
        ServerUpgradeHandler {
            factory,
            aggregator: RequestAggregator::new(max_content_length),
        }
    }

    /// Processes an inbound frame; yields requests that should continue
    /// downstream. An accepted upgrade request yields nothing: the `101`
    /// goes out through `ctx` and the upgrade event carries the request.
    pub fn read(
        &mut self,
        ctx: &mut dyn Channel,
        frame: Frame<RequestLine>,
    ) -> Result<Option<FullRequest>> {
        let full = match self.aggregator.read(ctx, frame)? {
            Some(full) => full,
            None => return Ok(None),
        };

        if !full.head.decode_result.is_success() || !full.head.headers.contains(names::UPGRADE) {
            return Ok(Some(full));
        }

        let (protocol, codec) = match self.select_codec(&full) {
            Some(found) => found,
            // not an error: the request continues as plain HTTP
            None => return Ok(Some(full)),
        };

        if !connection_announces(&full, &codec.required_headers()) {
            debug!("upgrade request with incomplete Connection header");
            return Ok(Some(full));
        }

        let mut response_headers = Headers::new();
        if !codec.prepare_response(&full, &mut response_headers) {
            debug!("upgrade codec declined {:?}", protocol);
            return Ok(Some(full));
        }

        let mut head = MessageHead::new(Status::SWITCHING_PROTOCOLS);
        head.headers
            .set(names::CONNECTION, "upgrade")
            .expect("static header is valid");
        head.headers
            .set(names::UPGRADE, protocol.as_str())
            .expect("valid protocol token");
        head.headers
            .set(names::CONTENT_LENGTH, 0u64)
            .expect("length header is always valid");
        for (name, value) in &response_headers {
            head.headers
                .add(name.as_str(), value.clone())
                .expect("codec-prepared header is valid");
        }
        ctx.write(FullMessage::new(head));

        codec.upgrade(ctx, &full)?;
        trace!("upgraded to {:?}", protocol);
        ctx.fire_event(UserEvent::Upgraded {
            protocol,
            request: full,
        });
        Ok(None)
    }

    /// The requested protocols in client preference order, mapped to the
    /// first one the factory serves.
    fn select_codec(&self, request: &FullRequest) -> Option<(String, Box<dyn ServerUpgradeCodec>)> {
        let requested = request.head.headers.get(names::UPGRADE)?;
        for protocol in requested.to_str()?.split(',') {
            let protocol = protocol.trim();
            if let Some(codec) = self.factory.new_codec(protocol) {
                return Some((protocol.to_owned(), codec));
            }
        }
        debug!("none of the requested protocols are served: {:?}", requested);
        None
    }
}

impl<F> std::fmt::Debug for ServerUpgradeHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerUpgradeHandler").finish()
    }
}

/// The `Connection` header must announce `upgrade` and every protocol-
/// required header, and the request must actually carry those headers.
fn connection_announces(request: &FullRequest, required: &[String]) -> bool {
    let headers = &request.head.headers;
    if !headers.contains_token(names::CONNECTION, "upgrade", true) {
        return false;
    }
    required.iter().all(|name| {
        headers.contains_token(names::CONNECTION, name, true) && headers.contains(name)
    })
}
