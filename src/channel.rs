//! The seam between codec stages and the surrounding transport.
//!
//! The pipeline, executor and socket all live outside this crate. Stages
//! that need to talk back to the transport (answer on the wire, raise an
//! application-visible event, ask for the connection to be closed) receive
//! a [`Channel`] per call rather than owning one, so the codec core holds no
//! reference into the runtime.

use crate::message::{FullRequest, FullResponse};

/// Application-visible events the codec raises through the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum UserEvent {
    /// A client upgrade request has been written to the transport.
    UpgradeIssued,
    /// The server accepted the upgrade; the new protocol owns the
    /// connection.
    UpgradeSuccessful,
    /// The server declined the upgrade; traffic continues as HTTP/1.x.
    UpgradeRejected,
    /// A request's `Expect: 100-continue` could not be honored.
    ExpectationFailed,
    /// A server-side upgrade completed; carries the request that asked for
    /// it, and the protocol that won.
    Upgraded {
        /// The negotiated protocol name.
        protocol: String,
        /// The aggregated request that initiated the upgrade.
        request: FullRequest,
    },
}

/// Per-call access to the transport surrounding the codec.
pub trait Channel {
    /// Queues a response the codec generated itself (`100 Continue`, `413`,
    /// `417`, `101 Switching Protocols`) for the outbound path.
    fn write(&mut self, response: FullResponse);

    /// Surfaces an event to the application.
    fn fire_event(&mut self, event: UserEvent);

    /// Requests connection close once pending writes complete.
    fn schedule_close(&mut self);

    /// Asks the transport glue to reset the inbound decoder so the next
    /// pipelined message can be read.
    fn reset_decoder(&mut self);
}

/// A [`Channel`] that records everything, for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    /// Responses queued by the codec, oldest first.
    pub written: Vec<FullResponse>,
    /// Events fired by the codec, oldest first.
    pub events: Vec<UserEvent>,
    /// Whether close was requested.
    pub close_scheduled: bool,
    /// How many times a decoder reset was requested.
    pub decoder_resets: usize,
}

impl MemoryChannel {
    /// Creates an empty recording channel.
    pub fn new() -> MemoryChannel {
        MemoryChannel::default()
    }
}

impl Channel for MemoryChannel {
    fn write(&mut self, response: FullResponse) {
        self.written.push(response);
    }

    fn fire_event(&mut self, event: UserEvent) {
        self.events.push(event);
    }

    fn schedule_close(&mut self) {
        self.close_scheduled = true;
    }

    fn reset_decoder(&mut self) {
        self.decoder_resets += 1;
    }
}
