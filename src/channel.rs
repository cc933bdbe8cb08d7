//! Channel adapter over the environment's message bus.
//!
//! The only primitive the environment provides is asynchronous, fire-and-
//! forget delivery of a JSON payload to a single recipient, with each
//! delivery tagged with the sender's transport-level identity. The adapter
//! wraps one such bus endpoint: it encodes outgoing envelopes, hands back the
//! inbound delivery stream, and answers the one trust question that matters:
//! does this delivery come from the counterpart this bridge was bound to?

use serde_json::Value;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// Transport-level identity of one side of the channel (an origin string in
/// a browser embedding, a peer address elsewhere).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// One message as handed over by the bus: the raw JSON payload plus the
/// sender identity claimed by the transport. The payload is untrusted and
/// may not be an envelope at all (other traffic shares the bus).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub origin: PeerId,
    pub payload: Value,
}

/// The sending half of an adapter. Cheap to clone; envelopes it sends are
/// stamped with the local identity.
#[derive(Clone)]
pub struct ChannelSender {
    local: PeerId,
    counterpart: Option<PeerId>,
    tx: Option<mpsc::UnboundedSender<Delivery>>,
}

impl ChannelSender {
    /// The single counterpart this adapter is bound to, if any.
    pub fn counterpart(&self) -> Option<&PeerId> {
        self.counterpart.as_ref()
    }

    /// Fire-and-forget send. Delivery is not guaranteed by the transport, so
    /// a closed bus is not an error here; a pending call covering this send
    /// settles through its timeout instead.
    pub fn send(&self, envelope: &Envelope) {
        let Some(tx) = &self.tx else {
            tracing::debug!(method = ?envelope.method(), "no counterpart attached; dropping envelope");
            return;
        };
        match serde_json::to_value(envelope) {
            Ok(payload) => {
                if tx
                    .send(Delivery {
                        origin: self.local.clone(),
                        payload,
                    })
                    .is_err()
                {
                    tracing::debug!(method = ?envelope.method(), "bus closed; dropping envelope");
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to encode envelope");
            }
        }
    }
}

/// One endpoint of the channel: a sender bound to the counterpart plus the
/// inbound delivery stream.
pub struct ChannelAdapter {
    sender: ChannelSender,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl ChannelAdapter {
    /// Wrap bus endpoints supplied by the environment. `counterpart` is the
    /// one identity this adapter will accept deliveries from; `None` models
    /// a top-level context with nothing to talk to.
    pub fn new(
        local: impl Into<PeerId>,
        counterpart: Option<PeerId>,
        outgoing: mpsc::UnboundedSender<Delivery>,
        incoming: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            sender: ChannelSender {
                local: local.into(),
                counterpart,
                tx: Some(outgoing),
            },
            rx: incoming,
        }
    }

    /// A linked pair of adapters over an in-process bus, one per side. The
    /// message-bus analog of a duplex pipe; used by tests and by embedders
    /// hosting the guest in-process.
    pub fn pair(a: impl Into<PeerId>, b: impl Into<PeerId>) -> (Self, Self) {
        let a = a.into();
        let b = b.into();
        let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
        (
            Self::new(a.clone(), Some(b.clone()), a_to_b_tx, b_to_a_rx),
            Self::new(b, Some(a), b_to_a_tx, a_to_b_rx),
        )
    }

    /// An adapter with no counterpart. Calls issued through it reject with a
    /// no-counterpart error without anything being sent.
    pub fn detached(local: impl Into<PeerId>) -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: ChannelSender {
                local: local.into(),
                counterpart: None,
                tx: None,
            },
            rx,
        }
    }

    pub fn counterpart(&self) -> Option<&PeerId> {
        self.sender.counterpart()
    }

    /// Whether a delivery claiming this origin may be processed. Only the
    /// single counterpart recorded at binding time is trusted.
    pub fn is_trusted_sender(&self, origin: &PeerId) -> bool {
        self.sender.counterpart() == Some(origin)
    }

    pub(crate) fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub(crate) async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}
