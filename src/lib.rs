//! gangway: typed request/response bridge between a host application and a
//! sandboxed guest UI surface.
//!
//! The only primitive the environment provides is asynchronous, unordered,
//! fire-and-forget message delivery with sender identities. This crate turns
//! that into a reliable RPC channel: requests correlate to responses by id,
//! timeouts and cancellation race cleanly against settlement, inbound calls
//! route to built-in handlers (backed by an upstream catalog service) or a
//! user-supplied fallback, deliveries from anyone but the bound counterpart
//! are dropped, and a session state machine binds all of it to one mount of
//! the hosting surface.
//!
//! The [`Endpoint`] engine is symmetric; it can be the basis for either
//! side of the channel. A host wraps one in a [`BridgeSession`], which adds
//! content resolution, pre-attachment push queueing, and teardown; a guest
//! drives the endpoint directly.

mod catalog;
mod channel;
mod endpoint;
mod envelope;
mod error;
mod methods;
mod registry;
mod resource;
mod router;
mod session;

pub use catalog::Catalog;
pub use channel::{ChannelAdapter, ChannelSender, Delivery, PeerId};
pub use endpoint::{Endpoint, EndpointHandle};
pub use envelope::{
    Envelope, ErrorObject, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PROTOCOL_VERSION,
    ProtocolMarker, RequestId,
};
pub use error::{BridgeError, CallError, CatalogError};
pub use methods::{
    BuiltinMethod, CallToolParams, CancelledParams, ContextChangedParams, InputParams, ListKind,
    ReadResourceParams, notifications,
};
pub use registry::{CallOptions, DEFAULT_CALL_TIMEOUT};
pub use resource::{ContentSource, ResourceContent, UiResource};
pub use router::{
    CallContext, FallbackHandler, HandlerTable, InboundNotification, InboundRequest,
    NotificationHandler, RequestHandler,
};
pub use session::{BridgeSession, BridgeState, ErrorCallback};
