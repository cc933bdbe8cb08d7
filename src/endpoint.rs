//! The endpoint engine: one side of a bridge channel.
//!
//! An [`Endpoint`] binds a channel adapter, the correlation registry, and a
//! handler table into a serve loop. The same engine drives either side:
//! the host wraps one in a [`crate::session::BridgeSession`], while a guest
//! uses it directly to issue calls and receive pushes.
//!
//! [`Endpoint::serve`] consumes the endpoint and runs until the bus closes
//! or the session is shut down; the cloneable [`EndpointHandle`] is how
//! everything else talks to the connection while it runs.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::channel::{ChannelAdapter, ChannelSender, Delivery};
use crate::envelope::{Envelope, ErrorObject, RequestId};
use crate::error::CallError;
use crate::registry::{CallOptions, PendingCalls, await_settlement};
use crate::router::{
    CallContext, HandlerTable, InboundNotification, InboundRequest, dispatch_notification,
    dispatch_request,
};

struct Shared {
    sender: ChannelSender,
    pending: PendingCalls,
    handlers: Mutex<Arc<HandlerTable>>,
    teardown: CancellationToken,
}

/// One side of the bridge channel. Construct with [`Endpoint::new`], then
/// drive with [`Endpoint::serve`].
pub struct Endpoint {
    adapter: ChannelAdapter,
    shared: Arc<Shared>,
    catalog: Option<Arc<dyn Catalog>>,
}

/// Cloneable handle for issuing calls, pushing notifications, and swapping
/// the handler table while the endpoint is being served.
#[derive(Clone)]
pub struct EndpointHandle {
    shared: Arc<Shared>,
}

impl Endpoint {
    /// Bind an adapter, an optional catalog (serving the built-in methods),
    /// and the initial handler table.
    pub fn new(
        adapter: ChannelAdapter,
        catalog: Option<Arc<dyn Catalog>>,
        handlers: HandlerTable,
    ) -> (Self, EndpointHandle) {
        let shared = Arc::new(Shared {
            sender: adapter.sender(),
            pending: PendingCalls::new(),
            handlers: Mutex::new(Arc::new(handlers)),
            teardown: CancellationToken::new(),
        });
        let handle = EndpointHandle {
            shared: shared.clone(),
        };
        (
            Self {
                adapter,
                shared,
                catalog,
            },
            handle,
        )
    }

    /// Process deliveries until the bus closes or the handle shuts the
    /// session down. Handlers dispatched from here run concurrently; their
    /// responses are matched by id, not by completion order. On exit every
    /// still-pending call is settled with a teardown rejection.
    pub async fn serve(self) {
        let Endpoint {
            mut adapter,
            shared,
            catalog,
        } = self;
        let teardown = shared.teardown.clone();
        let mut inflight: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();

        loop {
            tokio::select! {
                _ = teardown.cancelled() => break,
                Some(()) = inflight.next(), if !inflight.is_empty() => {}
                delivery = adapter.recv() => match delivery {
                    Some(delivery) => {
                        on_delivery(&adapter, &shared, &catalog, delivery, &mut inflight);
                    }
                    None => {
                        tracing::debug!("bus closed; endpoint stopping");
                        break;
                    }
                }
            }
        }

        shared.pending.sweep();
    }
}

fn on_delivery(
    adapter: &ChannelAdapter,
    shared: &Arc<Shared>,
    catalog: &Option<Arc<dyn Catalog>>,
    delivery: Delivery,
    inflight: &mut FuturesUnordered<BoxFuture<'static, ()>>,
) {
    // Dropped with no observable reaction of any kind: an untrusted sender
    // must not learn whether its payload parsed, matched a pending id, or
    // was ever seen at all.
    if !adapter.is_trusted_sender(&delivery.origin) {
        return;
    }

    let envelope: Envelope = match serde_json::from_value(delivery.payload) {
        Ok(envelope) => envelope,
        Err(_) => {
            // The bus is shared; unrelated traffic is not ours to complain
            // about.
            tracing::trace!("ignoring non-envelope payload");
            return;
        }
    };

    match envelope {
        Envelope::Success { id, result, .. } => {
            // An id matching no pending call (late, duplicate) is ignored.
            shared.pending.settle(id, Ok(result));
        }
        Envelope::Failure { id, error, .. } => {
            shared.pending.settle(id, Err(error));
        }
        Envelope::Request {
            id, method, params, ..
        } => {
            let table = shared.handlers.lock().unwrap().clone();
            let handle = EndpointHandle {
                shared: shared.clone(),
            };
            let cx = CallContext::new(method.clone(), Some(id), delivery.origin, handle);
            let request = InboundRequest { method, params };
            inflight.push(dispatch_request(table, catalog.clone(), id, request, cx).boxed());
        }
        Envelope::Notification { method, params, .. } => {
            let table = shared.handlers.lock().unwrap().clone();
            let handle = EndpointHandle {
                shared: shared.clone(),
            };
            let cx = CallContext::new(method.clone(), None, delivery.origin, handle);
            let notification = InboundNotification { method, params };
            inflight.push(dispatch_notification(table, notification, cx).boxed());
        }
    }
}

impl EndpointHandle {
    /// Issue a request and await its settlement.
    ///
    /// The pending-call entry is registered before the envelope is handed to
    /// the adapter, so even an instantaneous response cannot race ahead of
    /// the bookkeeping. Exactly one of the settlement paths (response,
    /// timeout, cancellation, teardown) wins.
    pub async fn issue(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value, CallError> {
        if self.shared.teardown.is_cancelled() {
            return Err(CallError::Teardown {
                method: method.to_string(),
            });
        }
        if self.shared.sender.counterpart().is_none() {
            // Nothing is sent in this case.
            return Err(CallError::NoCounterpart {
                method: method.to_string(),
            });
        }
        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return Err(CallError::Aborted {
                    method: method.to_string(),
                });
            }
        }

        let id = self.shared.pending.allocate_id();
        let rx = self.shared.pending.register(id, method);
        self.shared
            .sender
            .send(&Envelope::request(id, method, params));

        await_settlement(&self.shared.pending, id, rx, &options, method).await
    }

    /// Send a one-way notification. No acknowledgement is awaited and none
    /// ever arrives.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), CallError> {
        if self.shared.teardown.is_cancelled() {
            return Err(CallError::Teardown {
                method: method.to_string(),
            });
        }
        if self.shared.sender.counterpart().is_none() {
            return Err(CallError::NoCounterpart {
                method: method.to_string(),
            });
        }
        self.shared.sender.send(&Envelope::notification(method, params));
        Ok(())
    }

    /// Replace the handler table wholesale. Invocations already dispatched
    /// keep running against the snapshot they were dispatched with.
    pub fn set_handler_table(&self, table: HandlerTable) {
        *self.shared.handlers.lock().unwrap() = Arc::new(table);
    }

    /// Number of calls currently awaiting settlement.
    pub fn outstanding_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Stop the endpoint and reject every pending call with a teardown
    /// error. Idempotent. After this, no envelope is accepted or sent.
    pub fn shutdown(&self) {
        self.shared.teardown.cancel();
        self.shared.pending.sweep();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.teardown.is_cancelled()
    }

    /// Send the single response for an inbound request.
    pub(crate) fn respond(&self, id: RequestId, outcome: Result<Value, ErrorObject>) {
        if self.shared.teardown.is_cancelled() {
            tracing::debug!(%id, "session shut down; dropping response");
            return;
        }
        let envelope = match outcome {
            Ok(result) => Envelope::success(id, result),
            Err(error) => Envelope::failure(id, error),
        };
        self.shared.sender.send(&envelope);
    }
}
