//! Request router: resolves inbound requests to a handler and emits exactly
//! one response per request.
//!
//! Resolution order is a match over the closed built-in set: an override
//! registered for the method, else the default catalog delegation, else the
//! fallback handler, else a synthesized method-not-found error. Handlers run
//! concurrently and unserialised; each response is matched to its request
//! purely by id, so completion order is free to differ from arrival order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::catalog::Catalog;
use crate::endpoint::EndpointHandle;
use crate::envelope::{ErrorObject, RequestId};
use crate::error::CatalogError;
use crate::methods::BuiltinMethod;

/// An inbound request as presented to a handler.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub params: Option<Value>,
}

/// An inbound notification as presented to the notification hook.
#[derive(Debug, Clone)]
pub struct InboundNotification {
    pub method: String,
    pub params: Option<Value>,
}

/// Context handed to every handler invocation: what was called, by whom,
/// and a handle for sending envelopes back through the same session.
#[derive(Clone)]
pub struct CallContext {
    pub method: String,
    pub id: Option<RequestId>,
    pub origin: crate::channel::PeerId,
    handle: EndpointHandle,
}

impl CallContext {
    pub(crate) fn new(
        method: String,
        id: Option<RequestId>,
        origin: crate::channel::PeerId,
        handle: EndpointHandle,
    ) -> Self {
        Self {
            method,
            id,
            origin,
            handle,
        }
    }

    /// The session handle, usable from a handler to push notifications or
    /// issue calls of its own.
    pub fn handle(&self) -> &EndpointHandle {
        &self.handle
    }
}

/// A handler for one built-in method, overriding the catalog delegation.
pub type RequestHandler =
    Arc<dyn Fn(Option<Value>, CallContext) -> BoxFuture<'static, Result<Value, ErrorObject>> + Send + Sync>;

/// The single catch-all for methods outside the built-in set.
pub type FallbackHandler =
    Arc<dyn Fn(InboundRequest, CallContext) -> BoxFuture<'static, Result<Value, ErrorObject>> + Send + Sync>;

/// Hook for inbound one-way notifications (no response is ever produced).
pub type NotificationHandler =
    Arc<dyn Fn(InboundNotification, CallContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Immutable handler set. Swapped wholesale, never mutated field-by-field;
/// an invocation already dispatched keeps the snapshot it started with.
#[derive(Default, Clone)]
pub struct HandlerTable {
    overrides: HashMap<BuiltinMethod, RequestHandler>,
    fallback: Option<FallbackHandler>,
    on_notification: Option<NotificationHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one built-in method instead of delegating it to the catalog.
    pub fn with_builtin<F, Fut>(mut self, method: BuiltinMethod, handler: F) -> Self
    where
        F: Fn(Option<Value>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        self.overrides
            .insert(method, Arc::new(move |params, cx| handler(params, cx).boxed()));
        self
    }

    /// Install the fallback invoked for any method outside the built-in set.
    pub fn with_fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(InboundRequest, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move |request, cx| handler(request, cx).boxed()));
        self
    }

    /// Install the hook for inbound notifications.
    pub fn with_notification_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(InboundNotification, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_notification = Some(Arc::new(move |notification, cx| {
            handler(notification, cx).boxed()
        }));
        self
    }
}

/// Run one inbound request to completion and send its single response.
pub(crate) async fn dispatch_request(
    table: Arc<HandlerTable>,
    catalog: Option<Arc<dyn Catalog>>,
    id: RequestId,
    request: InboundRequest,
    cx: CallContext,
) {
    let method = request.method.clone();
    let outcome = run_request_handler(table, catalog, request, cx.clone()).await;
    if let Err(error) = &outcome {
        tracing::debug!(%id, %method, code = error.code, "responding with error");
    }
    cx.handle.respond(id, outcome);
}

async fn run_request_handler(
    table: Arc<HandlerTable>,
    catalog: Option<Arc<dyn Catalog>>,
    request: InboundRequest,
    cx: CallContext,
) -> Result<Value, ErrorObject> {
    let fut: BoxFuture<'static, Result<Value, ErrorObject>> =
        match BuiltinMethod::from_method(&request.method) {
            Some(method) => {
                if let Some(handler) = table.overrides.get(&method) {
                    handler.as_ref()(request.params, cx)
                } else if let Some(catalog) = catalog {
                    delegate_to_catalog(catalog, method, request.params).boxed()
                } else if let Some(fallback) = &table.fallback {
                    fallback.as_ref()(request, cx)
                } else {
                    return Err(ErrorObject::method_not_found(&request.method));
                }
            }
            None => match &table.fallback {
                Some(fallback) => fallback.as_ref()(request, cx),
                None => return Err(ErrorObject::method_not_found(&request.method)),
            },
        };

    // A handler that panics must still yield a well-formed error envelope;
    // nothing is allowed to escape the router boundary.
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => Err(ErrorObject::internal_error("handler panicked")),
    }
}

/// Default behavior for the built-in methods: delegate to the catalog
/// service and propagate its outcome transparently.
async fn delegate_to_catalog(
    catalog: Arc<dyn Catalog>,
    method: BuiltinMethod,
    params: Option<Value>,
) -> Result<Value, ErrorObject> {
    let result = match method {
        BuiltinMethod::ToolsCall => catalog.call_tool(parse_params(params)?).await,
        BuiltinMethod::ResourcesList => catalog.list_resources().await,
        BuiltinMethod::ResourcesTemplatesList => catalog.list_resource_templates().await,
        BuiltinMethod::ResourcesRead => catalog.read_resource(parse_params(params)?).await,
        BuiltinMethod::PromptsList => catalog.list_prompts().await,
    };
    result.map_err(CatalogError::into_error_object)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorObject> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(ErrorObject::invalid_params)
}

/// Run one inbound notification through the hook, if any. Never responds.
pub(crate) async fn dispatch_notification(
    table: Arc<HandlerTable>,
    notification: InboundNotification,
    cx: CallContext,
) {
    let Some(handler) = &table.on_notification else {
        tracing::trace!(method = %notification.method, "no notification hook installed");
        return;
    };
    let fut = handler.as_ref()(notification.clone(), cx);
    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
        tracing::warn!(method = %notification.method, "notification handler panicked");
    }
}
