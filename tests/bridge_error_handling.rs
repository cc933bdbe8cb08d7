//! Error handling tests for the bridge.
//!
//! Covers the failure paths a caller can observe:
//! - no handler at all (method-not-found)
//! - handler-returned structured errors (forwarded verbatim)
//! - handler panics (wrapped as internal errors, never escaping the router)
//! - catalog failures propagating transparently through built-ins
//! - malformed params for a built-in method

use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::BoxFuture;
use gangway::{
    CallError, CallOptions, CallToolParams, Catalog, CatalogError, ChannelAdapter, Endpoint,
    EndpointHandle, ErrorObject, HandlerTable, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND,
    ReadResourceParams,
};
use serde_json::{Value, json};

/// Catalog double whose tool invocation yields a canned outcome.
struct FixtureCatalog {
    tool_outcome: Result<Value, CatalogError>,
}

impl Catalog for FixtureCatalog {
    fn call_tool(&self, _params: CallToolParams) -> BoxFuture<'_, Result<Value, CatalogError>> {
        let outcome = self.tool_outcome.clone();
        Box::pin(async move { outcome })
    }

    fn list_resources(&self) -> BoxFuture<'_, Result<Value, CatalogError>> {
        Box::pin(async { Ok(json!({"resources": []})) })
    }

    fn list_resource_templates(&self) -> BoxFuture<'_, Result<Value, CatalogError>> {
        Box::pin(async { Ok(json!({"resourceTemplates": []})) })
    }

    fn read_resource(
        &self,
        _params: ReadResourceParams,
    ) -> BoxFuture<'_, Result<Value, CatalogError>> {
        Box::pin(async { Ok(Value::Null) })
    }

    fn list_prompts(&self) -> BoxFuture<'_, Result<Value, CatalogError>> {
        Box::pin(async { Ok(json!({"prompts": []})) })
    }
}

fn spawn_pair(
    host_table: HandlerTable,
    catalog: Option<Arc<dyn Catalog>>,
) -> (EndpointHandle, EndpointHandle) {
    let (host_adapter, guest_adapter) = ChannelAdapter::pair("host", "guest");
    let (host_endpoint, host_handle) = Endpoint::new(host_adapter, catalog, host_table);
    let (guest_endpoint, guest_handle) = Endpoint::new(guest_adapter, None, HandlerTable::new());
    tokio::spawn(host_endpoint.serve());
    tokio::spawn(guest_endpoint.serve());
    (host_handle, guest_handle)
}

#[tokio::test(flavor = "current_thread")]
async fn unhandled_method_rejects_with_method_not_found() {
    // No built-in override, no catalog, no fallback.
    let (_host, guest) = spawn_pair(HandlerTable::new(), None);

    let err = guest
        .issue("x/unknown/method", None, CallOptions::default())
        .await
        .unwrap_err();
    assert_matches!(&err, CallError::Rejected { error, .. } => {
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert!(error.message.contains("x/unknown/method"));
    });
}

#[tokio::test(flavor = "current_thread")]
async fn structured_handler_errors_cross_the_wire_verbatim() {
    let wire_error = ErrorObject::new(-32042, "clipboard denied").with_data(json!({"retry": false}));
    let host_table = HandlerTable::new().with_fallback({
        let wire_error = wire_error.clone();
        move |_request, _cx| {
            let wire_error = wire_error.clone();
            async move { Err(wire_error) }
        }
    });
    let (_host, guest) = spawn_pair(host_table, None);

    let err = guest
        .issue("x/clipboard/write", Some(json!({"text": "hi"})), CallOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, CallError::Rejected { error, .. } => {
        assert_eq!(error, wire_error);
    });
}

#[tokio::test(flavor = "current_thread")]
async fn handler_panic_becomes_an_internal_error_envelope() {
    fn panicking_handler(
        _request: gangway::InboundRequest,
        _cx: gangway::CallContext,
    ) -> BoxFuture<'static, Result<Value, ErrorObject>> {
        Box::pin(async { panic!("handler bug") })
    }
    let host_table = HandlerTable::new().with_fallback(panicking_handler);
    let (_host, guest) = spawn_pair(host_table, None);

    let err = guest
        .issue("x/anything", None, CallOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, CallError::Rejected { error, .. } => {
        assert_eq!(error.code, INTERNAL_ERROR);
    });
    // The host keeps serving after a handler panic.
    let err = guest
        .issue("x/unhandled", None, CallOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, CallError::Rejected { .. });
}

#[tokio::test(flavor = "current_thread")]
async fn catalog_rpc_errors_propagate_verbatim() {
    let upstream = ErrorObject::new(-32020, "tool exploded").with_data(json!({"tool": "echo"}));
    let catalog = Arc::new(FixtureCatalog {
        tool_outcome: Err(CatalogError::Rpc(upstream.clone())),
    });
    let (_host, guest) = spawn_pair(HandlerTable::new(), Some(catalog));

    let err = guest
        .issue(
            "tools/call",
            Some(json!({"name": "echo"})),
            CallOptions::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, CallError::Rejected { error, .. } => {
        assert_eq!(error, upstream);
    });
}

#[tokio::test(flavor = "current_thread")]
async fn unstructured_catalog_failures_are_wrapped_as_internal() {
    let catalog = Arc::new(FixtureCatalog {
        tool_outcome: Err(CatalogError::Unavailable("connection refused".into())),
    });
    let (_host, guest) = spawn_pair(HandlerTable::new(), Some(catalog));

    let err = guest
        .issue(
            "tools/call",
            Some(json!({"name": "echo"})),
            CallOptions::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, CallError::Rejected { error, .. } => {
        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.message.contains("connection refused"));
    });
}

#[tokio::test(flavor = "current_thread")]
async fn malformed_builtin_params_reject_with_invalid_params() {
    let catalog = Arc::new(FixtureCatalog {
        tool_outcome: Ok(json!({"ok": true})),
    });
    let (_host, guest) = spawn_pair(HandlerTable::new(), Some(catalog));

    // `tools/call` requires a `name`; hand it garbage instead.
    let err = guest
        .issue("tools/call", Some(json!({"bogus": 1})), CallOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, CallError::Rejected { error, .. } => {
        assert_eq!(error.code, INVALID_PARAMS);
    });
}

#[tokio::test(flavor = "current_thread")]
async fn builtin_and_fallback_failures_share_one_wire_shape() {
    let host_table = HandlerTable::new()
        .with_builtin(gangway::BuiltinMethod::PromptsList, |_params, _cx| async move {
            Err(ErrorObject::new(-32021, "builtin says no"))
        })
        .with_fallback(|_request, _cx| async move {
            Err(ErrorObject::new(-32021, "fallback says no"))
        });
    let (_host, guest) = spawn_pair(host_table, None);

    let from_builtin = guest
        .issue("prompts/list", None, CallOptions::default())
        .await
        .unwrap_err();
    let from_fallback = guest
        .issue("x/custom", None, CallOptions::default())
        .await
        .unwrap_err();

    // Same code space, same shape; the caller cannot tell the origins apart.
    let builtin_error = from_builtin.error_object().unwrap();
    let fallback_error = from_fallback.error_object().unwrap();
    assert_eq!(builtin_error.code, fallback_error.code);
}
