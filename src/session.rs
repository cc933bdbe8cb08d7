//! Bridge lifecycle: binding the RPC engine to one mount of the hosting UI
//! surface.
//!
//! A [`BridgeSession`] owns one channel adapter, one correlation registry,
//! and one handler table for exactly one mount. The state machine is
//! `Uninitialized → Initializing → Attached → TearingDown → Detached`;
//! `Detached` is terminal, and a remount means a brand-new session; no
//! state, not even the id counter, survives a rebuild.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument as _;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::channel::ChannelAdapter;
use crate::endpoint::{Endpoint, EndpointHandle};
use crate::error::BridgeError;
use crate::methods::{
    CancelledParams, ContextChangedParams, InputParams, ListKind, ReadResourceParams,
    notifications,
};
use crate::resource::{ContentSource, UiResource};
use crate::router::HandlerTable;

/// Lifecycle states of one bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initializing,
    Attached,
    TearingDown,
    /// Terminal. Nothing is accepted or sent from here on.
    Detached,
}

/// Callback notified when initialization fails, once per distinct failure.
pub type ErrorCallback = Box<dyn Fn(&BridgeError) + Send + Sync>;

/// The aggregate owning all bridge state for one mounted surface.
pub struct BridgeSession {
    id: Uuid,
    state: BridgeState,
    catalog: Arc<dyn Catalog>,
    staged_table: Option<HandlerTable>,
    queued: Vec<(&'static str, Option<Value>)>,
    handle: Option<EndpointHandle>,
    serve_task: Option<JoinHandle<()>>,
    resource: Option<UiResource>,
    on_error: Option<ErrorCallback>,
}

impl BridgeSession {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: BridgeState::Uninitialized,
            catalog,
            staged_table: None,
            queued: Vec::new(),
            handle: None,
            serve_task: None,
            resource: None,
            on_error: None,
        }
    }

    /// Install the handler table the session will attach with.
    pub fn with_handler_table(mut self, table: HandlerTable) -> Self {
        self.staged_table = Some(table);
        self
    }

    /// Install the callback notified of initialization failures.
    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.state == BridgeState::Attached
    }

    /// The resolved content payload, once attached.
    pub fn resource(&self) -> Option<&UiResource> {
        self.resource.as_ref()
    }

    /// The live endpoint handle, once attached.
    pub fn handle(&self) -> Option<&EndpointHandle> {
        self.handle.as_ref()
    }

    /// Mount: resolve the content payload, bind the channel to its one
    /// counterpart, register handlers, and flush any host pushes queued
    /// before attachment.
    ///
    /// On failure the error callback fires once, the session returns to
    /// `Uninitialized`, and the hosting surface shows its error state.
    pub async fn initialize(
        &mut self,
        source: ContentSource,
        adapter: ChannelAdapter,
    ) -> Result<(), BridgeError> {
        if self.state != BridgeState::Uninitialized {
            return Err(BridgeError::InvalidState {
                state: self.state,
                required: BridgeState::Uninitialized,
            });
        }
        self.state = BridgeState::Initializing;
        tracing::debug!(session = %self.id, "bridge initializing");

        let resource = match self.resolve_content(source).await {
            Ok(resource) => resource,
            Err(err) => {
                self.state = BridgeState::Uninitialized;
                if let Some(callback) = &self.on_error {
                    callback(&err);
                }
                tracing::warn!(session = %self.id, error = %err, "bridge initialization failed");
                return Err(err);
            }
        };

        let table = self.staged_table.take().unwrap_or_default();
        let (endpoint, handle) = Endpoint::new(adapter, Some(self.catalog.clone()), table);
        let span = tracing::info_span!("bridge_session", session = %self.id);
        self.serve_task = Some(tokio::spawn(endpoint.serve().instrument(span)));

        // Pushes that arrived before attachment go out now, in order.
        for (method, params) in self.queued.drain(..) {
            let _ = handle.notify(method, params);
        }

        self.handle = Some(handle);
        self.resource = Some(resource);
        self.state = BridgeState::Attached;
        tracing::info!(session = %self.id, "bridge attached");
        Ok(())
    }

    async fn resolve_content(&self, source: ContentSource) -> Result<UiResource, BridgeError> {
        match source {
            ContentSource::Inline(resource) => Ok(resource),
            ContentSource::Locator(uri) => {
                let value = self
                    .catalog
                    .read_resource(ReadResourceParams { uri: uri.clone() })
                    .await?;
                UiResource::from_catalog_value(&uri, value)
            }
        }
    }

    /// Push a context update to the guest.
    pub fn push_context(&mut self, context: Value) -> Result<(), BridgeError> {
        let params = serde_json::to_value(ContextChangedParams { context }).ok();
        self.push(notifications::CONTEXT_CHANGED, params)
    }

    /// Stream a partial-input fragment to the guest.
    pub fn push_input(&mut self, text: impl Into<String>) -> Result<(), BridgeError> {
        let params = serde_json::to_value(InputParams { text: text.into() }).ok();
        self.push(notifications::INPUT, params)
    }

    /// Notify the guest that the surrounding operation was cancelled.
    pub fn push_cancelled(&mut self, reason: Option<String>) -> Result<(), BridgeError> {
        let params = serde_json::to_value(CancelledParams { reason }).ok();
        self.push(notifications::CANCELLED, params)
    }

    /// Signal the guest that a catalog listing changed.
    pub fn notify_list_changed(&mut self, kind: ListKind) -> Result<(), BridgeError> {
        self.push(kind.notification_method(), None)
    }

    fn push(&mut self, method: &'static str, params: Option<Value>) -> Result<(), BridgeError> {
        match self.state {
            BridgeState::Uninitialized | BridgeState::Initializing => {
                self.queued.push((method, params));
                Ok(())
            }
            BridgeState::Attached => {
                if let Some(handle) = &self.handle {
                    // One-way; no acknowledgement is awaited and delivery is
                    // not guaranteed by the transport.
                    let _ = handle.notify(method, params);
                }
                Ok(())
            }
            BridgeState::TearingDown | BridgeState::Detached => Err(BridgeError::Detached),
        }
    }

    /// Replace the handler table wholesale. Before attachment the table is
    /// staged; afterwards it swaps live, without interrupting invocations
    /// already in flight.
    pub fn set_handler_table(&mut self, table: HandlerTable) {
        match &self.handle {
            Some(handle) if self.state == BridgeState::Attached => {
                handle.set_handler_table(table);
            }
            _ => self.staged_table = Some(table),
        }
    }

    /// Unmount: notify the guest best-effort, reject every pending call
    /// with a teardown error, release everything, and become `Detached`.
    /// Idempotent; tearing down a session with nothing pending has no
    /// observable effect beyond releasing resources.
    pub async fn teardown(&mut self) {
        match self.state {
            BridgeState::Detached => {}
            BridgeState::Attached | BridgeState::TearingDown => {
                self.state = BridgeState::TearingDown;
                if let Some(handle) = &self.handle {
                    // Best-effort: no response awaited, delivery failure
                    // swallowed.
                    let _ = handle.notify(notifications::TEARDOWN, None);
                    handle.shutdown();
                }
                if let Some(task) = self.serve_task.take() {
                    let _ = task.await;
                }
                self.handle = None;
                self.queued.clear();
                self.state = BridgeState::Detached;
                tracing::info!(session = %self.id, "bridge detached");
            }
            BridgeState::Uninitialized | BridgeState::Initializing => {
                self.queued.clear();
                self.state = BridgeState::Detached;
            }
        }
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            if !handle.is_shut_down() {
                let _ = handle.notify(notifications::TEARDOWN, None);
                handle.shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::methods::CallToolParams;
    use assert_matches::assert_matches;
    use futures::future::BoxFuture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Catalog double with a canned `resources/read` outcome.
    struct FixtureCatalog {
        read_outcome: Mutex<Option<Result<Value, CatalogError>>>,
    }

    impl FixtureCatalog {
        fn reading(outcome: Result<Value, CatalogError>) -> Arc<Self> {
            Arc::new(Self {
                read_outcome: Mutex::new(Some(outcome)),
            })
        }
    }

    impl Catalog for FixtureCatalog {
        fn call_tool(
            &self,
            _params: CallToolParams,
        ) -> BoxFuture<'_, Result<Value, CatalogError>> {
            Box::pin(async { Ok(Value::Null) })
        }

        fn list_resources(&self) -> BoxFuture<'_, Result<Value, CatalogError>> {
            Box::pin(async { Ok(Value::Null) })
        }

        fn list_resource_templates(&self) -> BoxFuture<'_, Result<Value, CatalogError>> {
            Box::pin(async { Ok(Value::Null) })
        }

        fn read_resource(
            &self,
            _params: ReadResourceParams,
        ) -> BoxFuture<'_, Result<Value, CatalogError>> {
            let outcome = self
                .read_outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(Value::Null));
            Box::pin(async move { outcome })
        }

        fn list_prompts(&self) -> BoxFuture<'_, Result<Value, CatalogError>> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    fn inline_widget() -> ContentSource {
        ContentSource::Inline(UiResource {
            uri: "ui://widget/main".into(),
            mime_type: "text/html".into(),
            content: crate::resource::ResourceContent::Inline {
                text: "<html></html>".into(),
            },
        })
    }

    #[tokio::test]
    async fn initialize_from_inline_payload_attaches() {
        let catalog = FixtureCatalog::reading(Ok(Value::Null));
        let mut session = BridgeSession::new(catalog);
        assert_eq!(session.state(), BridgeState::Uninitialized);

        let (host_adapter, _guest_adapter) = ChannelAdapter::pair("host", "guest");
        session.initialize(inline_widget(), host_adapter).await.unwrap();
        assert_eq!(session.state(), BridgeState::Attached);
        assert_eq!(session.resource().unwrap().uri, "ui://widget/main");

        session.teardown().await;
        assert_eq!(session.state(), BridgeState::Detached);
    }

    #[tokio::test]
    async fn a_session_initializes_at_most_once() {
        let catalog = FixtureCatalog::reading(Ok(Value::Null));
        let mut session = BridgeSession::new(catalog);

        let (host_adapter, _guest) = ChannelAdapter::pair("host", "guest");
        session.initialize(inline_widget(), host_adapter).await.unwrap();

        let (another_adapter, _other_guest) = ChannelAdapter::pair("host", "guest-2");
        let err = session
            .initialize(inline_widget(), another_adapter)
            .await
            .unwrap_err();
        assert_matches!(err, BridgeError::InvalidState { .. });

        session.teardown().await;
    }

    #[tokio::test]
    async fn locator_resolves_through_the_catalog() {
        let catalog = FixtureCatalog::reading(Ok(serde_json::json!({
            "uri": "ui://widget/main",
            "mimeType": "text/html",
            "text": "<html>resolved</html>",
        })));
        let mut session = BridgeSession::new(catalog);

        let (host_adapter, _guest) = ChannelAdapter::pair("host", "guest");
        session
            .initialize(ContentSource::Locator("ui://widget/main".into()), host_adapter)
            .await
            .unwrap();
        assert_eq!(session.resource().unwrap().mime_type, "text/html");

        session.teardown().await;
    }

    #[tokio::test]
    async fn failed_initialization_reports_once_and_stays_unattached() {
        let catalog =
            FixtureCatalog::reading(Err(CatalogError::Unavailable("no route".into())));
        let reported = Arc::new(AtomicUsize::new(0));
        let reported_clone = reported.clone();
        let mut session = BridgeSession::new(catalog).on_error(Box::new(move |_err| {
            reported_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let (host_adapter, _guest) = ChannelAdapter::pair("host", "guest");
        let err = session
            .initialize(ContentSource::Locator("ui://widget/main".into()), host_adapter)
            .await
            .unwrap_err();
        assert_matches!(err, BridgeError::Catalog(_));
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), BridgeState::Uninitialized);
        assert!(session.resource().is_none());
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_terminal() {
        let catalog = FixtureCatalog::reading(Ok(Value::Null));
        let mut session = BridgeSession::new(catalog);

        let (host_adapter, _guest) = ChannelAdapter::pair("host", "guest");
        session.initialize(inline_widget(), host_adapter).await.unwrap();

        session.teardown().await;
        assert_eq!(session.state(), BridgeState::Detached);
        session.teardown().await;
        assert_eq!(session.state(), BridgeState::Detached);

        // Nothing is sent after detach.
        assert_matches!(
            session.push_context(Value::Null),
            Err(BridgeError::Detached)
        );
    }

    #[tokio::test]
    async fn teardown_before_attachment_discards_the_queue() {
        let catalog = FixtureCatalog::reading(Ok(Value::Null));
        let mut session = BridgeSession::new(catalog);
        session.push_input("typed before mount").unwrap();
        session.teardown().await;
        assert_eq!(session.state(), BridgeState::Detached);
    }
}
