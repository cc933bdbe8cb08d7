//! Interface to the upstream catalog service.
//!
//! The service behind this trait supplies tool, resource, and prompt data
//! through its own request/response calls with independent failure
//! semantics. The bridge delegates the built-in methods here and propagates
//! success and failure transparently: no retry, no result shaping.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::CatalogError;
use crate::methods::{CallToolParams, ReadResourceParams};

/// Host-side reachability to the catalog service. Implementations are
/// supplied by the embedder (an MCP client connection, a test double, ...).
pub trait Catalog: Send + Sync + 'static {
    /// Invoke a tool on the guest's behalf.
    fn call_tool(&self, params: CallToolParams) -> BoxFuture<'_, Result<Value, CatalogError>>;

    /// List available resources.
    fn list_resources(&self) -> BoxFuture<'_, Result<Value, CatalogError>>;

    /// List resource templates.
    fn list_resource_templates(&self) -> BoxFuture<'_, Result<Value, CatalogError>>;

    /// Read one resource's content.
    fn read_resource(&self, params: ReadResourceParams)
    -> BoxFuture<'_, Result<Value, CatalogError>>;

    /// List available prompts.
    fn list_prompts(&self) -> BoxFuture<'_, Result<Value, CatalogError>>;
}
