//! The resource descriptor the bridge consumes at initialization.
//!
//! Payload construction (markup encoding, transfer encodings, host-platform
//! shims) happens elsewhere; by the time content reaches this crate it is
//! just a URI, a MIME type, and either inline text or a reference to fetch.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// A renderable resource as handed to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiResource {
    pub uri: String,
    pub mime_type: String,
    #[serde(flatten)]
    pub content: ResourceContent,
}

/// Inline markup or a reference the surface loads itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ResourceContent {
    Inline { text: String },
    Referenced { external_url: String },
}

/// What the hosting surface was given to mount: a ready resource, or a
/// locator to resolve through the catalog first.
#[derive(Debug, Clone)]
pub enum ContentSource {
    Inline(UiResource),
    Locator(String),
}

impl UiResource {
    /// Parse a catalog read result into a resource descriptor.
    pub(crate) fn from_catalog_value(
        uri: &str,
        value: serde_json::Value,
    ) -> Result<Self, BridgeError> {
        serde_json::from_value(value).map_err(|err| BridgeError::ContentUnavailable {
            uri: uri.to_string(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inline_and_referenced_content_deserialize() {
        let inline: UiResource = serde_json::from_value(json!({
            "uri": "ui://widget/main",
            "mimeType": "text/html",
            "text": "<html></html>",
        }))
        .unwrap();
        assert!(matches!(inline.content, ResourceContent::Inline { .. }));

        let referenced: UiResource = serde_json::from_value(json!({
            "uri": "ui://widget/remote",
            "mimeType": "text/uri-list",
            "externalUrl": "https://widgets.example/main",
        }))
        .unwrap();
        assert!(matches!(
            referenced.content,
            ResourceContent::Referenced { .. }
        ));
    }

    #[test]
    fn malformed_catalog_value_is_content_unavailable() {
        let err =
            UiResource::from_catalog_value("ui://widget/main", json!({"nope": true})).unwrap_err();
        assert!(matches!(err, BridgeError::ContentUnavailable { .. }));
    }
}
