//! The fixed protocol surface: built-in request methods and notification
//! names, plus the typed params they carry.
//!
//! The request set is closed: dispatch is a match over [`BuiltinMethod`]
//! with an explicit unmatched arm that falls through to the fallback
//! handler. Method names outside the set are never silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The built-in request methods a guest may call on the host. All of them
/// are served on the guest's behalf by delegating to the upstream catalog
/// service unless the embedder overrides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMethod {
    /// `tools/call`: invoke a catalog tool.
    ToolsCall,
    /// `resources/list`: list catalog resources.
    ResourcesList,
    /// `resources/templates/list`: list resource templates.
    ResourcesTemplatesList,
    /// `resources/read`: read one resource's content.
    ResourcesRead,
    /// `prompts/list`: list catalog prompts.
    PromptsList,
}

impl BuiltinMethod {
    pub const ALL: [BuiltinMethod; 5] = [
        BuiltinMethod::ToolsCall,
        BuiltinMethod::ResourcesList,
        BuiltinMethod::ResourcesTemplatesList,
        BuiltinMethod::ResourcesRead,
        BuiltinMethod::PromptsList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinMethod::ToolsCall => "tools/call",
            BuiltinMethod::ResourcesList => "resources/list",
            BuiltinMethod::ResourcesTemplatesList => "resources/templates/list",
            BuiltinMethod::ResourcesRead => "resources/read",
            BuiltinMethod::PromptsList => "prompts/list",
        }
    }

    /// Classify an inbound method name. `None` means the fallback path.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "tools/call" => Some(BuiltinMethod::ToolsCall),
            "resources/list" => Some(BuiltinMethod::ResourcesList),
            "resources/templates/list" => Some(BuiltinMethod::ResourcesTemplatesList),
            "resources/read" => Some(BuiltinMethod::ResourcesRead),
            "prompts/list" => Some(BuiltinMethod::PromptsList),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuiltinMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-way notification names, both directions.
pub mod notifications {
    /// Host → guest: the surrounding context changed.
    pub const CONTEXT_CHANGED: &str = "notifications/ui/context-changed";
    /// Host → guest: partial-input streaming.
    pub const INPUT: &str = "notifications/ui/input";
    /// Either direction: an operation was cancelled.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Host → guest: the session is about to be discarded.
    pub const TEARDOWN: &str = "notifications/ui/teardown";
    /// Either direction: the tool catalog changed.
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    /// Either direction: the resource catalog changed.
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    /// Either direction: the prompt catalog changed.
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
}

/// Which catalog a list-changed signal refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Tools,
    Resources,
    Prompts,
}

impl ListKind {
    pub fn notification_method(self) -> &'static str {
        match self {
            ListKind::Tools => notifications::TOOLS_LIST_CHANGED,
            ListKind::Resources => notifications::RESOURCES_LIST_CHANGED,
            ListKind::Prompts => notifications::PROMPTS_LIST_CHANGED,
        }
    }
}

/// Params for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Params for `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceParams {
    pub uri: String,
}

/// Params for the context-changed push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextChangedParams {
    pub context: Value,
}

/// Params for the partial-input push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputParams {
    pub text: String,
}

/// Params for a cancellation notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for method in BuiltinMethod::ALL {
            assert_eq!(BuiltinMethod::from_method(method.as_str()), Some(method));
        }
    }

    #[test]
    fn unknown_methods_route_to_fallback() {
        assert_eq!(BuiltinMethod::from_method("x/clipboard/write"), None);
        assert_eq!(BuiltinMethod::from_method("tools/list"), None);
        assert_eq!(BuiltinMethod::from_method(""), None);
    }

    #[test]
    fn call_tool_params_omit_absent_arguments() {
        let params = CallToolParams {
            name: "echo".into(),
            arguments: None,
        };
        let text = serde_json::to_string(&params).unwrap();
        assert_eq!(text, r#"{"name":"echo"}"#);
    }
}
