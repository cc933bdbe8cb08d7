//! Error taxonomy for bridge calls and session lifecycle.

use std::time::Duration;

use crate::envelope::ErrorObject;
use crate::session::BridgeState;

/// Why a call issued through the bridge failed to produce a result.
///
/// Every caller-visible failure is one of these kinds. Forged-sender and
/// unmatched-id responses are deliberately *not* represented here: they are
/// discarded silently so that a forger gets no observable feedback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The call exceeded its timeout budget.
    #[error("call to `{method}` timed out after {elapsed:?}")]
    Timeout { method: String, elapsed: Duration },

    /// The caller's cancellation signal fired, either before the call was
    /// sent or while it was pending.
    #[error("call to `{method}` was aborted")]
    Aborted { method: String },

    /// Issued with no counterpart attached; nothing was sent.
    #[error("no counterpart attached; `{method}` was not sent")]
    NoCounterpart { method: String },

    /// The session was torn down while the call was outstanding.
    #[error("session torn down while `{method}` was outstanding")]
    Teardown { method: String },

    /// The counterpart answered with an error envelope. Carries the wire
    /// error verbatim, whether it came from a built-in handler, the
    /// fallback, or the method-not-found synthesizer.
    #[error("call to `{method}` rejected: {error}")]
    Rejected { method: String, error: ErrorObject },
}

impl CallError {
    /// The method name the failed call was issued with.
    pub fn method(&self) -> &str {
        match self {
            CallError::Timeout { method, .. }
            | CallError::Aborted { method }
            | CallError::NoCounterpart { method }
            | CallError::Teardown { method }
            | CallError::Rejected { method, .. } => method,
        }
    }

    /// The structured wire error, when the counterpart rejected the call.
    pub fn error_object(&self) -> Option<&ErrorObject> {
        match self {
            CallError::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Failure reaching the upstream catalog service (tools, resources,
/// prompts). Propagated transparently into the error envelope the guest
/// sees: a structured error crosses the wire verbatim, anything else is
/// wrapped as an internal error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    Rpc(ErrorObject),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub(crate) fn into_error_object(self) -> ErrorObject {
        match self {
            CatalogError::Rpc(error) => error,
            CatalogError::Unavailable(detail) => ErrorObject::internal_error(detail),
        }
    }
}

/// Lifecycle failures surfaced to the hosting surface (and to its error
/// callback, once per distinct failure).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A lifecycle operation was attempted from the wrong state.
    #[error("bridge session is {state:?}; operation requires {required:?}")]
    InvalidState {
        state: BridgeState,
        required: BridgeState,
    },

    /// The content payload could not be resolved into a usable resource.
    #[error("no content payload resolvable for `{uri}`: {reason}")]
    ContentUnavailable { uri: String, reason: String },

    /// The catalog lookup backing initialization failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The session has been detached; no further envelopes are accepted or
    /// sent.
    #[error("bridge session is detached")]
    Detached,
}
