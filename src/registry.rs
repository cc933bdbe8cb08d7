//! Correlation registry: the set of outstanding calls on the issuing side.
//!
//! Every call occupies one entry keyed by its id. Settlement (a correlated
//! response, a timeout, a cancellation, or the teardown sweep) removes the
//! entry exactly once; whichever path removes it wins and the others become
//! no-ops. Ids come from a monotonic counter owned by the session and are
//! never reused, so a stale response can never be mismatched to a newer
//! call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::envelope::{ErrorObject, RequestId};
use crate::error::CallError;

/// Default budget for a call that does not override it.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Per-call knobs: a timeout budget and an optional cancellation signal.
/// The two race independently; whichever fires first settles the call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Budget for the call. [`Duration::ZERO`] disables the timeout.
    pub timeout: Duration,
    /// Optional cancellation signal, honored both when already cancelled at
    /// issue time and when cancelled while the call is pending.
    pub cancel: Option<CancellationToken>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            cancel: None,
        }
    }
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn no_timeout() -> Self {
        Self::with_timeout(Duration::ZERO)
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }
}

/// One outstanding call awaiting settlement.
struct PendingCall {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value, CallError>>,
}

/// The pending-call set plus the session-scoped id counter. Mutated only by
/// issue, settlement, and teardown.
pub(crate) struct PendingCalls {
    calls: Mutex<HashMap<RequestId, PendingCall>>,
    next_id: AtomicU64,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next request id. Monotonic, never reused.
    pub(crate) fn allocate_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a call before its envelope is sent, so a response cannot
    /// race ahead of the bookkeeping.
    pub(crate) fn register(
        &self,
        id: RequestId,
        method: &str,
    ) -> oneshot::Receiver<Result<Value, CallError>> {
        let (tx, rx) = oneshot::channel();
        let previous = self.calls.lock().unwrap().insert(
            id,
            PendingCall {
                method: method.to_string(),
                created_at: Instant::now(),
                tx,
            },
        );
        debug_assert!(previous.is_none(), "request id reused within a session");
        rx
    }

    /// Settle a call with the outcome carried by a correlated response
    /// envelope. Returns false when the id matches no pending call (late or
    /// duplicate response); the caller must ignore it without error.
    pub(crate) fn settle(&self, id: RequestId, outcome: Result<Value, ErrorObject>) -> bool {
        let Some(call) = self.calls.lock().unwrap().remove(&id) else {
            return false;
        };
        let settled = match outcome {
            Ok(result) => Ok(result),
            Err(error) => Err(CallError::Rejected {
                method: call.method,
                error,
            }),
        };
        // The issuing future may have been dropped; that is its own business.
        let _ = call.tx.send(settled);
        true
    }

    /// Remove a call so the local settlement path (timeout or abort) can
    /// claim it. `None` means another path already won.
    pub(crate) fn take(&self, id: RequestId) -> Option<(String, Instant)> {
        self.calls
            .lock()
            .unwrap()
            .remove(&id)
            .map(|call| (call.method, call.created_at))
    }

    /// Teardown: reject every still-pending call, regardless of its
    /// individual timeout or abort state.
    pub(crate) fn sweep(&self) {
        let drained: Vec<PendingCall> = {
            let mut calls = self.calls.lock().unwrap();
            calls.drain().map(|(_, call)| call).collect()
        };
        for call in drained {
            let _ = call.tx.send(Err(CallError::Teardown {
                method: call.method,
            }));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Drive one registered call to settlement. Races the correlated response
/// against the timeout and the cancellation signal; the first to remove the
/// registry entry wins and the later arms degrade to waiting on the
/// response channel (which the winner has already fed).
pub(crate) async fn await_settlement(
    pending: &PendingCalls,
    id: RequestId,
    mut rx: oneshot::Receiver<Result<Value, CallError>>,
    options: &CallOptions,
    method: &str,
) -> Result<Value, CallError> {
    let cancel = options
        .cancel
        .clone()
        .unwrap_or_else(CancellationToken::new);
    let cancelled = cancel.cancelled();
    tokio::pin!(cancelled);
    let mut cancel_armed = options.cancel.is_some();

    // A zero timeout disarms the branch below, so the immediately-ready
    // sleep is never polled.
    let mut timeout_armed = options.timeout > Duration::ZERO;
    let sleep = tokio::time::sleep(options.timeout);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            outcome = &mut rx => {
                return match outcome {
                    Ok(settled) => settled,
                    // Registry dropped without settling: the session is gone.
                    Err(_) => Err(CallError::Teardown { method: method.to_string() }),
                };
            }
            _ = &mut sleep, if timeout_armed => {
                if let Some((method, created_at)) = pending.take(id) {
                    return Err(CallError::Timeout {
                        method,
                        elapsed: created_at.elapsed(),
                    });
                }
                // A response won the race; its value is already in flight.
                timeout_armed = false;
            }
            _ = &mut cancelled, if cancel_armed => {
                if let Some((method, _)) = pending.take(id) {
                    return Err(CallError::Aborted { method });
                }
                cancel_armed = false;
            }
        }
    }
}
