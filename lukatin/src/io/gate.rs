//! Operator approval for file mutations.
//!
//! A mutating tool hands the gate its before/after content and waits for a
//! verdict. With a front end attached, the gate registers a single-use
//! responder under a fresh change id, publishes the review request, and
//! waits for the front end to call [`MutationGate::resolve`]. Without one,
//! every request is approved on the spot.
//!
//! The pending entry is removed on every exit path: decision, timeout,
//! teardown sweep, or the waiting future being dropped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ChangeId, ChangeKind, Decision, ReviewRequest};
use crate::ui::{UiEvent, UiHandle};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("no pending change with id {0}")]
    PendingNotFound(ChangeId),
}

/// Outcome of an approval request. Only `Approved` permits a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
    /// No decision arrived within the approval timeout.
    TimedOut,
    /// The front end went away or the gate was closed.
    Abandoned,
}

impl Verdict {
    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }

    /// Result text reported by `tool` when the change may not be written.
    pub fn refusal(self, tool: &str) -> Option<String> {
        match self {
            Self::Approved => None,
            Self::Rejected => Some(format!("{tool} operation cancelled by user")),
            Self::TimedOut => Some(format!(
                "{tool} operation cancelled: no decision before the approval timeout"
            )),
            Self::Abandoned => Some(format!(
                "{tool} operation cancelled: review was abandoned"
            )),
        }
    }
}

struct PendingChange {
    request: ReviewRequest,
    responder: oneshot::Sender<bool>,
}

pub struct MutationGate {
    ui: Option<UiHandle>,
    pending: Mutex<HashMap<ChangeId, PendingChange>>,
    approval_timeout: Option<Duration>,
}

impl MutationGate {
    /// A gate with no front end: every request is approved.
    pub fn headless() -> Self {
        Self {
            ui: None,
            pending: Mutex::new(HashMap::new()),
            approval_timeout: None,
        }
    }

    pub fn attached(ui: UiHandle) -> Self {
        Self {
            ui: Some(ui),
            ..Self::headless()
        }
    }

    /// Bounds how long a request waits for its decision.
    pub fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn is_headless(&self) -> bool {
        self.ui.is_none()
    }

    /// Waits for the operator's verdict on replacing `old_content` with
    /// `new_content` at `path`.
    #[instrument(skip_all, fields(path = %path.display(), operation = %operation))]
    pub async fn request_approval(
        &self,
        path: &Path,
        old_content: &str,
        new_content: &str,
        operation: ChangeKind,
    ) -> Verdict {
        let Some(ui) = &self.ui else {
            debug!("no front end attached, approving");
            return Verdict::Approved;
        };

        let change_id = ChangeId::generate(operation);
        let request = ReviewRequest {
            change_id: change_id.clone(),
            path: path.to_path_buf(),
            old_content: old_content.to_string(),
            new_content: new_content.to_string(),
            operation,
            need_confirm: true,
        };
        let (responder, decision) = oneshot::channel();

        // Registered before publishing so a fast decision always finds it.
        self.lock_pending().insert(
            change_id.clone(),
            PendingChange {
                request: request.clone(),
                responder,
            },
        );
        let _cleanup = PendingCleanup {
            gate: self,
            change_id: &change_id,
        };

        if !ui.send(UiEvent::ReviewRequested(request)) {
            warn!(change_id = %change_id, "front end closed, abandoning review");
            return Verdict::Abandoned;
        }
        debug!(change_id = %change_id, "review requested");

        let received = match self.approval_timeout {
            Some(limit) => match tokio::time::timeout(limit, decision).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(
                        change_id = %change_id,
                        timeout_secs = limit.as_secs(),
                        "no decision before approval timeout"
                    );
                    return Verdict::TimedOut;
                }
            },
            None => decision.await,
        };

        let verdict = match received {
            Ok(true) => Verdict::Approved,
            Ok(false) => Verdict::Rejected,
            Err(_) => Verdict::Abandoned,
        };
        info!(change_id = %change_id, ?verdict, "review resolved");
        verdict
    }

    /// Delivers the operator's decision to the waiting request.
    ///
    /// An unknown or already-resolved id yields
    /// [`GateError::PendingNotFound`]; nothing else happens.
    pub fn resolve(&self, decision: Decision) -> Result<(), GateError> {
        let Some(pending) = self.lock_pending().remove(&decision.change_id) else {
            return Err(GateError::PendingNotFound(decision.change_id));
        };
        if pending.responder.send(decision.approved).is_err() {
            debug!(change_id = %decision.change_id, "requester stopped waiting");
        }
        Ok(())
    }

    pub fn is_pending(&self, change_id: &ChangeId) -> bool {
        self.lock_pending().contains_key(change_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn pending_request(&self, change_id: &ChangeId) -> Option<ReviewRequest> {
        self.lock_pending()
            .get(change_id)
            .map(|pending| pending.request.clone())
    }

    /// Abandons every pending review; their requesters see
    /// [`Verdict::Abandoned`]. Returns how many were dropped.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = self.lock_pending().drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "abandoning pending reviews");
        }
        drained.len()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<ChangeId, PendingChange>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a pending entry when its request stops waiting for any reason.
struct PendingCleanup<'a> {
    gate: &'a MutationGate,
    change_id: &'a ChangeId,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        self.gate.lock_pending().remove(self.change_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    fn expect_review(events: &mut UnboundedReceiver<UiEvent>) -> ReviewRequest {
        match events.try_recv().expect("event") {
            UiEvent::ReviewRequested(request) => request,
            other => panic!("unexpected event {other:?}"),
        }
    }

    async fn next_review(events: &mut UnboundedReceiver<UiEvent>) -> ReviewRequest {
        match events.recv().await.expect("event") {
            UiEvent::ReviewRequested(request) => request,
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn attached_gate() -> (Arc<MutationGate>, UnboundedReceiver<UiEvent>) {
        let (ui, events) = UiHandle::channel();
        (Arc::new(MutationGate::attached(ui)), events)
    }

    #[tokio::test]
    async fn headless_approves_without_registering() {
        let gate = MutationGate::headless();
        let verdict = gate
            .request_approval(Path::new("/w/a.rs"), "a", "b", ChangeKind::Edit)
            .await;
        assert_eq!(verdict, Verdict::Approved);
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn approval_round_trip_cleans_pending_entry() {
        let (gate, mut events) = attached_gate();
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.request_approval(Path::new("/w/a.rs"), "old", "new", ChangeKind::Edit)
                    .await
            }
        });

        let request = next_review(&mut events).await;
        assert_eq!(request.old_content, "old");
        assert_eq!(request.new_content, "new");
        assert!(request.need_confirm);
        assert!(gate.is_pending(&request.change_id));

        gate.resolve(Decision::approve(request.change_id.clone()))
            .expect("resolve");
        assert_eq!(waiter.await.expect("join"), Verdict::Approved);
        assert!(!gate.is_pending(&request.change_id));
    }

    #[tokio::test]
    async fn rejection_is_reported() {
        let (gate, mut events) = attached_gate();
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.request_approval(Path::new("/w/a.rs"), "", "new", ChangeKind::Create)
                    .await
            }
        });
        let request = next_review(&mut events).await;
        assert!(request.change_id.as_str().starts_with("write_"));
        gate.resolve(Decision::reject(request.change_id))
            .expect("resolve");
        assert_eq!(waiter.await.expect("join"), Verdict::Rejected);
    }

    #[tokio::test]
    async fn second_decision_is_not_found() {
        let (gate, mut events) = attached_gate();
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.request_approval(Path::new("/w/a.rs"), "a", "b", ChangeKind::Edit)
                    .await
            }
        });
        let request = next_review(&mut events).await;
        let id = request.change_id;
        gate.resolve(Decision::approve(id.clone())).expect("first");
        assert_eq!(
            gate.resolve(Decision::reject(id.clone())),
            Err(GateError::PendingNotFound(id))
        );
        assert_eq!(waiter.await.expect("join"), Verdict::Approved);
    }

    #[tokio::test]
    async fn unknown_decision_is_not_found() {
        let gate = MutationGate::headless();
        let err = gate
            .resolve(Decision::approve(ChangeId::from("change_0_0")))
            .expect_err("unknown id");
        assert_eq!(err.to_string(), "no pending change with id change_0_0");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_rejection_and_cleans_up() {
        let (ui, mut events) = UiHandle::channel();
        let gate = MutationGate::attached(ui).with_approval_timeout(Some(Duration::from_secs(5)));
        let verdict = gate
            .request_approval(Path::new("/w/a.rs"), "a", "b", ChangeKind::Edit)
            .await;
        assert_eq!(verdict, Verdict::TimedOut);
        assert!(!verdict.is_approved());
        assert_eq!(gate.pending_count(), 0);

        let request = expect_review(&mut events);
        assert!(matches!(
            gate.resolve(Decision::approve(request.change_id)),
            Err(GateError::PendingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn closed_front_end_abandons_immediately() {
        let (ui, events) = UiHandle::channel();
        drop(events);
        let gate = MutationGate::attached(ui);
        let verdict = gate
            .request_approval(Path::new("/w/a.rs"), "a", "b", ChangeKind::Edit)
            .await;
        assert_eq!(verdict, Verdict::Abandoned);
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn close_sweeps_waiters() {
        let (gate, mut events) = attached_gate();
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.request_approval(Path::new("/w/a.rs"), "a", "b", ChangeKind::Edit)
                    .await
            }
        });
        let _ = next_review(&mut events).await;
        assert_eq!(gate.close(), 1);
        assert_eq!(waiter.await.expect("join"), Verdict::Abandoned);
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropped_request_removes_entry() {
        let (gate, mut events) = attached_gate();
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.request_approval(Path::new("/w/a.rs"), "a", "b", ChangeKind::Edit)
                    .await
            }
        });
        let request = next_review(&mut events).await;
        waiter.abort();
        let _ = waiter.await;
        assert!(!gate.is_pending(&request.change_id));
    }

    #[tokio::test]
    async fn pending_request_exposes_contents() {
        let (gate, mut events) = attached_gate();
        let _waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.request_approval(Path::new("/w/b.rs"), "x", "y", ChangeKind::MultiEdit)
                    .await
            }
        });
        let request = next_review(&mut events).await;
        let stored = gate.pending_request(&request.change_id).expect("pending");
        assert_eq!(stored, request);
        gate.close();
    }
}
