//! Message boundary between tool execution and the interactive front end.
//!
//! Tools and the mutation gate run on arbitrary tasks; the front end runs a
//! single event loop. Everything crossing over goes through an unbounded
//! channel so senders never wait on the operator.

use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};
use tokio::sync::mpsc;

use crate::core::types::ReviewRequest;

/// Events delivered to the front end, in the order they were sent.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Human-readable description of a command about to run.
    ToolDescription(String),
    /// A mutation waits for an approve/reject decision.
    ReviewRequested(ReviewRequest),
    /// A tool call started from the front end finished.
    ToolFinished {
        task_id: u64,
        tool: &'static str,
        result: String,
    },
}

/// Sending half of the front-end channel.
#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers `event` without waiting; false once the front end is gone.
    pub fn send(&self, event: UiEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn describe(&self, description: &str) {
        if !self.send(UiEvent::ToolDescription(description.to_string())) {
            tracing::debug!("front end gone, dropping tool description");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Renders a review request as a unified diff with a short header.
pub fn render_review(request: &ReviewRequest) -> String {
    let path = request.path.display().to_string();
    let mut out = format!(
        "[{}] {} {} ({})\n",
        request.change_id,
        request.operation.tool_name(),
        path,
        request.operation
    );
    let diff = TextDiff::from_lines(&request.old_content, &request.new_content);
    let (mut added, mut removed) = (0usize, 0usize);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    let _ = writeln!(out, "+{added} -{removed} lines");
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(&path, &path)
        .to_string();
    out.push_str(&unified);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
