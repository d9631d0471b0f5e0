//! Front-end bookkeeping for review requests.
//!
//! Requests are kept in arrival order and only the head is active for input.

use std::collections::VecDeque;

use crate::core::types::{ChangeId, ReviewRequest};

#[derive(Debug, Default)]
pub struct ReviewQueue {
    queue: VecDeque<ReviewRequest>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `request`; returns true if it became the active review.
    pub fn push(&mut self, request: ReviewRequest) -> bool {
        self.queue.push_back(request);
        self.queue.len() == 1
    }

    pub fn active(&self) -> Option<&ReviewRequest> {
        self.queue.front()
    }

    /// Removes the request for `change_id`, wherever it sits in the queue.
    pub fn complete(&mut self, change_id: &ChangeId) -> Option<ReviewRequest> {
        let index = self
            .queue
            .iter()
            .position(|request| &request.change_id == change_id)?;
        self.queue.remove(index)
    }

    /// Drops requests the gate no longer waits on; returns true if the active
    /// review changed.
    pub fn retain(&mut self, mut still_pending: impl FnMut(&ChangeId) -> bool) -> bool {
        let before = self.active().map(|r| r.change_id.clone());
        self.queue.retain(|request| still_pending(&request.change_id));
        before != self.active().map(|r| r.change_id.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReviewRequest> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Reads an operator answer: `Some(true)` approve, `Some(false)` reject.
pub fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::types::ChangeKind;

    fn request(id: &str) -> ReviewRequest {
        ReviewRequest {
            change_id: ChangeId::from(id),
            path: PathBuf::from("/w/file.rs"),
            old_content: "old".to_string(),
            new_content: "new".to_string(),
            operation: ChangeKind::Edit,
            need_confirm: true,
        }
    }

    #[test]
    fn first_request_becomes_active() {
        let mut queue = ReviewQueue::new();
        assert!(queue.push(request("a")));
        assert!(!queue.push(request("b")));
        assert_eq!(queue.active().map(|r| r.change_id.as_str()), Some("a"));
    }

    #[test]
    fn completing_head_promotes_next_in_arrival_order() {
        let mut queue = ReviewQueue::new();
        queue.push(request("a"));
        queue.push(request("b"));
        queue.push(request("c"));
        queue.complete(&ChangeId::from("a")).expect("a queued");
        assert_eq!(queue.active().map(|r| r.change_id.as_str()), Some("b"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn completing_unknown_id_is_noop() {
        let mut queue = ReviewQueue::new();
        queue.push(request("a"));
        assert!(queue.complete(&ChangeId::from("zzz")).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn retain_reports_active_change() {
        let mut queue = ReviewQueue::new();
        queue.push(request("a"));
        queue.push(request("b"));
        assert!(!queue.retain(|id| id.as_str() != "b"));
        assert!(queue.retain(|_| false));
        assert!(queue.is_empty());
    }

    #[test]
    fn answers_parse() {
        assert_eq!(parse_answer(" Y "), Some(true));
        assert_eq!(parse_answer("no"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }
}
