//! Task list carried through a session by `TodoRead` / `TodoWrite`.
//!
//! `TodoWrite` always replaces the whole list; validation happens before
//! anything is replaced.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Accepts `"3"` or `3` on input.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            status,
            priority: TodoPriority::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
    #[error("todo id must not be empty")]
    EmptyId,
    #[error("duplicate todo id {0:?}")]
    DuplicateId(String),
    #[error("todo {0:?} has empty content")]
    EmptyContent(String),
    #[error("only one todo may be in progress (found {0})")]
    MultipleInProgress(usize),
}

pub fn validate_todos(items: &[TodoItem]) -> Result<(), TodoError> {
    let mut ids = HashSet::new();
    for item in items {
        if item.id.trim().is_empty() {
            return Err(TodoError::EmptyId);
        }
        if !ids.insert(item.id.as_str()) {
            return Err(TodoError::DuplicateId(item.id.clone()));
        }
        if item.content.trim().is_empty() {
            return Err(TodoError::EmptyContent(item.id.clone()));
        }
    }
    let in_progress = count(items, TodoStatus::InProgress);
    if in_progress > 1 {
        return Err(TodoError::MultipleInProgress(in_progress));
    }
    Ok(())
}

/// Checklist view with a progress footer.
pub fn render_todos(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return NO_TODOS.to_string();
    }
    let mut out = String::new();
    for item in items {
        let line = match item.status {
            TodoStatus::Pending => format!("☐ {}", item.content),
            TodoStatus::InProgress => format!("☐ ▶ {}", item.content),
            TodoStatus::Completed => format!("☑ {}", item.content),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&format!(
        "\nProgress: {}/{} completed | {} in progress | {} pending",
        count(items, TodoStatus::Completed),
        items.len(),
        count(items, TodoStatus::InProgress),
        count(items, TodoStatus::Pending),
    ));
    out
}

pub const NO_TODOS: &str = "No todos";

fn count(items: &[TodoItem], status: TodoStatus) -> usize {
    items.iter().filter(|item| item.status == status).count()
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
