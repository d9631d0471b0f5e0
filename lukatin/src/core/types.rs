//! Shared contracts between tools, the mutation gate and the front end.
//!
//! These types carry no behavior beyond formatting; they are what crosses
//! the tool-call, review-request and decision boundaries.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::ids::unique_suffix;

/// Structured result of the `Bash` tool, returned to callers as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BashResponse {
    pub output: String,
    pub error: String,
    pub exit_code: i32,
}

impl BashResponse {
    /// Command ran and its output was captured.
    pub const EXIT_OK: i32 = 0;
    /// No command was supplied, or the shell could not be started.
    pub const EXIT_REJECTED: i32 = -1;
    /// The shell failed while running the command (timeout, cancellation, exit).
    pub const EXIT_FAILED: i32 = 1;

    pub fn success(output: String) -> Self {
        Self {
            output,
            error: String::new(),
            exit_code: Self::EXIT_OK,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
            exit_code: Self::EXIT_REJECTED,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
            exit_code: Self::EXIT_FAILED,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Self::EXIT_OK
    }

    /// Serializes to the single-line JSON object handed back to the caller.
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(err) => format!(
                r#"{{"output":"","error":"serialize response: {err}","exit_code":{}}}"#,
                Self::EXIT_FAILED
            ),
        }
    }
}

/// Key correlating a review request with its decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Mints a process-unique id such as `change_1718000000000000000_7`.
    pub fn generate(kind: ChangeKind) -> Self {
        Self(format!("{}_{}", kind.id_prefix(), unique_suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChangeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of mutation awaiting review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Edit,
    EditReplaceAll,
    MultiEdit,
    Create,
    Overwrite,
}

impl ChangeKind {
    fn id_prefix(self) -> &'static str {
        match self {
            Self::Edit | Self::EditReplaceAll | Self::MultiEdit => "change",
            Self::Create | Self::Overwrite => "write",
        }
    }

    /// Name of the tool that produces this kind of change.
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Edit | Self::EditReplaceAll => "Edit",
            Self::MultiEdit => "MultiEdit",
            Self::Create | Self::Overwrite => "Write",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Edit => "edit",
            Self::EditReplaceAll => "edit (replace_all)",
            Self::MultiEdit => "multi-edit",
            Self::Create => "create",
            Self::Overwrite => "overwrite",
        };
        f.write_str(label)
    }
}

/// Proposed mutation published to the front end for review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub change_id: ChangeId,
    pub path: PathBuf,
    pub old_content: String,
    pub new_content: String,
    pub operation: ChangeKind,
    pub need_confirm: bool,
}

/// Operator verdict for one change id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub change_id: ChangeId,
    pub approved: bool,
}

impl Decision {
    pub fn approve(change_id: ChangeId) -> Self {
        Self {
            change_id,
            approved: true,
        }
    }

    pub fn reject(change_id: ChangeId) -> Self {
        Self {
            change_id,
            approved: false,
        }
    }
}
