//! In-memory planning of string-replacement edits.
//!
//! Planning never touches the filesystem: it takes the current content and
//! returns the content that would be written, or the reason the edit cannot
//! be applied.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Line prefix added by the `Read` tool (`     12\t`).
static LINE_NUMBER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\d+\t").expect("line number prefix pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("old_string and new_string are identical")]
    Identical,
    #[error("old_string cannot be empty")]
    EmptyOldString,
    #[error("old_string not found in file. Searched for: {0:?}")]
    NotFound(String),
    #[error(
        "Expected {expected} replacements but found {found} occurrences. Use replace_all=true to replace all {found} occurrences"
    )]
    CountMismatch { expected: usize, found: usize },
    #[error("no edits provided")]
    NoEdits,
    #[error("edit {index}: {source}")]
    InEdit {
        index: usize,
        #[source]
        source: Box<EditError>,
    },
}

/// One string replacement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditOperation {
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
    /// Required occurrence count when `replace_all` is false (default 1).
    #[serde(default)]
    pub expected_replacements: Option<usize>,
}

impl EditOperation {
    pub fn new(old_string: impl Into<String>, new_string: impl Into<String>) -> Self {
        Self {
            old_string: old_string.into(),
            new_string: new_string.into(),
            replace_all: false,
            expected_replacements: None,
        }
    }

    pub fn replace_all(mut self) -> Self {
        self.replace_all = true;
        self
    }

    pub fn expecting(mut self, count: usize) -> Self {
        self.expected_replacements = Some(count);
        self
    }

    /// Rejects parameter combinations that can never apply.
    pub fn validate(&self) -> Result<(), EditError> {
        if self.old_string == self.new_string {
            return Err(EditError::Identical);
        }
        if self.old_string.is_empty() {
            return Err(EditError::EmptyOldString);
        }
        Ok(())
    }
}

/// Content produced by a successful plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPlan {
    pub content: String,
    pub replacements: usize,
}

/// Strips `Read` line-number prefixes from every line of `text`.
pub fn strip_line_numbers(text: &str) -> Cow<'_, str> {
    LINE_NUMBER_PREFIX.replace_all(text, "")
}

/// Applies one edit to `content`.
pub fn plan_edit(content: &str, edit: &EditOperation) -> Result<EditPlan, EditError> {
    edit.validate()?;

    let old = strip_line_numbers(&edit.old_string);
    let new = if old != edit.old_string.as_str() {
        strip_line_numbers(&edit.new_string)
    } else {
        Cow::Borrowed(edit.new_string.as_str())
    };
    if old.is_empty() {
        return Err(EditError::EmptyOldString);
    }
    if old == new {
        return Err(EditError::Identical);
    }

    let found = content.matches(old.as_ref()).count();
    if found == 0 {
        return Err(EditError::NotFound(edit.old_string.clone()));
    }

    if edit.replace_all {
        return Ok(EditPlan {
            content: content.replace(old.as_ref(), &new),
            replacements: found,
        });
    }

    let expected = edit.expected_replacements.filter(|n| *n > 0).unwrap_or(1);
    if found != expected {
        return Err(EditError::CountMismatch { expected, found });
    }
    Ok(EditPlan {
        content: content.replacen(old.as_ref(), &new, expected),
        replacements: expected,
    })
}

/// Applies `edits` in order, each against the output of the previous one.
///
/// Fails without a partial result if any edit fails; the error names the
/// failing edit by its 1-based position.
pub fn plan_multi_edit(content: &str, edits: &[EditOperation]) -> Result<EditPlan, EditError> {
    if edits.is_empty() {
        return Err(EditError::NoEdits);
    }
    let mut current = content.to_string();
    let mut replacements = 0;
    for (i, edit) in edits.iter().enumerate() {
        let plan = plan_edit(&current, edit).map_err(|err| EditError::InEdit {
            index: i + 1,
            source: Box::new(err),
        })?;
        current = plan.content;
        replacements += plan.replacements;
    }
    Ok(EditPlan {
        content: current,
        replacements,
    })
}

/// Signed byte delta rendered as `+N` / `-N`.
pub fn size_delta(before: usize, after: usize) -> String {
    let delta = after as i64 - before as i64;
    format!("{delta:+}")
}
