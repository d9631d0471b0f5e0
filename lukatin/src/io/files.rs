//! File tools: `Read`, `Edit`, `MultiEdit` and `Write`.
//!
//! Mutating tools compute the full new content in memory, pass it through
//! the [`MutationGate`], and only touch the filesystem after an approval.
//! If the file changed while the review was open, nothing is written.
//!
//! Every tool returns a plain string: a success summary, a cancellation
//! notice, or an `Error: ...` line. Failures never escape as `Err`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::core::edit::{EditError, EditOperation, plan_edit, plan_multi_edit, size_delta};
use crate::core::listing::{ListingWindow, looks_binary, render_listing};
use crate::core::types::ChangeKind;
use crate::core::write_policy::{is_documentation_file, is_sensitive_path, secret_markers};
use crate::io::gate::MutationGate;
use crate::io::read_history::{ReadFreshness, ReadHistory};

#[derive(Debug, Error)]
enum FileToolError {
    #[error("Error: {0}")]
    Invalid(String),
    #[error("Error: file does not exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("Error: {0}")]
    Edit(#[from] EditError),
    #[error("Error reading file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Error writing file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Error creating backup of {}: {source}", path.display())]
    Backup { path: PathBuf, source: io::Error },
    #[error(
        "Error: {} changed while awaiting approval; nothing was written. Read it again and retry.",
        .0.display()
    )]
    Conflict(PathBuf),
    #[error("{0}")]
    NotApproved(String),
}

/// Size thresholds for listings and backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLimits {
    pub read_default_limit: usize,
    pub read_max_line_chars: usize,
    pub edit_backup_threshold_bytes: u64,
    pub edit_backup_min_replacements: usize,
    pub write_backup_threshold_bytes: u64,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            read_default_limit: 2_000,
            read_max_line_chars: 2_000,
            edit_backup_threshold_bytes: 10 * 1024,
            edit_backup_min_replacements: 10,
            write_backup_threshold_bytes: 50 * 1024,
        }
    }
}

pub struct FileTools {
    gate: Arc<MutationGate>,
    history: Arc<ReadHistory>,
    limits: FileLimits,
}

impl FileTools {
    pub fn new(gate: Arc<MutationGate>, history: Arc<ReadHistory>, limits: FileLimits) -> Self {
        Self {
            gate,
            history,
            limits,
        }
    }

    pub fn gate(&self) -> &Arc<MutationGate> {
        &self.gate
    }

    /// Lists `limit` lines of the file starting at 1-based `offset`.
    pub async fn read(&self, file_path: &str, offset: Option<usize>, limit: Option<usize>) -> String {
        self.try_read(file_path, offset, limit)
            .await
            .unwrap_or_else(|err| err.to_string())
    }

    pub async fn edit(&self, file_path: &str, edit: &EditOperation) -> String {
        self.try_edit(file_path, edit)
            .await
            .unwrap_or_else(|err| err.to_string())
    }

    pub async fn multi_edit(&self, file_path: &str, edits: &[EditOperation]) -> String {
        self.try_multi_edit(file_path, edits)
            .await
            .unwrap_or_else(|err| err.to_string())
    }

    pub async fn write(&self, file_path: &str, content: &str) -> String {
        self.try_write(file_path, content)
            .await
            .unwrap_or_else(|err| err.to_string())
    }

    async fn try_read(
        &self,
        file_path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<String, FileToolError> {
        let path = require_absolute(file_path)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|source| not_found_or(&path, source, read_error))?;
        if metadata.is_dir() {
            return Err(FileToolError::Invalid(format!(
                "{} is a directory",
                path.display()
            )));
        }

        let bytes = fs::read(&path).await.map_err(|e| read_error(&path, e))?;
        self.history.record(&path);

        if bytes.is_empty() {
            return Ok(format!(
                "SYSTEM REMINDER: File {} exists but has empty contents (0 bytes, 0 lines).",
                path.display()
            ));
        }
        if looks_binary(&bytes) {
            return Ok(format!(
                "File {} appears to be binary ({} bytes); contents not shown.",
                path.display(),
                bytes.len()
            ));
        }

        let text = String::from_utf8_lossy(&bytes);
        let window = ListingWindow {
            offset: offset.unwrap_or(1),
            limit: limit
                .filter(|n| *n > 0)
                .unwrap_or(self.limits.read_default_limit),
            max_line_chars: self.limits.read_max_line_chars,
        };
        let name = path.display().to_string();
        Ok(render_listing(&name, bytes.len(), &text, window))
    }

    #[instrument(skip_all, fields(file_path = %file_path))]
    async fn try_edit(&self, file_path: &str, edit: &EditOperation) -> Result<String, FileToolError> {
        edit.validate()?;
        let path = std::path::absolute(file_path).map_err(|e| {
            FileToolError::Invalid(format!("cannot resolve path {file_path}: {e}"))
        })?;
        let content = self.read_existing(&path).await?;
        self.warn_if_unread(&path);

        let plan = plan_edit(&content, edit)?;
        let kind = if edit.replace_all {
            ChangeKind::EditReplaceAll
        } else {
            ChangeKind::Edit
        };
        self.approve(&path, Some(&content), &plan.content, kind)
            .await?;

        if self.needs_edit_backup(content.len(), plan.replacements) {
            backup(&path).await?;
        }
        self.persist(&path, &plan.content).await?;

        Ok(format!(
            "Successfully made {} replacement(s) in {}. Size changed by {} bytes ({} -> {})",
            plan.replacements,
            path.display(),
            size_delta(content.len(), plan.content.len()),
            content.len(),
            plan.content.len()
        ))
    }

    #[instrument(skip_all, fields(file_path = %file_path, edits = edits.len()))]
    async fn try_multi_edit(
        &self,
        file_path: &str,
        edits: &[EditOperation],
    ) -> Result<String, FileToolError> {
        let path = require_absolute(file_path)?;
        if edits.is_empty() {
            return Err(EditError::NoEdits.into());
        }
        let content = self.read_existing(&path).await?;
        self.warn_if_unread(&path);

        let plan = plan_multi_edit(&content, edits)?;
        self.approve(&path, Some(&content), &plan.content, ChangeKind::MultiEdit)
            .await?;

        if self.needs_edit_backup(content.len(), plan.replacements) {
            backup(&path).await?;
        }
        self.persist(&path, &plan.content).await?;

        Ok(format!(
            "Successfully made {} total replacement(s) across {} edit(s) in {}",
            plan.replacements,
            edits.len(),
            path.display()
        ))
    }

    #[instrument(skip_all, fields(file_path = %file_path, bytes = content.len()))]
    async fn try_write(&self, file_path: &str, content: &str) -> Result<String, FileToolError> {
        let path = require_absolute(file_path)?;
        if content.is_empty() {
            return Err(FileToolError::Invalid("content cannot be empty".to_string()));
        }
        if is_sensitive_path(&path) {
            return Err(FileToolError::Invalid(format!(
                "Writing to sensitive system paths is not allowed: {}",
                path.display()
            )));
        }

        let existing = match fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(read_error(&path, e)),
        };
        match &existing {
            Some(_) => self.warn_if_unread(&path),
            None if is_documentation_file(&path) => {
                return Err(FileToolError::Invalid(format!(
                    "Creation of documentation files is restricted. File: {}. Use Edit tool for existing files or explicitly request documentation creation.",
                    path.display()
                )));
            }
            None => {}
        }
        let markers = secret_markers(content);
        if !markers.is_empty() {
            warn!(path = %path.display(), ?markers, "content may contain secrets");
        }

        let kind = if existing.is_some() {
            ChangeKind::Overwrite
        } else {
            ChangeKind::Create
        };
        self.approve(&path, existing.as_deref(), content, kind)
            .await?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FileToolError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let threshold = self.limits.write_backup_threshold_bytes;
        if let Some(old) = &existing
            && (old.len() as u64 > threshold || content.len() as u64 > threshold)
        {
            backup(&path).await?;
        }
        self.persist(&path, content).await?;

        Ok(match existing {
            None => format!(
                "Successfully created {} ({} bytes)",
                path.display(),
                content.len()
            ),
            Some(old) => format!(
                "Successfully overwritten {} ({} bytes). Size changed by {} bytes ({} -> {})",
                path.display(),
                content.len(),
                size_delta(old.len(), content.len()),
                old.len(),
                content.len()
            ),
        })
    }

    /// Runs the review and confirms the file still holds what was reviewed.
    async fn approve(
        &self,
        path: &Path,
        before: Option<&str>,
        after: &str,
        kind: ChangeKind,
    ) -> Result<(), FileToolError> {
        let verdict = self
            .gate
            .request_approval(path, before.unwrap_or(""), after, kind)
            .await;
        if let Some(message) = verdict.refusal(kind.tool_name()) {
            info!(path = %path.display(), ?verdict, "change not approved");
            return Err(FileToolError::NotApproved(message));
        }

        let current = match fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(read_error(path, e)),
        };
        if current.as_deref() != before.map(str::as_bytes) {
            warn!(path = %path.display(), "file changed during review");
            return Err(FileToolError::Conflict(path.to_path_buf()));
        }
        Ok(())
    }

    async fn read_existing(&self, path: &Path) -> Result<String, FileToolError> {
        fs::read_to_string(path)
            .await
            .map_err(|source| not_found_or(path, source, read_error))
    }

    async fn persist(&self, path: &Path, content: &str) -> Result<(), FileToolError> {
        fs::write(path, content)
            .await
            .map_err(|source| FileToolError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        self.history.record(path);
        debug!(path = %path.display(), bytes = content.len(), "file written");
        Ok(())
    }

    fn needs_edit_backup(&self, size: usize, replacements: usize) -> bool {
        size as u64 > self.limits.edit_backup_threshold_bytes
            || replacements > self.limits.edit_backup_min_replacements
    }

    fn warn_if_unread(&self, path: &Path) {
        match self.history.freshness(path) {
            ReadFreshness::Recent => {}
            ReadFreshness::Stale(age) => {
                warn!(path = %path.display(), age_secs = age.as_secs(), "modifying file not read recently");
            }
            ReadFreshness::Never => {
                warn!(path = %path.display(), "modifying file that was never read");
            }
        }
    }
}

/// Copies `path` to `<path>.backup.YYYYMMDD_HHMMSS`.
async fn backup(path: &Path) -> Result<PathBuf, FileToolError> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".backup.{stamp}"));
    let target = PathBuf::from(name);
    fs::copy(path, &target)
        .await
        .map_err(|source| FileToolError::Backup {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), backup = %target.display(), "backup created");
    Ok(target)
}

fn require_absolute(file_path: &str) -> Result<PathBuf, FileToolError> {
    let path = PathBuf::from(file_path);
    if file_path.is_empty() || !path.is_absolute() {
        return Err(FileToolError::Invalid(format!(
            "file_path must be absolute, got: {file_path:?}"
        )));
    }
    Ok(path)
}

fn read_error(path: &Path, source: io::Error) -> FileToolError {
    FileToolError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn not_found_or(
    path: &Path,
    source: io::Error,
    other: fn(&Path, io::Error) -> FileToolError,
) -> FileToolError {
    if source.kind() == io::ErrorKind::NotFound {
        FileToolError::Missing(path.to_path_buf())
    } else {
        other(path, source)
    }
}
