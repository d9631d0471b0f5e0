//! Configuration stored under `.lukatin/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::framing::ShellKind;
use crate::io::files::FileLimits;
use crate::io::shell::ShellConfig;

/// Default location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".lukatin/config.toml";

/// Top-level configuration (TOML).
///
/// Meant to be edited by hand. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LukatinConfig {
    pub shell: ShellSection,
    pub approval: ApprovalSection,
    pub files: FilesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellSection {
    /// Shell executable; defaults to `/bin/bash` (or `cmd` on Windows).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments passed to `program`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Timeout applied to a `Bash` call that does not name one.
    pub default_timeout_ms: u64,

    /// Upper bound for any requested `Bash` timeout.
    pub max_timeout_ms: u64,

    /// Timeout for session commands issued without an explicit timeout.
    pub session_timeout_ms: u64,

    /// How long `stop` waits for the shell to exit before killing it.
    pub stop_grace_ms: u64,

    /// How long a command waits for a timed-out predecessor before the
    /// shell is replaced.
    pub stale_grace_ms: u64,

    /// Captured stdout beyond this many bytes is replaced by a notice.
    pub output_limit_bytes: usize,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: None,
            args: None,
            default_timeout_ms: 120_000,
            max_timeout_ms: 600_000,
            session_timeout_ms: 30_000,
            stop_grace_ms: 5_000,
            stale_grace_ms: 2_000,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalSection {
    /// Seconds to wait for an operator decision; 0 waits indefinitely.
    pub timeout_secs: u64,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self { timeout_secs: 900 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesSection {
    pub read_default_limit: usize,
    pub read_max_line_chars: usize,
    /// Edits to files larger than this are backed up first.
    pub edit_backup_threshold_bytes: u64,
    /// Edits making more replacements than this are backed up first.
    pub edit_backup_min_replacements: usize,
    /// Writes where either version exceeds this are backed up first.
    pub write_backup_threshold_bytes: u64,
    /// A read older than this no longer counts as recent.
    pub read_history_window_secs: u64,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            read_default_limit: 2_000,
            read_max_line_chars: 2_000,
            edit_backup_threshold_bytes: 10 * 1024,
            edit_backup_min_replacements: 10,
            write_backup_threshold_bytes: 50 * 1024,
            read_history_window_secs: 5 * 60,
        }
    }
}

impl LukatinConfig {
    pub fn validate(&self) -> Result<()> {
        let shell = &self.shell;
        if shell.default_timeout_ms == 0 {
            return Err(anyhow!("shell.default_timeout_ms must be > 0"));
        }
        if shell.max_timeout_ms < shell.default_timeout_ms {
            return Err(anyhow!(
                "shell.max_timeout_ms must be >= shell.default_timeout_ms"
            ));
        }
        if shell.session_timeout_ms == 0 {
            return Err(anyhow!("shell.session_timeout_ms must be > 0"));
        }
        if shell.output_limit_bytes == 0 {
            return Err(anyhow!("shell.output_limit_bytes must be > 0"));
        }
        if shell.program.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(anyhow!("shell.program must not be blank"));
        }
        if self.files.read_default_limit == 0 {
            return Err(anyhow!("files.read_default_limit must be > 0"));
        }
        if self.files.read_max_line_chars == 0 {
            return Err(anyhow!("files.read_max_line_chars must be > 0"));
        }
        Ok(())
    }

    /// Session settings for the host platform's shell.
    pub fn shell_config(&self) -> ShellConfig {
        let kind = ShellKind::host();
        let mut config = ShellConfig::for_kind(kind);
        if let Some(program) = &self.shell.program {
            config.program = PathBuf::from(program);
            config.args = Vec::new();
        }
        if let Some(args) = &self.shell.args {
            config.args.clone_from(args);
        }
        config.command_timeout = Duration::from_millis(self.shell.session_timeout_ms);
        config.stop_grace = Duration::from_millis(self.shell.stop_grace_ms);
        config.stale_grace = Duration::from_millis(self.shell.stale_grace_ms);
        config.output_limit_bytes = self.shell.output_limit_bytes;
        config
    }

    pub fn default_command_timeout(&self) -> Duration {
        Duration::from_millis(self.shell.default_timeout_ms)
    }

    pub fn max_command_timeout(&self) -> Duration {
        Duration::from_millis(self.shell.max_timeout_ms)
    }

    /// `None` when reviews may wait forever.
    pub fn approval_timeout(&self) -> Option<Duration> {
        (self.approval.timeout_secs > 0).then(|| Duration::from_secs(self.approval.timeout_secs))
    }

    pub fn file_limits(&self) -> FileLimits {
        FileLimits {
            read_default_limit: self.files.read_default_limit,
            read_max_line_chars: self.files.read_max_line_chars,
            edit_backup_threshold_bytes: self.files.edit_backup_threshold_bytes,
            edit_backup_min_replacements: self.files.edit_backup_min_replacements,
            write_backup_threshold_bytes: self.files.write_backup_threshold_bytes,
        }
    }

    pub fn read_history_window(&self) -> Duration {
        Duration::from_secs(self.files.read_history_window_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LukatinConfig::default()`.
pub fn load_config(path: &Path) -> Result<LukatinConfig> {
    if !path.exists() {
        let cfg = LukatinConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LukatinConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LukatinConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
