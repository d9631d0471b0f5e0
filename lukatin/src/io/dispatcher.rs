//! `Bash` tool: routes command invocations to the persistent shell.
//!
//! The dispatcher owns at most one [`ShellSession`] and replaces it with a
//! fresh one whenever it is found not running, so a shell that died or was
//! stopped is transparently restarted on the next call.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::core::types::BashResponse;
use crate::io::shell::{SessionError, ShellConfig, ShellSession};
use crate::ui::UiHandle;

/// Used when an invocation names no timeout (or zero).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);
/// Upper bound for any requested timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_millis(600_000);

/// One request to run a shell command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Milliseconds; unset or zero means the dispatcher default.
    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

impl CommandInvocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: None,
            timeout_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

pub struct CommandDispatcher {
    shell: ShellConfig,
    session: Mutex<Option<Arc<ShellSession>>>,
    ui: Option<UiHandle>,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(shell: ShellConfig, ui: Option<UiHandle>) -> Self {
        Self {
            shell,
            session: Mutex::new(None),
            ui,
            default_timeout: DEFAULT_TIMEOUT,
            max_timeout: MAX_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, default_timeout: Duration, max_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self.max_timeout = max_timeout;
        self
    }

    /// Timeout actually applied to `invocation`.
    pub fn effective_timeout(&self, invocation: &CommandInvocation) -> Duration {
        let requested = match invocation.timeout_ms {
            None | Some(0) => self.default_timeout,
            Some(ms) => Duration::from_millis(ms),
        };
        requested.min(self.max_timeout)
    }

    /// Runs `invocation`, starting a shell first if none is running.
    ///
    /// A shell that died between calls is replaced and the command is sent
    /// once more.
    #[instrument(skip_all)]
    pub async fn dispatch(&self, invocation: &CommandInvocation) -> BashResponse {
        if invocation.command.trim().is_empty() {
            return BashResponse::rejected("Command is required");
        }
        if let (Some(ui), Some(description)) = (&self.ui, invocation.description.as_deref())
            && !description.trim().is_empty()
        {
            ui.describe(description);
        }

        let timeout = self.effective_timeout(invocation);
        let mut retried = false;
        loop {
            let session = match self.ensure_session().await {
                Ok(session) => session,
                Err(err) => {
                    warn!(err = %err, "failed to start shell");
                    return BashResponse::rejected(format!(
                        "Failed to start persistent shell: {err}"
                    ));
                }
            };

            match session
                .execute_command_with_timeout(&invocation.command, timeout)
                .await
            {
                Ok(output) => return BashResponse::success(output),
                // The command never reached a shell.
                Err(err @ SessionError::Undelivered(_)) if !retried => {
                    info!(err = %err, "shell was gone, retrying on a fresh one");
                    retried = true;
                }
                Err(err) => return BashResponse::failed(err.to_string()),
            }
        }
    }

    /// Stops the current shell, if any.
    pub async fn shutdown(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session
            && session.is_running()
            && let Err(err) = session.stop().await
        {
            warn!(err = %err, "failed to stop shell");
        }
    }

    /// The current shell, whether or not it is running.
    pub async fn session(&self) -> Option<Arc<ShellSession>> {
        self.session.lock().await.clone()
    }

    async fn ensure_session(&self) -> Result<Arc<ShellSession>, SessionError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref()
            && session.is_running()
        {
            return Ok(Arc::clone(session));
        }

        info!("no running shell, starting a new one");
        let session = Arc::new(ShellSession::new(self.shell.clone()));
        session.start().await?;
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }
}
