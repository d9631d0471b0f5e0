//! Test-only helpers for driving the shell session and the approval gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::core::types::{Decision, ReviewRequest};
use crate::io::files::{FileLimits, FileTools};
use crate::io::gate::MutationGate;
use crate::io::read_history::ReadHistory;
use crate::io::shell::ShellConfig;
use crate::ui::{UiEvent, UiHandle};

/// Host shell with short timeouts so failing tests fail fast.
pub fn fast_shell_config() -> ShellConfig {
    ShellConfig {
        command_timeout: Duration::from_secs(5),
        stop_grace: Duration::from_secs(2),
        stale_grace: Duration::from_millis(500),
        ..ShellConfig::default()
    }
}

/// Writes `content` to `dir/name` and returns the full path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

/// Path rendered the way tool calls carry it.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// File tools wired to a gate with a front end attached.
pub fn attached_file_tools() -> (FileTools, UnboundedReceiver<UiEvent>) {
    let (ui, events) = UiHandle::channel();
    let tools = FileTools::new(
        Arc::new(MutationGate::attached(ui)),
        Arc::new(ReadHistory::default()),
        FileLimits::default(),
    );
    (tools, events)
}

/// Answers review requests with scripted decisions, in order.
///
/// The reviewer stops once every answer has been used, returning the
/// requests it saw.
pub struct ScriptedReviewer {
    handle: JoinHandle<Vec<ReviewRequest>>,
}

impl ScriptedReviewer {
    pub fn spawn(
        gate: Arc<MutationGate>,
        mut events: UnboundedReceiver<UiEvent>,
        answers: Vec<bool>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for approved in answers {
                let request = loop {
                    match events.recv().await {
                        Some(UiEvent::ReviewRequested(request)) => break Some(request),
                        Some(_) => {}
                        None => break None,
                    }
                };
                let Some(request) = request else {
                    break;
                };
                gate.resolve(Decision {
                    change_id: request.change_id.clone(),
                    approved,
                })
                .expect("review still pending");
                seen.push(request);
            }
            seen
        });
        Self { handle }
    }

    /// Waits until every scripted answer was delivered.
    pub async fn finish(self) -> Vec<ReviewRequest> {
        self.handle.await.expect("reviewer task")
    }
}
