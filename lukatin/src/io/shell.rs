//! Persistent child shell driven through pipes.
//!
//! One [`ShellSession`] owns one shell process. Commands are framed with a
//! sentinel echo (see [`crate::core::framing`]) and their stdout is collected
//! until the sentinel line shows up. Submissions serialize on the session
//! lock, so a single stdin/stdout pair never carries two commands at once.
//!
//! A command stays in flight until its sentinel is seen on stdout. When a
//! caller stops waiting early (timeout, or the future is dropped), the next
//! command first waits up to `stale_grace` for that sentinel and discards the
//! late output. If it never arrives the shell is still busy, or can no longer
//! parse its input, so it is killed and a fresh one takes its place.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::framing::{CapturedOutput, Sentinel, ShellKind};

/// Bytes kept from the end of an over-long stdout line, so a sentinel
/// printed after unterminated output still matches.
const LINE_TAIL_BYTES: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("shell is not running")]
    NotRunning,
    #[error("shell is already running")]
    AlreadyRunning,
    #[error("{context}: {source}")]
    Spawn {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("command execution timeout ({}s)", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("shell context cancelled")]
    Cancelled,
    #[error("shell exited unexpectedly: {0}")]
    Exited(&'static str),
    /// The shell was gone before the command reached it; nothing ran.
    #[error("shell exited before the command was sent: {0}")]
    Undelivered(String),
}

impl SessionError {
    fn spawn(context: &'static str, source: io::Error) -> Self {
        Self::Spawn { context, source }
    }
}

/// How to launch and drive the shell.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub kind: ShellKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory; the process's current directory when `None`.
    pub workdir: Option<PathBuf>,
    /// Timeout used by [`ShellSession::execute_command`].
    pub command_timeout: Duration,
    /// Grace period `stop` allows before force-killing the shell.
    pub stop_grace: Duration,
    /// How long a command waits for an abandoned predecessor to finish
    /// before the shell is replaced.
    pub stale_grace: Duration,
    pub output_limit_bytes: usize,
}

impl ShellConfig {
    pub fn for_kind(kind: ShellKind) -> Self {
        Self {
            kind,
            program: PathBuf::from(kind.default_program()),
            args: kind.default_args().iter().map(ToString::to_string).collect(),
            workdir: None,
            command_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
            stale_grace: Duration::from_secs(2),
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self::for_kind(ShellKind::host())
    }
}

struct ShellProcess {
    child: Child,
    /// Framed commands for the stdin writer task; dropping it closes stdin.
    commands: Option<mpsc::UnboundedSender<String>>,
    stdout: mpsc::UnboundedReceiver<String>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct SessionState {
    process: Option<ShellProcess>,
    /// Sentinel of the last submitted command, until it is seen on stdout.
    in_flight: Option<Sentinel>,
}

/// A single persistent shell process.
pub struct ShellSession {
    config: ShellConfig,
    state: Mutex<SessionState>,
    running: AtomicBool,
    cancel: StdMutex<CancellationToken>,
}

impl ShellSession {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::default()),
            running: AtomicBool::new(false),
            cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// OS process id of the current shell, if one is alive.
    pub async fn pid(&self) -> Option<u32> {
        let state = self.state.lock().await;
        state.process.as_ref().and_then(|process| process.child.id())
    }

    /// Spawns the shell and its pipe readers.
    #[instrument(skip_all, fields(program = %self.config.program.display()))]
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.process.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        state.process = Some(self.spawn_process()?);
        state.in_flight = None;
        *self.lock_cancel() = CancellationToken::new();
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Runs `command` with the configured default timeout.
    pub async fn execute_command(&self, command: &str) -> Result<String, SessionError> {
        self.execute_command_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Runs `command` and returns its stdout, joined by `\n`.
    ///
    /// Resolves with the first of: sentinel seen, `timeout` elapsed, or the
    /// session cancelled by [`ShellSession::stop`]. Time spent settling an
    /// abandoned predecessor is not counted against `timeout`.
    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn execute_command_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, SessionError> {
        let mut state = self.state.lock().await;
        let cancel = self.lock_cancel().clone();
        if state.process.is_none() {
            return Err(SessionError::NotRunning);
        }
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        if let Some(status) = exit_status(&mut state) {
            warn!(%status, "shell exited between commands");
            self.reap(&mut state).await;
            return Err(SessionError::Undelivered(status));
        }
        if state.in_flight.is_some() {
            self.settle_in_flight(&mut state, &cancel).await?;
        }

        let SessionState { process, in_flight } = &mut *state;
        let Some(process) = process.as_mut() else {
            return Err(SessionError::NotRunning);
        };
        let sentinel = Sentinel::generate();
        let framed = self.config.kind.frame(command, &sentinel);
        let submitted = process
            .commands
            .as_ref()
            .is_some_and(|tx| tx.send(framed).is_ok());
        if !submitted {
            self.reap(&mut state).await;
            return Err(SessionError::Undelivered("stdin closed".to_string()));
        }
        *in_flight = Some(sentinel.clone());
        debug!("command submitted");

        let limit = self.config.output_limit_bytes;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(SessionError::Timeout(timeout)),
            result = collect_output(&mut process.stdout, &sentinel, limit) => result,
        };

        match &outcome {
            Ok(_) => {
                *in_flight = None;
                debug!("command finished");
            }
            Err(SessionError::Timeout(_)) => warn!("command timed out"),
            Err(SessionError::Exited(reason)) => {
                warn!(reason, "shell exited while running command");
                self.reap(&mut state).await;
            }
            Err(err) => debug!(err = %err, "command aborted"),
        }
        outcome
    }

    /// Asks the shell to exit, then kills it if it is still alive after the
    /// grace period. A shell still busy with an abandoned command is killed
    /// right away.
    ///
    /// A command blocked in `execute_command` returns
    /// [`SessionError::Cancelled`] before the lock is taken here.
    #[instrument(skip_all)]
    pub async fn stop(&self) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.lock_cancel().cancel();

        let mut state = self.state.lock().await;
        let Some(mut process) = state.process.take() else {
            return Err(SessionError::NotRunning);
        };
        let busy = state.in_flight.take().is_some();

        if busy {
            debug!("shell busy with an abandoned command, killing");
            discard(process).await;
        } else {
            if let Some(commands) = process.commands.take()
                && commands
                    .send(self.config.kind.exit_directive().to_string())
                    .is_err()
            {
                debug!("stdin already closed, skipping exit directive");
            }

            match tokio::time::timeout(self.config.stop_grace, process.child.wait()).await {
                Ok(Ok(status)) => debug!(?status, "shell exited"),
                Ok(Err(e)) => warn!(err = %e, "failed to wait for shell"),
                Err(_) => {
                    warn!(
                        grace_ms = self.config.stop_grace.as_millis() as u64,
                        "shell did not exit in time, killing"
                    );
                }
            }
            discard(process).await;
        }
        self.running.store(false, Ordering::SeqCst);
        info!("shell stopped");
        Ok(())
    }

    /// Waits briefly for the abandoned command's sentinel; replaces the shell
    /// if it does not show up.
    async fn settle_in_flight(
        &self,
        state: &mut SessionState,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let (Some(stale), Some(process)) = (state.in_flight.as_ref(), state.process.as_mut())
        else {
            return Ok(());
        };
        let grace = self.config.stale_grace;
        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            settled = tokio::time::timeout(grace, discard_until(&mut process.stdout, stale)) => settled,
        };

        match settled {
            Ok(Ok(())) => {
                debug!("abandoned command finished late, output discarded");
                state.in_flight = None;
                Ok(())
            }
            Ok(Err(_)) => {
                warn!("shell exited while finishing an abandoned command");
                self.reap(state).await;
                Err(SessionError::Undelivered(
                    "exited while finishing the previous command".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "previous command still running, replacing shell"
                );
                self.respawn(state).await
            }
        }
    }

    /// Kills the current shell and starts a fresh one in its place.
    async fn respawn(&self, state: &mut SessionState) -> Result<(), SessionError> {
        state.in_flight = None;
        if let Some(process) = state.process.take() {
            discard(process).await;
        }
        match self.spawn_process() {
            Ok(process) => {
                state.process = Some(process);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Tears down a shell found dead.
    async fn reap(&self, state: &mut SessionState) {
        state.in_flight = None;
        if let Some(process) = state.process.take() {
            discard(process).await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn spawn_process(&self) -> Result<ShellProcess, SessionError> {
        let workdir = match &self.config.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| SessionError::spawn("failed to get current directory", e))?,
        };

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .current_dir(&workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            warn!(err = %e, "failed to spawn shell");
            SessionError::spawn("failed to start shell process", e)
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::spawn("failed to open stdin", missing_pipe()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::spawn("failed to open stdout", missing_pipe()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::spawn("failed to open stderr", missing_pipe()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let max_line_bytes = self.config.output_limit_bytes.max(LINE_TAIL_BYTES);
        let tasks = vec![
            tokio::spawn(write_commands(stdin, command_rx)),
            tokio::spawn(forward_lines(stdout, line_tx, max_line_bytes)),
            tokio::spawn(drain_stderr(stderr)),
        ];

        info!(pid = ?child.id(), workdir = %workdir.display(), "shell started");
        Ok(ShellProcess {
            child,
            commands: Some(command_tx),
            stdout: line_rx,
            tasks,
        })
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exit status of a shell that died since the last command, if any.
fn exit_status(state: &mut SessionState) -> Option<String> {
    let process = state.process.as_mut()?;
    match process.child.try_wait() {
        Ok(status) => status.map(|status| status.to_string()),
        Err(e) => {
            debug!(err = %e, "failed to poll shell status");
            None
        }
    }
}

/// Kills the shell if it is still alive and stops its pipe tasks.
async fn discard(mut process: ShellProcess) {
    process.commands = None;
    if let Err(e) = process.child.kill().await {
        debug!(err = %e, "shell already gone");
    }
    for task in &process.tasks {
        task.abort();
    }
}

/// Reads stdout lines until `sentinel` appears.
async fn collect_output(
    stdout: &mut mpsc::UnboundedReceiver<String>,
    sentinel: &Sentinel,
    limit_bytes: usize,
) -> Result<String, SessionError> {
    let mut captured = CapturedOutput::new(limit_bytes);
    loop {
        let line = stdout
            .recv()
            .await
            .ok_or(SessionError::Exited("unexpected end of output"))?;
        match sentinel.match_line(&line) {
            Some(tail) => {
                if !tail.is_empty() {
                    captured.push(tail);
                }
                return Ok(captured.finish());
            }
            None => captured.push(&line),
        }
    }
}

/// Drops stdout lines up to and including `sentinel`.
async fn discard_until(
    stdout: &mut mpsc::UnboundedReceiver<String>,
    sentinel: &Sentinel,
) -> Result<(), SessionError> {
    loop {
        let line = stdout
            .recv()
            .await
            .ok_or(SessionError::Exited("unexpected end of output"))?;
        if sentinel.match_line(&line).is_some() {
            return Ok(());
        }
    }
}

async fn write_commands(mut stdin: ChildStdin, mut commands: mpsc::UnboundedReceiver<String>) {
    while let Some(framed) = commands.recv().await {
        let written = match stdin.write_all(framed.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(err = %e, "failed to write to shell stdin");
            break;
        }
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(err = %e, "failed to close shell stdin");
    }
}

async fn forward_lines(
    stdout: impl AsyncRead + Unpin,
    lines: mpsc::UnboundedSender<String>,
    max_line_bytes: usize,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = BoundedLine::new(max_line_bytes);
    loop {
        let chunk = match reader.fill_buf().await {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(err = %e, "failed to read shell stdout");
                break;
            }
        };
        if chunk.is_empty() {
            if !line.is_empty() {
                let _ = lines.send(line.take());
            }
            break;
        }
        let (used, complete) = match chunk.iter().position(|b| *b == b'\n') {
            Some(end) => (end + 1, true),
            None => (chunk.len(), false),
        };
        line.extend(&chunk[..used]);
        reader.consume(used);
        if complete && lines.send(line.take()).is_err() {
            break;
        }
    }
}

/// One stdout line, bounded in memory.
///
/// Keeps the first `max_bytes` and the last [`LINE_TAIL_BYTES`]; the bytes in
/// between are only counted.
struct BoundedLine {
    max_bytes: usize,
    head: Vec<u8>,
    tail: VecDeque<u8>,
    omitted: usize,
}

impl BoundedLine {
    fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            head: Vec::new(),
            tail: VecDeque::new(),
            omitted: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.head.is_empty() && self.tail.is_empty()
    }

    fn extend(&mut self, bytes: &[u8]) {
        let room = self.max_bytes.saturating_sub(self.head.len()).min(bytes.len());
        let (head, rest) = bytes.split_at(room);
        self.head.extend_from_slice(head);
        if rest.len() >= LINE_TAIL_BYTES {
            self.omitted += self.tail.len() + rest.len() - LINE_TAIL_BYTES;
            self.tail.clear();
            self.tail.extend(&rest[rest.len() - LINE_TAIL_BYTES..]);
        } else {
            self.tail.extend(rest);
            let excess = self.tail.len().saturating_sub(LINE_TAIL_BYTES);
            self.tail.drain(..excess);
            self.omitted += excess;
        }
    }

    fn take(&mut self) -> String {
        let mut raw = std::mem::take(&mut self.head);
        if self.omitted > 0 {
            raw.extend_from_slice(format!(" [... {} bytes omitted ...] ", self.omitted).as_bytes());
        }
        raw.extend(self.tail.drain(..));
        self.omitted = 0;
        decode_line(&raw)
    }
}

async fn drain_stderr(stderr: impl AsyncRead + Unpin) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => debug!(line = %decode_line(&buf), "shell stderr"),
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    text.strip_suffix('\r').unwrap_or(text).to_string()
}

fn missing_pipe() -> io::Error {
    io::Error::other("pipe was not captured")
}
