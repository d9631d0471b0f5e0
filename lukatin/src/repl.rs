//! Line-oriented terminal front end.
//!
//! A single loop consumes two sources in arrival order: [`UiEvent`]s sent by
//! running tools, and operator input lines. Reviews queue up in arrival
//! order and only the head accepts a `y`/`n` answer. Tool calls run on their
//! own task so the loop stays responsive; `:cancel` aborts the running call
//! through its cancellation token without touching the shell session.

use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::review::{ReviewQueue, parse_answer};
use crate::core::types::Decision;
use crate::io::config::LukatinConfig;
use crate::io::dispatcher::CommandInvocation;
use crate::tools::{ToolCall, Toolbox};
use crate::ui::{UiEvent, UiHandle, render_review};

const HELP: &str = "\
commands:
  !<command>     run a shell command in the persistent session
  {\"tool\":...}   run a tool call (Bash, Read, Edit, MultiEdit, Write,
                 LS, Glob, Grep, TodoRead, TodoWrite)
  y / n          approve or reject the active review
  :pending       list reviews waiting for a decision
  :cancel        cancel the running tool call
  :quit          exit";

struct RunningTask {
    id: u64,
    tool: &'static str,
    cancel: CancellationToken,
}

pub struct Repl<W: Write> {
    toolbox: Arc<Toolbox>,
    ui: UiHandle,
    events: UnboundedReceiver<UiEvent>,
    reviews: ReviewQueue,
    task: Option<RunningTask>,
    next_task_id: u64,
    out: W,
}

impl<W: Write> Repl<W> {
    pub fn new(config: &LukatinConfig, out: W) -> Self {
        let (ui, events) = UiHandle::channel();
        let toolbox = Arc::new(Toolbox::new(config, Some(ui.clone())));
        Self {
            toolbox,
            ui,
            events,
            reviews: ReviewQueue::new(),
            task: None,
            next_task_id: 1,
            out,
        }
    }

    pub fn toolbox(&self) -> &Arc<Toolbox> {
        &self.toolbox
    }

    /// Runs until `:quit` or end of input, then tears everything down.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<W> {
        let mut lines = input.lines();
        self.say("lukatin ready. :help for commands.")?;
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.handle_event(event)?,
                line = lines.next_line() => {
                    let Some(line) = line.context("read input")? else {
                        break;
                    };
                    if self.handle_line(&line)?.is_break() {
                        break;
                    }
                }
            }
        }
        self.finish().await;
        Ok(self.out)
    }

    fn handle_event(&mut self, event: UiEvent) -> Result<()> {
        match event {
            UiEvent::ToolDescription(description) => self.say(&format!("> {description}")),
            UiEvent::ReviewRequested(request) => {
                let id = request.change_id.clone();
                if self.reviews.push(request) {
                    self.show_active()
                } else {
                    self.say(&format!(
                        "review {id} queued ({} waiting)",
                        self.reviews.len() - 1
                    ))
                }
            }
            UiEvent::ToolFinished {
                task_id,
                tool,
                result,
            } => {
                if self.task.as_ref().is_some_and(|task| task.id == task_id) {
                    self.task = None;
                }
                self.say(&format!("[{tool}] {result}"))?;
                let gate = Arc::clone(self.toolbox.gate());
                if self.reviews.retain(|id| gate.is_pending(id)) {
                    self.show_active()?;
                }
                Ok(())
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<ControlFlow<()>> {
        let input = line.trim();
        if input.is_empty() {
            return Ok(ControlFlow::Continue(()));
        }
        if self.reviews.active().is_some()
            && let Some(approved) = parse_answer(input)
        {
            self.answer(approved)?;
            return Ok(ControlFlow::Continue(()));
        }

        match input {
            ":quit" | ":q" | "quit" | "exit" => return Ok(ControlFlow::Break(())),
            ":help" => self.say(HELP)?,
            ":cancel" => self.cancel_task()?,
            ":pending" => self.list_pending()?,
            _ => {
                if let Some(command) = input.strip_prefix('!') {
                    self.spawn(ToolCall::Bash(CommandInvocation::new(command.trim())))?;
                } else if input.starts_with('{') {
                    match ToolCall::parse(input) {
                        Ok(call) => self.spawn(call)?,
                        Err(err) => self.say(&format!("error: {err:#}"))?,
                    }
                } else if self.reviews.active().is_some() {
                    self.say("answer y or n for the active review")?;
                } else {
                    self.say("unrecognized input; :help lists commands")?;
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn answer(&mut self, approved: bool) -> Result<()> {
        let Some(change_id) = self.reviews.active().map(|r| r.change_id.clone()) else {
            return Ok(());
        };
        let decision = Decision {
            change_id: change_id.clone(),
            approved,
        };
        match self.toolbox.gate().resolve(decision) {
            Ok(()) => {
                let verb = if approved { "approved" } else { "rejected" };
                self.say(&format!("{verb} {change_id}"))?;
            }
            Err(err) => {
                debug!(err = %err, "decision ignored");
                self.say(&format!("review {change_id} is no longer pending"))?;
            }
        }
        self.reviews.complete(&change_id);
        self.show_active()
    }

    fn spawn(&mut self, call: ToolCall) -> Result<()> {
        if let Some(task) = &self.task {
            let message = format!("{} is still running; wait or :cancel", task.tool);
            return self.say(&message);
        }

        let id = self.next_task_id;
        self.next_task_id += 1;
        let tool = call.name();
        let cancel = CancellationToken::new();

        let toolbox = Arc::clone(&self.toolbox);
        let ui = self.ui.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => format!("{tool} operation cancelled by user"),
                result = toolbox.invoke(&call) => result,
            };
            ui.send(UiEvent::ToolFinished {
                task_id: id,
                tool,
                result,
            });
        });

        self.task = Some(RunningTask { id, tool, cancel });
        self.say(&format!("running {tool}..."))
    }

    fn cancel_task(&mut self) -> Result<()> {
        match &self.task {
            Some(task) => {
                task.cancel.cancel();
                let message = format!("cancelling {}", task.tool);
                self.say(&message)
            }
            None => self.say("nothing to cancel"),
        }
    }

    fn list_pending(&mut self) -> Result<()> {
        if self.reviews.is_empty() {
            return self.say("no pending reviews");
        }
        let listing: Vec<String> = self
            .reviews
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let marker = if i == 0 { "*" } else { " " };
                format!(
                    "{marker} {} {} {}",
                    r.change_id,
                    r.operation,
                    r.path.display()
                )
            })
            .collect();
        self.say(&listing.join("\n"))
    }

    fn show_active(&mut self) -> Result<()> {
        let Some(request) = self.reviews.active() else {
            return Ok(());
        };
        let rendered = render_review(request);
        write!(self.out, "{rendered}").context("write review")?;
        self.say("approve? [y/n]")
    }

    async fn finish(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
        }
        self.toolbox.shutdown().await;
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{text}").context("write output")?;
        self.out.flush().context("flush output")
    }
}
