//! Tool-call surface: parses calls and routes them to the dispatcher, the
//! file tools, workspace search or the session's todo list.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::edit::EditOperation;
use crate::core::todo::{NO_TODOS, TodoItem, render_todos, validate_todos};
use crate::io::config::LukatinConfig;
use crate::io::dispatcher::{CommandDispatcher, CommandInvocation};
use crate::io::files::FileTools;
use crate::io::gate::MutationGate;
use crate::io::read_history::ReadHistory;
use crate::io::search;
use crate::ui::UiHandle;

/// One tool call, tagged by tool name:
/// `{"tool":"Bash","command":"ls","description":"List files"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tool")]
pub enum ToolCall {
    Bash(CommandInvocation),
    Read {
        file_path: String,
        #[serde(default)]
        offset: Option<usize>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Edit {
        file_path: String,
        #[serde(flatten)]
        edit: EditOperation,
    },
    MultiEdit {
        file_path: String,
        edits: Vec<EditOperation>,
    },
    Write {
        file_path: String,
        content: String,
    },
    #[serde(rename = "LS")]
    Ls {
        path: String,
        #[serde(default)]
        ignore: Vec<String>,
    },
    Glob {
        pattern: String,
        #[serde(default)]
        path: Option<String>,
    },
    Grep {
        pattern: String,
        #[serde(default)]
        include: Option<String>,
        #[serde(default)]
        path: Option<String>,
    },
    TodoRead,
    TodoWrite {
        todos: Vec<TodoItem>,
    },
}

impl ToolCall {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse tool call")
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bash(_) => "Bash",
            Self::Read { .. } => "Read",
            Self::Edit { .. } => "Edit",
            Self::MultiEdit { .. } => "MultiEdit",
            Self::Write { .. } => "Write",
            Self::Ls { .. } => "LS",
            Self::Glob { .. } => "Glob",
            Self::Grep { .. } => "Grep",
            Self::TodoRead => "TodoRead",
            Self::TodoWrite { .. } => "TodoWrite",
        }
    }
}

/// Everything a tool call needs, shared across the tasks that run calls.
pub struct Toolbox {
    dispatcher: CommandDispatcher,
    files: FileTools,
    todos: Mutex<Vec<TodoItem>>,
}

impl Toolbox {
    /// Builds the tools; with no `ui`, edits and writes are auto-approved.
    pub fn new(config: &LukatinConfig, ui: Option<UiHandle>) -> Self {
        let gate = match &ui {
            Some(ui) => MutationGate::attached(ui.clone()),
            None => MutationGate::headless(),
        }
        .with_approval_timeout(config.approval_timeout());
        let history = Arc::new(ReadHistory::new(config.read_history_window()));
        let dispatcher = CommandDispatcher::new(config.shell_config(), ui)
            .with_timeouts(config.default_command_timeout(), config.max_command_timeout());
        Self {
            dispatcher,
            files: FileTools::new(Arc::new(gate), history, config.file_limits()),
            todos: Mutex::new(Vec::new()),
        }
    }

    pub fn gate(&self) -> &Arc<MutationGate> {
        self.files.gate()
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Runs `call` and returns its result string.
    pub async fn invoke(&self, call: &ToolCall) -> String {
        match call {
            ToolCall::Bash(invocation) => self.dispatcher.dispatch(invocation).await.to_json(),
            ToolCall::Read {
                file_path,
                offset,
                limit,
            } => self.files.read(file_path, *offset, *limit).await,
            ToolCall::Edit { file_path, edit } => self.files.edit(file_path, edit).await,
            ToolCall::MultiEdit { file_path, edits } => {
                self.files.multi_edit(file_path, edits).await
            }
            ToolCall::Write { file_path, content } => self.files.write(file_path, content).await,
            ToolCall::Ls { path, ignore } => search::list_directory(path, ignore).await,
            ToolCall::Glob { pattern, path } => {
                search::glob_files(pattern, path.as_deref()).await
            }
            ToolCall::Grep {
                pattern,
                include,
                path,
            } => search::grep_files(pattern, include.as_deref(), path.as_deref()).await,
            ToolCall::TodoRead => self.read_todos(),
            ToolCall::TodoWrite { todos } => self.write_todos(todos),
        }
    }

    fn read_todos(&self) -> String {
        let todos = self.todos();
        if todos.is_empty() {
            return NO_TODOS.to_string();
        }
        serde_json::to_string(&*todos).unwrap_or_else(|err| format!("Error: {err}"))
    }

    /// Replaces the whole list, or leaves it untouched when `items` is invalid.
    fn write_todos(&self, items: &[TodoItem]) -> String {
        if let Err(err) = validate_todos(items) {
            return format!("Error: {err}");
        }
        let mut todos = self.todos();
        *todos = items.to_vec();
        render_todos(&todos)
    }

    fn todos(&self) -> MutexGuard<'_, Vec<TodoItem>> {
        self.todos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops the shell and abandons any review still waiting.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        self.gate().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::todo::TodoStatus;

    #[test]
    fn parses_bash_call() {
        let call = ToolCall::parse(r#"{"tool":"Bash","command":"ls -la","timeout":0}"#)
            .expect("parse");
        assert_eq!(
            call,
            ToolCall::Bash(CommandInvocation::new("ls -la").with_timeout_ms(0))
        );
        assert_eq!(call.name(), "Bash");
    }

    #[test]
    fn parses_edit_call_with_defaults() {
        let call = ToolCall::parse(
            r#"{"tool":"Edit","file_path":"/w/a.rs","old_string":"a","new_string":"b"}"#,
        )
        .expect("parse");
        assert_eq!(
            call,
            ToolCall::Edit {
                file_path: "/w/a.rs".to_string(),
                edit: EditOperation::new("a", "b"),
            }
        );
    }

    #[test]
    fn parses_multi_edit_call() {
        let call = ToolCall::parse(
            r#"{"tool":"MultiEdit","file_path":"/w/a.rs","edits":[
                {"old_string":"a","new_string":"b","expected_replacements":2},
                {"old_string":"c","new_string":"d","replace_all":true}
            ]}"#,
        )
        .expect("parse");
        let ToolCall::MultiEdit { edits, .. } = call else {
            panic!("expected MultiEdit");
        };
        assert_eq!(edits[0], EditOperation::new("a", "b").expecting(2));
        assert_eq!(edits[1], EditOperation::new("c", "d").replace_all());
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let err = ToolCall::parse(r#"{"tool":"WebFetch","url":"x"}"#).expect_err("unknown");
        assert!(format!("{err:#}").contains("parse tool call"));
    }

    #[test]
    fn parses_search_calls() {
        let ls = ToolCall::parse(r#"{"tool":"LS","path":"/w","ignore":["*.log"]}"#)
            .expect("parse");
        assert_eq!(
            ls,
            ToolCall::Ls {
                path: "/w".to_string(),
                ignore: vec!["*.log".to_string()],
            }
        );
        assert_eq!(ls.name(), "LS");

        let glob = ToolCall::parse(r#"{"tool":"Glob","pattern":"**/*.rs"}"#).expect("parse");
        assert_eq!(
            glob,
            ToolCall::Glob {
                pattern: "**/*.rs".to_string(),
                path: None,
            }
        );

        let grep = ToolCall::parse(r#"{"tool":"Grep","pattern":"fn \\w+","include":"*.rs"}"#)
            .expect("parse");
        assert_eq!(
            grep,
            ToolCall::Grep {
                pattern: r"fn \w+".to_string(),
                include: Some("*.rs".to_string()),
                path: None,
            }
        );
        assert_eq!(grep.name(), "Grep");
    }

    #[test]
    fn parses_todo_calls() {
        assert_eq!(
            ToolCall::parse(r#"{"tool":"TodoRead"}"#).expect("parse"),
            ToolCall::TodoRead
        );
        let call = ToolCall::parse(
            r#"{"tool":"TodoWrite","todos":[{"id":1,"content":"a","status":"pending"}]}"#,
        )
        .expect("parse");
        assert_eq!(
            call,
            ToolCall::TodoWrite {
                todos: vec![TodoItem::new("1", "a", TodoStatus::Pending)],
            }
        );
    }

    #[tokio::test]
    async fn headless_toolbox_writes_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("a.rs");
        let toolbox = Toolbox::new(&LukatinConfig::default(), None);
        assert!(toolbox.gate().is_headless());

        let call = ToolCall::Write {
            file_path: path.to_string_lossy().into_owned(),
            content: "fn a() {}\n".to_string(),
        };
        let result = toolbox.invoke(&call).await;
        assert!(result.starts_with("Successfully created"), "{result}");
        toolbox.shutdown().await;
    }

    #[tokio::test]
    async fn bash_call_returns_json() {
        let toolbox = Toolbox::new(&LukatinConfig::default(), None);
        let call = ToolCall::Bash(CommandInvocation::new(""));
        let result = toolbox.invoke(&call).await;
        let value: serde_json::Value = serde_json::from_str(&result).expect("json");
        assert_eq!(value["exit_code"], -1);
    }

    #[tokio::test]
    async fn search_calls_route_to_workspace_queries() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(temp.path().join("src")).expect("mkdir");
        std::fs::write(temp.path().join("src/lib.rs"), "pub fn spawn() {}\n").expect("write");
        std::fs::write(temp.path().join("notes.md"), "todo\n").expect("write");
        let root = temp.path().to_string_lossy().into_owned();
        let toolbox = Toolbox::new(&LukatinConfig::default(), None);

        let ls = toolbox
            .invoke(&ToolCall::Ls {
                path: root.clone(),
                ignore: Vec::new(),
            })
            .await;
        assert_eq!(ls, r#"["notes.md","src/"]"#);

        let glob = toolbox
            .invoke(&ToolCall::Glob {
                pattern: "*.rs".to_string(),
                path: Some(root.clone()),
            })
            .await;
        assert_eq!(glob, r#"["src/lib.rs"]"#);

        let grep = toolbox
            .invoke(&ToolCall::Grep {
                pattern: r"fn \w+".to_string(),
                include: None,
                path: Some(root),
            })
            .await;
        assert_eq!(grep, r#"["src/lib.rs"]"#);
        toolbox.shutdown().await;
    }

    #[tokio::test]
    async fn todo_write_replaces_list_and_rejects_invalid_input() {
        let toolbox = Toolbox::new(&LukatinConfig::default(), None);
        assert_eq!(toolbox.invoke(&ToolCall::TodoRead).await, NO_TODOS);

        let todos = vec![
            TodoItem::new("1", "plan", TodoStatus::Completed),
            TodoItem::new("2", "build", TodoStatus::InProgress),
        ];
        let written = toolbox
            .invoke(&ToolCall::TodoWrite {
                todos: todos.clone(),
            })
            .await;
        assert!(written.starts_with("☑ plan\n☐ ▶ build\n"), "{written}");
        assert!(written.ends_with("Progress: 1/2 completed | 1 in progress | 0 pending"));

        let read = toolbox.invoke(&ToolCall::TodoRead).await;
        let stored: Vec<TodoItem> = serde_json::from_str(&read).expect("json");
        assert_eq!(stored, todos);

        let duplicate = ToolCall::TodoWrite {
            todos: vec![
                TodoItem::new("1", "a", TodoStatus::Pending),
                TodoItem::new("1", "b", TodoStatus::Pending),
            ],
        };
        let rejected = toolbox.invoke(&duplicate).await;
        assert_eq!(rejected, "Error: duplicate todo id \"1\"");
        let unchanged: Vec<TodoItem> =
            serde_json::from_str(&toolbox.invoke(&ToolCall::TodoRead).await).expect("json");
        assert_eq!(unchanged, todos);
        toolbox.shutdown().await;
    }
}
