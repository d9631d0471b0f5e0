//! Command framing for the persistent shell.
//!
//! A shell driven through pipes interleaves command output with no structural
//! delimiter, so every submitted command is followed by an `echo` of a freshly
//! generated sentinel. Every stdout line up to the sentinel belongs to that
//! command.

use std::fmt;

use crate::core::ids::unique_suffix;

/// Returned instead of an empty string when a command printed nothing.
pub const NO_OUTPUT_MESSAGE: &str = "Command executed successfully (no output)";

/// Shell dialect used to frame commands and to say goodbye.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// `bash` and compatible shells.
    Posix,
    /// The Windows command interpreter.
    Cmd,
}

impl ShellKind {
    /// Dialect of the shell native to the host platform.
    pub fn host() -> Self {
        if cfg!(windows) { Self::Cmd } else { Self::Posix }
    }

    pub fn default_program(self) -> &'static str {
        match self {
            Self::Posix => "/bin/bash",
            Self::Cmd => "cmd",
        }
    }

    pub fn default_args(self) -> &'static [&'static str] {
        match self {
            Self::Posix => &[],
            Self::Cmd => &["/Q", "/K"],
        }
    }

    /// Line asking the shell to exit on its own.
    pub fn exit_directive(self) -> &'static str {
        match self {
            Self::Posix => "exit\n",
            Self::Cmd => "exit\r\n",
        }
    }

    /// Wraps `command` so the shell echoes `sentinel` on its own line once the
    /// command has finished.
    ///
    /// POSIX commands run in a brace group with stdin detached, so a command
    /// that reads stdin cannot consume the sentinel echo, and a trailing
    /// comment or `&` in `command` cannot swallow it either.
    pub fn frame(self, command: &str, sentinel: &Sentinel) -> String {
        match self {
            Self::Posix => format!("{{ {command}\n}} </dev/null\necho '{sentinel}'\n"),
            Self::Cmd => format!("{command} & echo {sentinel}\r\n"),
        }
    }
}

/// Unpredictable end-of-output marker for one command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sentinel(String);

impl Sentinel {
    pub fn generate() -> Self {
        Self(format!("__CMD_END_{}__", unique_suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether `line` carries this sentinel.
    ///
    /// Returns the text preceding the marker, which is non-empty when the
    /// command's last output line had no trailing newline.
    pub fn match_line<'a>(&self, line: &'a str) -> Option<&'a str> {
        line.trim_end().strip_suffix(self.0.as_str())
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates the stdout lines of one command, bounded by `limit_bytes`.
///
/// Lines past the limit are still consumed by the caller; they are only
/// counted, and reported as a truncation notice.
#[derive(Debug)]
pub struct CapturedOutput {
    lines: Vec<String>,
    bytes: usize,
    limit_bytes: usize,
    truncated_bytes: usize,
}

impl CapturedOutput {
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            lines: Vec::new(),
            bytes: 0,
            limit_bytes,
            truncated_bytes: 0,
        }
    }

    pub fn push(&mut self, line: &str) {
        let cost = line.len() + 1;
        if self.truncated_bytes > 0 || self.bytes + cost > self.limit_bytes {
            self.truncated_bytes += cost;
            return;
        }
        self.bytes += cost;
        self.lines.push(line.to_string());
    }

    pub fn truncated_bytes(&self) -> usize {
        self.truncated_bytes
    }

    /// Joins the captured lines with `\n`.
    pub fn finish(self) -> String {
        let mut output = self.lines.join("\n");
        if self.truncated_bytes > 0 {
            output.push_str(&format!(
                "\n[output truncated {} bytes]",
                self.truncated_bytes
            ));
        }
        if output.is_empty() {
            return NO_OUTPUT_MESSAGE.to_string();
        }
        output
    }
}
