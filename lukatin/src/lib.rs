//! Interactive coding-assistant shell.
//!
//! Tool calls (`Bash`, `Read`, `Edit`, `MultiEdit`, `Write`, `LS`, `Glob`,
//! `Grep`, `TodoRead`, `TodoWrite`) run against a persistent child shell and
//! the local filesystem. Mutations wait for an operator decision unless no
//! front end is attached. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (command framing, edit planning,
//!   write policy, review bookkeeping). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (the shell session, the approval
//!   gate, file tools, config).
//!
//! [`tools`] routes parsed tool calls, [`ui`] is the channel boundary to a
//! front end, and [`repl`] is the terminal front end used by the binary.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repl;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod ui;
