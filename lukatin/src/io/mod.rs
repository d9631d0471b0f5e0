//! Side-effecting code: the shell session, the approval gate, file tools
//! and workspace search.

pub mod config;
pub mod dispatcher;
pub mod files;
pub mod gate;
pub mod read_history;
pub mod search;
pub mod shell;
