//! Stable exit codes for `lukatin` CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments, config, or tool call, or any other error.
pub const INVALID: i32 = 1;
/// `lukatin bash` ran, but the tool reported a non-zero `exit_code`.
pub const TOOL_FAILED: i32 = 2;
