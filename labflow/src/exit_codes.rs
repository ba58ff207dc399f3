//! Stable exit codes for labflow CLI commands.

/// The run completed every plan step, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid invocation or config, or an error before the loop started.
pub const INVALID: i32 = 1;
/// The run ended with a fatal error (planning, sync, or retry exhaustion).
pub const FAILED: i32 = 2;
/// The run hit the step budget before reaching a terminal state.
pub const BUDGET_EXHAUSTED: i32 = 3;
