//! Exit codes stackfix chooses itself.
//!
//! A fix run otherwise exits with the wrapped command's own code: the
//! original code when no patch was applied, the rerun code when one was.

/// Prompt answered or history shown.
pub const OK: i32 = 0;
/// No history, agent unreachable in prompt mode, or an internal error.
pub const FAILURE: i32 = 1;
