//! Stable exit codes for parsegen CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid usage, unreadable inputs, or another fatal error.
pub const INVALID: i32 = 1;
/// `parsegen run` exhausted its attempt budget without a match.
pub const EXHAUSTED: i32 = 2;
/// `parsegen check` found the persisted module faulting or diverging.
pub const MISMATCH: i32 = 3;
