//! Stable exit codes for the refactor-agent CLI.

/// Run completed with a clean result.
pub const OK: i32 = 0;
/// Invalid invocation: bad arguments, missing rules file, unreadable config.
pub const INVALID: i32 = 1;
/// Run completed but degraded: warnings, blocking findings, or build failures.
pub const DEGRADED: i32 = 2;
/// Run aborted before completion, or another run holds the lock.
pub const ABORTED: i32 = 3;
