//! Rule-driven refactoring pipeline orchestrator.
//!
//! This crate drives a fixed six-stage pipeline (scan, interpret, apply,
//! verify, build, report) over a target project, delegating analysis and
//! code modification to external agents while keeping every decision,
//! artifact, and verdict deterministic and on disk. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan validation, target
//!   resolution, verdict aggregation, summary composition). No I/O, fully
//!   testable in isolation.
//! - **[`io`]**: Side-effecting operations (artifact store, run lock,
//!   process execution, agent invocation). Isolated to enable mocking in
//!   tests.
//!
//! Orchestration modules ([`pipeline`], [`stage`], [`passes`], [`verify`],
//! [`build`], [`report`]) coordinate core logic with I/O to implement the
//! pipeline stages.

pub mod build;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod passes;
pub mod pipeline;
pub mod report;
pub mod schemas;
pub mod stage;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
