//! Pure, deterministic pipeline logic. No I/O.

pub mod changelog;
pub mod manifest;
pub mod plan;
pub mod run;
pub mod summary;
pub mod types;
pub mod verdict;
