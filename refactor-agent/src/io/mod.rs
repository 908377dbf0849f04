//! Side-effecting operations: filesystem, locks, config, process execution,
//! and external agent invocation. Isolated behind traits to enable scripted
//! stand-ins in tests.

pub mod agent;
pub mod commands;
pub mod config;
pub mod lock;
pub mod process;
pub mod prompt;
pub mod store;
