//! `autopost-worker` library crate.
//!
//! The job supervisor and everything it owns: command construction,
//! line-oriented output streaming, the status registry, and the session
//! registry. The binary entrypoint lives in `main.rs`.

pub mod command;
pub mod config;
pub mod lines;
pub mod registry;
pub mod sessions;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use supervisor::{JobHandle, Supervisor, SupervisorError};
