//! # mentor-cli
//!
//! Command-line interface for the Mentor tutoring orchestrator.
//!
//! ## Commands
//!
//! - `mentor ask` - ask a question and work through the session
//! - `mentor practice` - one-shot assessment
//! - `mentor progress` - learning progress overview
//! - `mentor review` - topics due for review
//! - `mentor config` - show configuration
//! - `mentor init` - write a starter mentor.toml

pub mod commands;

pub use commands::Cli;
