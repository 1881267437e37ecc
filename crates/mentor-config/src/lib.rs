//! # mentor-config
//!
//! Configuration system for Mentor (`mentor.toml`).
//!
//! All tunable heuristics of the tutoring workflow - coverage thresholds,
//! negative keywords, review intervals, mnemonic strategy rules, length
//! triggers - live here as policy rather than as code constants.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::MentorConfig;
