//! # mentor-store
//!
//! SQLite persistence for the tutoring domain - concepts, topic mastery,
//! knowledge gaps, mnemonic devices, verified content, authority sources,
//! and session snapshots - plus the concept similarity search the
//! teaching agent retrieves knowledge through.

pub mod search;
pub mod store;

pub use search::{ConceptSearch, SqliteConceptSearch};
pub use store::{ConceptRow, SqliteStore, TopicRow};
