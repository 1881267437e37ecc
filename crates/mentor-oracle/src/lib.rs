//! # mentor-oracle
//!
//! Reasoning-oracle abstraction layer. The oracle is the external
//! text-generation capability every agent consults for its next step:
//! given a system prompt, the task input, the transcript so far, and the
//! available actions, it replies with either terminal text or an action
//! request.
//!
//! Backends: an OpenAI-compatible HTTP provider (with a per-call
//! deadline) and a queued mock for tests. Embedding providers for the
//! concept similarity search live here too.

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod provider;

pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use mock::MockOracle;
pub use openai::OpenAiOracle;
pub use provider::{Oracle, OracleReply, OracleRequest};
