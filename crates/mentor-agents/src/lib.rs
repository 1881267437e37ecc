//! # mentor-agents
//!
//! The five specialized reasoning agents and the generic machinery they
//! share:
//!
//! - [`cycle::run_cycle`] - the reasoning-action loop: ask the oracle,
//!   dispatch the requested action, append the observation, repeat until
//!   the oracle emits terminal text (bounded by a step budget).
//! - [`registry::ActionRegistry`] - per-agent action dispatch with
//!   argument completion from the [`context::ActionContext`].
//! - [`extract`] - total, tag-based result extraction from transcripts.
//!
//! Each agent is one configuration of {registry, prompts, extractor}:
//! teaching, assessment, progress, validation, and mnemonic.

pub mod assessment;
pub mod context;
pub mod cycle;
pub mod extract;
pub mod mnemonic;
pub mod progress;
pub mod registry;
pub mod teaching;
pub mod validation;

pub use assessment::{AssessmentAgent, AssessmentOutput};
pub use context::ActionContext;
pub use cycle::{CycleOutcome, run_cycle};
pub use mnemonic::MnemonicAgent;
pub use progress::{ProgressAgent, ProgressSnapshot};
pub use registry::{ActionHandler, ActionRegistry};
pub use teaching::TeachingAgent;
pub use validation::{ValidationAgent, ValidationReport};
