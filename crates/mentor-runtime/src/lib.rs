//! # mentor-runtime
//!
//! The tutoring session state machine - the top level that routes one
//! [`mentor_core::SessionState`] through the five agents.
//!
//! ## Stage graph
//!
//! ```text
//!  initialized
//!      │
//!  detect intent ──────────────┬───────────────┬──────────────┐
//!      │ learn/other           │ practice      │ progress     │ review
//!      ▼                       ▼               ▼              ▼
//!  evaluate_baseline      assessment_entry  progress_entry  review_entry
//!      │                       │               │              │
//!  retrieve_knowledge          └───────────────┴──────┬───────┘
//!      │                                              │
//!  generate_explanation ◄─────────────── retry        │
//!      │                                   │          │
//!  [validate_content]                      │          │
//!      │                                   │          │
//!  [generate_mnemonic]                     │          │
//!      │                                   │          │
//!  create_check ◄──── adaptive_followup    │          │
//!      │                     ▲             │          │
//!  awaiting_response (pause) │             │          │
//!      │ resume(answer)      │ partial     │          │
//!  assess_understanding ─────┴─────────────┤          │
//!      │ fully                             │ ceiling  │
//!      ▼                                   ▼          │
//!  update_progress                    record_gap      │
//!      └───────────────┬──────────────────┘           │
//!                      ▼                              │
//!                  finalized ◄────────────────────────┘
//! ```
//!
//! A failing agent never aborts the session: the stage's fields stay
//! unset, `error_message` is populated, and the machine still reaches
//! `finalized`.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, should_generate_mnemonic, should_validate};
