//! Generation module - per-step constraint pipeline
//!
//! Everything that runs inside the sampler loop lives here: the character
//! state machine, the schema-space context stack, the mask policy and the
//! logit processor that orchestrates them, plus the post-generation
//! validator and the retry policy around it.
//!
//! ## Module Organization
//!
//! - [`config`] - Constraint configuration and parameter management
//! - [`state_machine`] - Character-driven JSON automaton
//! - [`context`] - Schema-space mirror of the bracket stack
//! - [`policy`] - Phase × context → allow-set decisions
//! - [`processor`] - Sampler-facing logit processor
//! - [`stats`] - Constraint statistics and step accounting
//! - [`validator`] - Post-generation key-set validation
//! - [`recovery`] - Retry policy around validator failures

pub mod config;
pub mod context;
pub mod policy;
pub mod processor;
pub mod recovery;
pub mod state_machine;
pub mod stats;
pub mod validator;

pub use config::ConstraintConfig;
pub use context::{ContextFrame, ContextStack};
pub use policy::{MaskDecision, PolicyInputs, TokenSet, decide};
pub use processor::LogitProcessor;
pub use recovery::{RetryPolicy, drive};
pub use state_machine::{
    Container, JsonStateMachine, NumberPhase, Phase, StateEvent, StringKind,
};
pub use stats::ConstraintStatistics;
pub use validator::validate;
