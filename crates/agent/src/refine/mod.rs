//! Self-refine loop
//!
//! One iteration evaluates the generated answer, lets the configured
//! strategy decide on re-retrieval, and applies the duplicate-result and
//! stagnation safeguards. The loop is strictly sequential and bounded by
//! `max_iterations`.

mod controller;
mod registry;
mod safeguards;
mod strategy;

pub use controller::{RefineController, RefineDecision, RefineState};
pub use registry::{StrategyDeps, StrategyRegistry};
pub use safeguards::{SafeguardView, Safeguards};
pub use strategy::{BasicStrategy, CorrectiveStrategy, RefineInput, RefineOutcome, RefineStrategy};
