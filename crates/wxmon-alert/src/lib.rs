//! Alert evaluation and lifecycle management.
//!
//! [`evaluator::evaluate`] maps one reading plus the active rule set
//! onto trigger/clear events; it is a pure function, with all dedup
//! state passed in by the caller. [`cache::RuleCache`] serves the rule
//! snapshot. [`lifecycle::AlertLifecycleManager`] owns every alert
//! state transition (NEW → ACTIVE → RESOLVED) and is the only writer of
//! alert status.

pub mod cache;
pub mod evaluator;
pub mod lifecycle;
pub mod rules;

#[cfg(test)]
mod tests;
