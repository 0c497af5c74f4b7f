//! Records produced by an attribution session.

use serde::{Deserialize, Serialize};

use story_model::Choice;

use crate::resolver::ResolvedKnot;

/// What one interpreter step produced and who owns it. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecord {
    /// Zero-based step number within the session.
    pub step: usize,
    pub text: String,
    pub owner_knot: String,
    pub knot_changed: bool,
    /// Resolution of the position before the step.
    pub before: ResolvedKnot,
    /// Resolution of the position after the step.
    pub after: ResolvedKnot,
}

impl AttributionRecord {
    pub fn from_knot(&self) -> &str {
        &self.before.name
    }

    pub fn to_knot(&self) -> &str {
        &self.after.name
    }
}

/// Why a content group was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushReason {
    /// Execution moved into another knot.
    Transition,
    /// The owner changed without a detected transition.
    OwnerChanged,
    /// The story stopped to offer choices.
    Choices,
    /// The story ended.
    Finished,
}

/// A completed run of steps owned by one knot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGroup {
    pub knot: String,
    pub records: Vec<AttributionRecord>,
    /// Choices that were pending when the group closed.
    pub choices: Vec<Choice>,
    pub reason: FlushReason,
}

impl ContentGroup {
    /// The group's text in step order.
    pub fn text(&self) -> String {
        self.records.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn step_count(&self) -> usize {
        self.records.len()
    }
}

/// A detected move from one knot to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnotTransition {
    pub from: String,
    pub to: String,
    pub step: usize,
    /// Whether the transition closed a non-empty group.
    pub flushed: bool,
}
