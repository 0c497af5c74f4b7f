//! Which knot owns the text a step produced.
//!
//! A step that crosses a knot boundary emits its text while leaving one knot
//! and entering another. Which side owns that text is a product decision,
//! kept in this one function so it can be changed without touching the
//! session state machine.

use serde::{Deserialize, Serialize};

use crate::resolver::ResolvedKnot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionPolicy {
    /// Text belongs to the knot execution lands in.
    #[default]
    LandingKnot,
    /// Text belongs to the knot execution started from.
    DepartingKnot,
}

/// Owner of a step's text, or `None` when neither reading is valid and the
/// text stays with whoever owned the content before it.
pub fn content_owner(
    policy: AttributionPolicy,
    before: &ResolvedKnot,
    after: &ResolvedKnot,
) -> Option<String> {
    let (preferred, other) = match policy {
        AttributionPolicy::LandingKnot => (after, before),
        AttributionPolicy::DepartingKnot => (before, after),
    };

    if preferred.valid {
        Some(preferred.name.clone())
    } else if other.valid {
        Some(other.name.clone())
    } else {
        None
    }
}
