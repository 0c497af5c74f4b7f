//! Position Resolver - maps an execution position to its owning knot.
//!
//! Resolution tries, in order:
//! 1. **Structural**: the position's path lies under a known knot
//! 2. **Native**: the interpreter's own guess, re-checked against the index
//! 3. **Sticky**: the last knot that resolved in this session
//! 4. **Unresolved**: `unknown`, marked invalid
//!
//! The resolver keeps no state; the sticky knot is passed in by the caller.

use serde::{Deserialize, Serialize};
use tracing::debug;

use story_model::StoryPath;

use crate::knot_index::KnotIndex;

/// Name reported when nothing resolves.
pub const UNKNOWN_KNOT: &str = "unknown";

/// Which rung of the fallback chain produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionSource {
    Structural,
    Native,
    Sticky,
    Unresolved,
}

/// Outcome of a resolution. `valid == false` means attribution is pending
/// and `name` must not be treated as a real knot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedKnot {
    pub name: String,
    pub valid: bool,
    pub source: ResolutionSource,
}

impl ResolvedKnot {
    fn known(name: impl Into<String>, source: ResolutionSource) -> Self {
        Self {
            name: name.into(),
            valid: true,
            source,
        }
    }

    /// The terminal fallback.
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_KNOT.to_string(),
            valid: false,
            source: ResolutionSource::Unresolved,
        }
    }
}

/// Knot whose structural prefix the path starts with.
///
/// The head component is checked first; the dotted string form covers
/// runtimes that report a nested position as one flattened component.
pub fn structural_owner<'a>(index: &'a KnotIndex, path: &StoryPath) -> Option<&'a str> {
    if let Some(name) = path.head().and_then(|c| c.as_name()) {
        if let Some(knot) = index.get(name) {
            return Some(knot.name.as_str());
        }
    }

    let serialized = path.to_string();
    index
        .names()
        .filter(|name| {
            serialized
                .strip_prefix(name)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
        .max_by_key(|name| name.len())
}

/// Resolve the knot that owns `position`.
pub fn resolve(
    index: &KnotIndex,
    position: Option<&StoryPath>,
    native_guess: Option<&str>,
    sticky: Option<&str>,
) -> ResolvedKnot {
    if let Some(name) = position.and_then(|path| structural_owner(index, path)) {
        return ResolvedKnot::known(name, ResolutionSource::Structural);
    }

    if let Some(guess) = native_guess {
        if !guess.is_empty() && guess != UNKNOWN_KNOT && index.contains(guess) {
            return ResolvedKnot::known(guess, ResolutionSource::Native);
        }
        debug!(guess, "Rejected native knot guess");
    }

    match sticky {
        Some(name) => ResolvedKnot {
            name: name.to_string(),
            valid: index.contains(name),
            source: ResolutionSource::Sticky,
        },
        None => ResolvedKnot::unknown(),
    }
}
