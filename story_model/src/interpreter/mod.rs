//! The story interpreter capability.
//!
//! Attribution code drives any runtime through [`StoryInterpreter`]; the
//! bundled [`DocumentWalker`] is one implementation over [`StoryDocument`].
//!
//! [`StoryDocument`]: crate::document::StoryDocument

mod walker;

pub use walker::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::StoryPath;

/// Errors reported by an interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("runtime fault: {0}")]
    Fault(String),

    #[error("choice index {index} is out of range ({available} choices available)")]
    InvalidChoiceIndex { index: usize, available: usize },
}

/// A choice currently offered to the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Position in the live choice list.
    pub index: usize,
    pub text: String,
    /// Where execution continues once the choice is taken.
    pub target: StoryPath,
}

/// What the attribution engine needs from a running story.
///
/// Implementations are stepped strictly one call at a time; none of these
/// methods may be invoked concurrently on the same instance.
pub trait StoryInterpreter {
    /// Where the interpreter currently points. `None` before the story has
    /// a position or after it has finished.
    fn current_position(&self) -> Option<StoryPath>;

    /// Whether another `step` would make progress.
    fn can_continue(&self) -> bool;

    /// Run one unit of continuation and return the text it produced.
    fn step(&mut self) -> Result<String, RuntimeError>;

    /// Choices currently waiting for a decision, in display order.
    fn pending_choices(&self) -> Vec<Choice>;

    /// Commit to one of the pending choices.
    fn select_choice(&mut self, index: usize) -> Result<(), RuntimeError>;

    /// The runtime's own idea of the current section, if it has one. May
    /// name internal containers.
    fn native_knot_guess(&self) -> Option<String> {
        None
    }
}
