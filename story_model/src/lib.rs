//! # Story Model
//!
//! The compiled story as data, plus the boundary to whatever runtime executes
//! it. This crate holds no attribution logic.
//!
//! - **document**: immutable container tree loaded from compiled JSON
//! - **path**: structural paths into that tree
//! - **interpreter**: the `StoryInterpreter` capability and `DocumentWalker`,
//!   a reference runtime for the structural subset of the format

pub mod document;
pub mod interpreter;
pub mod path;

pub use document::*;
pub use interpreter::*;
pub use path::*;
