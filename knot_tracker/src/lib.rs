//! # Knot Tracker
//!
//! Works out which knot a running story is in and groups the story's output
//! by knot, even across direct jumps where the runtime's own position lags
//! behind the text it emits.
//!
//! ## Core Components
//!
//! - **knot_index**: named top-level sections of a document, built once
//! - **resolver**: position -> owning knot, with a fallback chain
//! - **attribution**: per-session state machine producing records, content
//!   groups and transition events
//!
//! ## Sessions
//!
//! Each session owns its interpreter and attribution state. Sessions over
//! the same document share one immutable `KnotIndex` behind an `Arc`.

pub mod attribution;
pub mod knot_index;
pub mod resolver;

pub use attribution::*;
pub use knot_index::*;
pub use resolver::*;

use std::sync::Arc;

use story_model::{DocumentWalker, StoryDocument};

/// Open a session over `document` using the bundled reference interpreter.
pub fn create_session(
    document: Arc<StoryDocument>,
) -> Result<AttributionSession<DocumentWalker>, SessionError> {
    create_session_with_config(document, SessionConfig::default())
}

/// Like [`create_session`], with explicit configuration.
pub fn create_session_with_config(
    document: Arc<StoryDocument>,
    config: SessionConfig,
) -> Result<AttributionSession<DocumentWalker>, SessionError> {
    let index = Arc::new(KnotIndex::build(&document)?);
    create_session_with_index(document, index, config)
}

/// Open a session that reuses an index built earlier for the same document.
pub fn create_session_with_index(
    document: Arc<StoryDocument>,
    index: Arc<KnotIndex>,
    config: SessionConfig,
) -> Result<AttributionSession<DocumentWalker>, SessionError> {
    let walker = DocumentWalker::with_config(document, config.walker.clone())?;
    Ok(AttributionSession::new(walker, index, config))
}
