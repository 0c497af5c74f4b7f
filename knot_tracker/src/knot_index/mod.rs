//! Knot Index - static map of a story's named top-level sections.
//!
//! Built once per document and read-only afterwards, so one index can be
//! shared between any number of sessions behind an `Arc`.

mod synthetic;

pub use synthetic::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use story_model::{PathComponent, StoryDocument, StoryPath};

/// Errors raised while indexing a document.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("malformed story document: {0}")]
    MalformedDocument(String),

    #[error("knot '{0}' is declared more than once")]
    DuplicateKnot(String),
}

/// One named top-level section of the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnotDescriptor {
    pub name: String,
    /// Path prefix every position inside this knot starts with.
    pub structural_path: StoryPath,
    pub tracks_visits: bool,
    /// Author-named sub-sections of the knot, in declaration order.
    pub stitches: Vec<String>,
}

impl KnotDescriptor {
    /// Whether `path` lies inside this knot.
    pub fn contains(&self, path: &StoryPath) -> bool {
        path.starts_with(&self.structural_path)
    }
}

/// Name -> descriptor, enumerable in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnotIndex {
    knots: Vec<KnotDescriptor>,
    by_name: HashMap<String, usize>,
}

impl KnotIndex {
    /// Index every non-synthetic container directly under the root.
    pub fn build(document: &StoryDocument) -> Result<Self, IndexError> {
        let root = document.root_container().ok_or_else(|| {
            IndexError::MalformedDocument("root node is not a container".to_string())
        })?;

        let mut index = Self::default();

        for child in root.children() {
            let Some(name) = child.name() else {
                continue;
            };
            if is_synthetic_name(name) {
                continue;
            }
            if index.by_name.contains_key(name) {
                return Err(IndexError::DuplicateKnot(name.to_string()));
            }

            let stitches = child
                .named_children()
                .iter()
                .filter_map(|c| c.name())
                .filter(|n| !is_synthetic_name(n))
                .map(str::to_string)
                .collect();

            index.by_name.insert(name.to_string(), index.knots.len());
            index.knots.push(KnotDescriptor {
                name: name.to_string(),
                structural_path: StoryPath::from_components(vec![PathComponent::Name(
                    name.to_string(),
                )]),
                tracks_visits: child.visits_tracked(),
                stitches,
            });
        }

        debug!(knots = index.knots.len(), "Built knot index");
        Ok(index)
    }

    pub fn get(&self, name: &str) -> Option<&KnotDescriptor> {
        self.by_name.get(name).map(|&i| &self.knots[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Knot names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.knots.iter().map(|k| k.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnotDescriptor> {
        self.knots.iter()
    }

    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }
}

/// Shorthand for [`KnotIndex::build`].
pub fn build_index(document: &StoryDocument) -> Result<KnotIndex, IndexError> {
    KnotIndex::build(document)
}
