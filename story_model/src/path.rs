//! Structural paths into the compiled story tree.
//!
//! A path is a dot-separated list of components. Components are either
//! container names (`start`, `c-0`), content indices (`3`) or the parent
//! marker `^`. A leading `.` makes the path relative to the object it was
//! written on.

use serde::{Deserialize, Serialize};

/// One step of a [`StoryPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathComponent {
    /// A named container.
    Name(String),
    /// A position in a container's content list.
    Index(usize),
    /// Move up to the enclosing container (`^`).
    Parent,
}

impl PathComponent {
    /// Parse a single component.
    pub fn parse(raw: &str) -> Self {
        if raw == "^" {
            PathComponent::Parent
        } else if let Ok(index) = raw.parse::<usize>() {
            PathComponent::Index(index)
        } else {
            PathComponent::Name(raw.to_string())
        }
    }

    /// The name, if this component is a name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            PathComponent::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for PathComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathComponent::Name(name) => write!(f, "{}", name),
            PathComponent::Index(index) => write!(f, "{}", index),
            PathComponent::Parent => write!(f, "^"),
        }
    }
}

/// A structural path, absolute (from the root) or relative.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StoryPath {
    components: Vec<PathComponent>,
    relative: bool,
}

impl StoryPath {
    /// The empty absolute path, which addresses the root container.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build an absolute path from components.
    pub fn from_components(components: Vec<PathComponent>) -> Self {
        Self {
            components,
            relative: false,
        }
    }

    /// Parse the dotted notation used in compiled documents.
    pub fn parse(raw: &str) -> Self {
        let (relative, body) = match raw.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let components = body
            .split('.')
            .filter(|part| !part.is_empty())
            .map(PathComponent::parse)
            .collect();

        Self {
            components,
            relative,
        }
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// First component, if any.
    pub fn head(&self) -> Option<&PathComponent> {
        self.components.first()
    }

    /// Last component, if any.
    pub fn last(&self) -> Option<&PathComponent> {
        self.components.last()
    }

    /// Append a component, returning the extended path.
    pub fn join(&self, component: PathComponent) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self {
            components,
            relative: self.relative,
        }
    }

    /// The path with its last component removed.
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Self {
            components,
            relative: self.relative,
        })
    }

    /// Resolve this path against `base` (the path of the object the path
    /// was written on). Absolute paths are returned unchanged.
    ///
    /// Returns `None` when a parent step climbs above the root.
    pub fn resolve_from(&self, base: &StoryPath) -> Option<StoryPath> {
        if !self.relative {
            return Some(self.clone());
        }

        let mut components = base.components.clone();
        for component in &self.components {
            match component {
                PathComponent::Parent => {
                    components.pop()?;
                }
                other => components.push(other.clone()),
            }
        }

        Some(StoryPath::from_components(components))
    }

    /// Whether `prefix` addresses this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &StoryPath) -> bool {
        self.components.starts_with(&prefix.components)
    }
}

impl std::fmt::Display for StoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.relative {
            write!(f, ".")?;
        }
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

impl From<&str> for StoryPath {
    fn from(raw: &str) -> Self {
        StoryPath::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let path = StoryPath::parse("start.0.c-1");
        assert!(!path.is_relative());
        assert_eq!(
            path.components(),
            &[
                PathComponent::Name("start".to_string()),
                PathComponent::Index(0),
                PathComponent::Name("c-1".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "start.0.c-1");
    }

    #[test]
    fn test_parse_relative() {
        let path = StoryPath::parse(".^.c-0");
        assert!(path.is_relative());
        assert_eq!(path.components()[0], PathComponent::Parent);
        assert_eq!(path.to_string(), ".^.c-0");
    }

    #[test]
    fn test_resolve_relative_against_item() {
        let base = StoryPath::parse("start.7");
        let target = StoryPath::parse(".^.c-0").resolve_from(&base).unwrap();
        assert_eq!(target.to_string(), "start.c-0");
    }

    #[test]
    fn test_resolve_climbs_above_root() {
        let base = StoryPath::parse("0");
        assert!(StoryPath::parse(".^.^.x").resolve_from(&base).is_none());
    }

    #[test]
    fn test_starts_with() {
        let path = StoryPath::parse("start.stitch.2");
        assert!(path.starts_with(&StoryPath::parse("start")));
        assert!(path.starts_with(&StoryPath::root()));
        assert!(!path.starts_with(&StoryPath::parse("starting")));
    }

    #[test]
    fn test_join_and_parent() {
        let path = StoryPath::parse("start").join(PathComponent::Index(4));
        assert_eq!(path.to_string(), "start.4");
        assert_eq!(path.parent().unwrap().to_string(), "start");
        assert!(StoryPath::root().parent().is_none());
    }
}
