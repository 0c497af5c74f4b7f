//! Compiled story document model.
//!
//! The document is an immutable tree of containers. Each container holds an
//! ordered content list (text, diverts, choice points, control commands and
//! nested containers) plus a set of named sub-containers that are only
//! reachable by path (knots, stitches, choice branches, gathers).

mod loader;

pub use loader::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::{PathComponent, StoryPath};

/// Errors raised while loading or addressing a compiled document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to parse compiled story: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("malformed story document: {0}")]
    Malformed(String),

    #[error("unsupported ink version {found} (minimum supported is {minimum})")]
    UnsupportedVersion { found: u64, minimum: u64 },

    #[error("path '{0}' does not address a container")]
    UnknownPath(String),
}

/// Container flag bits as written under the `#f` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerFlags(pub u8);

impl ContainerFlags {
    pub const VISITS: u8 = 0x1;
    pub const TURNS: u8 = 0x2;
    pub const COUNT_START_ONLY: u8 = 0x4;

    pub fn visits(self) -> bool {
        self.0 & Self::VISITS != 0
    }

    pub fn turns(self) -> bool {
        self.0 & Self::TURNS != 0
    }

    pub fn count_start_only(self) -> bool {
        self.0 & Self::COUNT_START_ONLY != 0
    }
}

/// What a divert does with the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivertKind {
    /// Plain `->`: move the pointer.
    Jump,
    /// `->t->`: push a tunnel frame, then move.
    Tunnel,
    /// `f()`: push a function frame, then move.
    Function,
}

/// A jump to another point in the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divert {
    pub target: StoryPath,
    pub kind: DivertKind,
    /// Only taken when the evaluated condition is true.
    pub conditional: bool,
    /// Target is read from a variable rather than written literally.
    pub variable: bool,
}

/// A choice offered to the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoicePoint {
    pub target: StoryPath,
    pub flags: u32,
}

impl ChoicePoint {
    pub const HAS_CONDITION: u32 = 0x1;
    pub const ONCE_ONLY: u32 = 0x10;

    pub fn has_condition(&self) -> bool {
        self.flags & Self::HAS_CONDITION != 0
    }

    pub fn once_only(&self) -> bool {
        self.flags & Self::ONCE_ONLY != 0
    }
}

/// Bare-string control commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    EvalStart,
    EvalEnd,
    StringStart,
    StringEnd,
    Done,
    End,
    Pop,
    TunnelReturn,
    FunctionReturn,
    Glue,
    NoOp,
    Other(String),
}

impl ControlCommand {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ev" => ControlCommand::EvalStart,
            "/ev" => ControlCommand::EvalEnd,
            "str" => ControlCommand::StringStart,
            "/str" => ControlCommand::StringEnd,
            "done" => ControlCommand::Done,
            "end" => ControlCommand::End,
            "pop" => ControlCommand::Pop,
            "->->" => ControlCommand::TunnelReturn,
            "~ret" => ControlCommand::FunctionReturn,
            "<>" => ControlCommand::Glue,
            "nop" => ControlCommand::NoOp,
            other => ControlCommand::Other(other.to_string()),
        }
    }
}

/// One entry of a container's content list.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(String),
    Newline,
    Divert(Divert),
    ChoicePoint(ChoicePoint),
    Control(ControlCommand),
    Container(Container),
    /// Literal values and objects the model does not interpret.
    Value(serde_json::Value),
}

impl ContentItem {
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            ContentItem::Container(container) => Some(container),
            _ => None,
        }
    }
}

/// A node of the story tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    name: Option<String>,
    flags: ContainerFlags,
    content: Vec<ContentItem>,
    /// Named-only sub-containers in declaration order.
    named: Vec<Container>,
}

impl Container {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, flags: ContainerFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_content(mut self, item: ContentItem) -> Self {
        self.content.push(item);
        self
    }

    pub fn with_named(mut self, child: Container) -> Self {
        self.named.push(child);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn flags(&self) -> ContainerFlags {
        self.flags
    }

    pub fn visits_tracked(&self) -> bool {
        self.flags.visits()
    }

    pub fn content(&self) -> &[ContentItem] {
        &self.content
    }

    pub fn named_children(&self) -> &[Container] {
        &self.named
    }

    /// All child containers: those inside the content list first, then the
    /// named-only ones.
    pub fn children(&self) -> impl Iterator<Item = &Container> {
        self.content
            .iter()
            .filter_map(ContentItem::as_container)
            .chain(self.named.iter())
    }

    /// Look up a named child, named-only containers first.
    pub fn named_child(&self, name: &str) -> Option<&Container> {
        self.named
            .iter()
            .find(|c| c.name() == Some(name))
            .or_else(|| self.children().find(|c| c.name() == Some(name)))
    }

    /// Follow one path component to a child container.
    pub fn child(&self, component: &PathComponent) -> Option<&Container> {
        match component {
            PathComponent::Name(name) => self.named_child(name),
            PathComponent::Index(index) => self.content.get(*index)?.as_container(),
            PathComponent::Parent => None,
        }
    }
}

/// The compiled story. Immutable after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryDocument {
    ink_version: u64,
    root: ContentItem,
}

impl StoryDocument {
    /// Wrap an already-built tree.
    pub fn new(ink_version: u64, root: ContentItem) -> Self {
        Self { ink_version, root }
    }

    pub fn ink_version(&self) -> u64 {
        self.ink_version
    }

    /// The raw root node. It is a container in every well-formed document.
    pub fn root(&self) -> &ContentItem {
        &self.root
    }

    /// The root node as a container, if it is one.
    pub fn root_container(&self) -> Option<&Container> {
        self.root.as_container()
    }

    /// Container addressed by an absolute path.
    pub fn container_at(&self, path: &StoryPath) -> Result<&Container, DocumentError> {
        let unknown = || DocumentError::UnknownPath(path.to_string());

        if path.is_relative() {
            return Err(unknown());
        }

        let mut current = self.root_container().ok_or_else(|| {
            DocumentError::Malformed("root node is not a container".to_string())
        })?;
        for component in path.components() {
            current = current.child(component).ok_or_else(unknown)?;
        }
        Ok(current)
    }

    /// Content item addressed by an absolute path whose last component is
    /// an index.
    pub fn item_at(&self, path: &StoryPath) -> Option<&ContentItem> {
        let Some(PathComponent::Index(index)) = path.last() else {
            return None;
        };
        let container = self.container_at(&path.parent()?).ok()?;
        container.content().get(*index)
    }
}
