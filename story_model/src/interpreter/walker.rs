//! Reference interpreter that executes a compiled document directly.
//!
//! Covers the structural subset of the compiled format: text, newlines,
//! nested containers, diverts, tunnels and function calls, choice points
//! with string-built labels, `done` and `end`. Expression evaluation is not
//! performed, so conditional and variable diverts fault.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Choice, RuntimeError, StoryInterpreter};
use crate::document::{ContentItem, ControlCommand, DivertKind, DocumentError, StoryDocument};
use crate::path::{PathComponent, StoryPath};

/// Configuration for [`DocumentWalker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Instructions one `step` may execute before it is treated as a loop.
    pub max_instructions_per_step: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_instructions_per_step: 10_000,
        }
    }
}

impl WalkerConfig {
    /// Parse from TOML; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Lifecycle of a walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkerState {
    Running,
    AwaitingChoice,
    Finished,
}

/// Next item to execute: content index `index` of the container at
/// `container`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pointer {
    container: StoryPath,
    index: usize,
}

impl Pointer {
    fn path(&self) -> StoryPath {
        self.container.join(PathComponent::Index(self.index))
    }

    fn advanced(&self) -> Self {
        Self {
            container: self.container.clone(),
            index: self.index + 1,
        }
    }
}

enum Flow {
    Next,
    LineComplete,
    Stopped,
}

/// Walks a [`StoryDocument`] one line at a time.
#[derive(Debug, Clone)]
pub struct DocumentWalker {
    document: Arc<StoryDocument>,
    config: WalkerConfig,
    pointer: Option<Pointer>,
    /// Where execution stopped for good; only set once finished.
    final_pointer: Option<Pointer>,
    call_stack: Vec<Pointer>,
    choices: Vec<Choice>,
    state: WalkerState,
    in_string: bool,
    label: String,
}

impl DocumentWalker {
    /// Start at the beginning of the root container.
    pub fn new(document: Arc<StoryDocument>) -> Result<Self, DocumentError> {
        Self::with_config(document, WalkerConfig::default())
    }

    pub fn with_config(
        document: Arc<StoryDocument>,
        config: WalkerConfig,
    ) -> Result<Self, DocumentError> {
        if document.root_container().is_none() {
            return Err(DocumentError::Malformed(
                "root node is not a container".to_string(),
            ));
        }

        Ok(Self {
            document,
            config,
            pointer: Some(Pointer {
                container: StoryPath::root(),
                index: 0,
            }),
            final_pointer: None,
            call_stack: Vec::new(),
            choices: Vec::new(),
            state: WalkerState::Running,
            in_string: false,
            label: String::new(),
        })
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    pub fn document(&self) -> &Arc<StoryDocument> {
        &self.document
    }

    /// Item under the pointer, climbing out of exhausted content
    /// containers. `None` means the flow ran out of content.
    fn current<'a>(
        &mut self,
        document: &'a StoryDocument,
    ) -> Result<Option<&'a ContentItem>, RuntimeError> {
        loop {
            let Some(pointer) = self.pointer.as_ref() else {
                return Ok(None);
            };

            let container = document
                .container_at(&pointer.container)
                .map_err(|e| RuntimeError::Fault(e.to_string()))?;
            if let Some(item) = container.content().get(pointer.index) {
                return Ok(Some(item));
            }

            // Exhausted: only containers that sit in a content list have a
            // successor to fall through to.
            match pointer.container.last() {
                Some(PathComponent::Index(position)) => {
                    let position = *position;
                    let parent = pointer.container.parent().unwrap_or_default();
                    self.pointer = Some(Pointer {
                        container: parent,
                        index: position + 1,
                    });
                }
                _ => return Ok(None),
            }
        }
    }

    fn advance(&mut self) {
        if let Some(pointer) = self.pointer.as_mut() {
            pointer.index += 1;
        }
    }

    /// Turn a resolved target path into a pointer, rewriting names of
    /// in-content containers to their indices.
    fn pointer_for(
        &self,
        document: &StoryDocument,
        target: &StoryPath,
    ) -> Result<Pointer, RuntimeError> {
        let unknown = || RuntimeError::Fault(format!("divert target '{}' not found", target));

        let mut current = document.root_container().ok_or_else(unknown)?;
        let mut canonical = Vec::with_capacity(target.len());
        let components = target.components();

        for (position, component) in components.iter().enumerate() {
            let is_last = position + 1 == components.len();
            match component {
                PathComponent::Name(name) => {
                    if let Some(child) = current
                        .named_children()
                        .iter()
                        .find(|c| c.name() == Some(name.as_str()))
                    {
                        canonical.push(PathComponent::Name(name.clone()));
                        current = child;
                    } else {
                        let (index, child) = current
                            .content()
                            .iter()
                            .enumerate()
                            .find_map(|(i, item)| {
                                item.as_container()
                                    .filter(|c| c.name() == Some(name.as_str()))
                                    .map(|c| (i, c))
                            })
                            .ok_or_else(unknown)?;
                        canonical.push(PathComponent::Index(index));
                        current = child;
                    }
                }
                PathComponent::Index(index) => match current.content().get(*index) {
                    Some(ContentItem::Container(child)) => {
                        canonical.push(PathComponent::Index(*index));
                        current = child;
                    }
                    Some(_) if is_last => {
                        return Ok(Pointer {
                            container: StoryPath::from_components(canonical),
                            index: *index,
                        });
                    }
                    _ => return Err(unknown()),
                },
                PathComponent::Parent => return Err(unknown()),
            }
        }

        Ok(Pointer {
            container: StoryPath::from_components(canonical),
            index: 0,
        })
    }

    fn jump(
        &self,
        document: &StoryDocument,
        item_path: &StoryPath,
        target: &StoryPath,
    ) -> Result<Pointer, RuntimeError> {
        let resolved = target.resolve_from(item_path).ok_or_else(|| {
            RuntimeError::Fault(format!(
                "relative target '{}' climbs above the root from '{}'",
                target, item_path
            ))
        })?;
        self.pointer_for(document, &resolved)
    }

    /// The flow ran out of content or hit `done`.
    fn stop(&mut self) {
        if self.choices.is_empty() {
            self.finish();
        } else {
            self.state = WalkerState::AwaitingChoice;
            debug!(choices = self.choices.len(), "Waiting for a choice");
        }
    }

    fn finish(&mut self) {
        self.state = WalkerState::Finished;
        self.final_pointer = self.pointer.take();
        self.choices.clear();
        self.call_stack.clear();
    }

    /// Items that can run after a completed line without moving the
    /// position out of the current section or producing visible text.
    fn is_quiet(&self, item: &ContentItem) -> bool {
        match item {
            ContentItem::Text(_) | ContentItem::Newline => self.in_string,
            ContentItem::Divert(_) => false,
            ContentItem::Control(
                ControlCommand::TunnelReturn | ControlCommand::FunctionReturn | ControlCommand::End,
            ) => false,
            ContentItem::Control(ControlCommand::Done) => !self.choices.is_empty(),
            ContentItem::ChoicePoint(_)
            | ContentItem::Control(_)
            | ContentItem::Container(_)
            | ContentItem::Value(_) => true,
        }
    }

    fn execute(
        &mut self,
        document: &StoryDocument,
        item: &ContentItem,
        output: &mut String,
    ) -> Result<Flow, RuntimeError> {
        let Some(pointer) = self.pointer.clone() else {
            return Ok(Flow::Stopped);
        };
        let item_path = pointer.path();

        match item {
            ContentItem::Text(text) => {
                if self.in_string {
                    self.label.push_str(text);
                } else {
                    output.push_str(text);
                }
                self.advance();
            }
            ContentItem::Newline => {
                self.advance();
                if !self.in_string && !output.is_empty() {
                    output.push('\n');
                    return Ok(Flow::LineComplete);
                }
            }
            ContentItem::Divert(divert) => {
                if divert.conditional || divert.variable {
                    return Err(RuntimeError::Fault(format!(
                        "divert at '{}' needs expression evaluation",
                        item_path
                    )));
                }
                let next = self.jump(document, &item_path, &divert.target)?;
                if divert.kind != DivertKind::Jump {
                    self.call_stack.push(pointer.advanced());
                }
                self.pointer = Some(next);
            }
            ContentItem::ChoicePoint(choice) => {
                let target = self.jump(document, &item_path, &choice.target)?;
                let text = self.label.trim().to_string();
                self.label.clear();
                self.choices.push(Choice {
                    index: self.choices.len(),
                    text,
                    target: target.container.join(PathComponent::Index(target.index)),
                });
                self.advance();
            }
            ContentItem::Control(command) => match command {
                ControlCommand::StringStart => {
                    self.in_string = true;
                    self.label.clear();
                    self.advance();
                }
                ControlCommand::StringEnd => {
                    self.in_string = false;
                    self.advance();
                }
                ControlCommand::Done => {
                    self.stop();
                    return Ok(Flow::Stopped);
                }
                ControlCommand::End => {
                    self.finish();
                    return Ok(Flow::Stopped);
                }
                ControlCommand::TunnelReturn | ControlCommand::FunctionReturn => {
                    let back = self.call_stack.pop().ok_or_else(|| {
                        RuntimeError::Fault(format!(
                            "return at '{}' with an empty call stack",
                            item_path
                        ))
                    })?;
                    self.pointer = Some(back);
                }
                _ => self.advance(),
            },
            ContentItem::Container(_) => {
                self.pointer = Some(Pointer {
                    container: item_path,
                    index: 0,
                });
            }
            ContentItem::Value(_) => self.advance(),
        }

        Ok(Flow::Next)
    }

    fn tick(&self, budget: &mut usize) -> Result<(), RuntimeError> {
        if *budget == 0 {
            warn!(
                limit = self.config.max_instructions_per_step,
                "Instruction budget exhausted"
            );
            return Err(RuntimeError::Fault(format!(
                "no output after {} instructions",
                self.config.max_instructions_per_step
            )));
        }
        *budget -= 1;
        Ok(())
    }
}

impl StoryInterpreter for DocumentWalker {
    fn current_position(&self) -> Option<StoryPath> {
        self.pointer.as_ref().map(Pointer::path)
    }

    fn can_continue(&self) -> bool {
        self.state == WalkerState::Running && self.pointer.is_some()
    }

    fn step(&mut self) -> Result<String, RuntimeError> {
        if !self.can_continue() {
            return Err(RuntimeError::Fault("story cannot continue".to_string()));
        }

        let document = Arc::clone(&self.document);
        let mut budget = self.config.max_instructions_per_step;
        let mut output = String::new();

        loop {
            self.tick(&mut budget)?;
            let Some(item) = self.current(&document)? else {
                self.stop();
                return Ok(output);
            };
            match self.execute(&document, item, &mut output)? {
                Flow::Next => {}
                Flow::LineComplete => break,
                Flow::Stopped => return Ok(output),
            }
        }

        // Run ahead through choice setup so the caller sees the choices as
        // soon as the last line before them is out.
        loop {
            self.tick(&mut budget)?;
            let Some(item) = self.current(&document)? else {
                if !self.choices.is_empty() {
                    self.stop();
                }
                break;
            };
            if !self.is_quiet(item) {
                break;
            }
            if let Flow::Stopped = self.execute(&document, item, &mut output)? {
                break;
            }
        }

        Ok(output)
    }

    fn pending_choices(&self) -> Vec<Choice> {
        self.choices.clone()
    }

    fn select_choice(&mut self, index: usize) -> Result<(), RuntimeError> {
        let choice = self
            .choices
            .get(index)
            .cloned()
            .ok_or(RuntimeError::InvalidChoiceIndex {
                index,
                available: self.choices.len(),
            })?;

        let document = Arc::clone(&self.document);
        let pointer = self.pointer_for(&document, &choice.target)?;

        debug!(index, target = %choice.target, "Choice selected");
        self.pointer = Some(pointer);
        self.choices.clear();
        self.state = WalkerState::Running;
        Ok(())
    }

    /// Innermost named container on the current path. Once finished, the
    /// container execution stopped in.
    fn native_knot_guess(&self) -> Option<String> {
        let pointer = self.pointer.as_ref().or(self.final_pointer.as_ref())?;
        let mut current = self.document.root_container()?;
        let mut guess = None;

        for component in pointer.container.components() {
            current = current.child(component)?;
            if let Some(name) = current.name() {
                guess = Some(name.to_string());
            }
        }

        guess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::document_from_value;
    use serde_json::{json, Value};

    fn walker(story: Value) -> DocumentWalker {
        let doc = document_from_value(&story).unwrap();
        DocumentWalker::new(Arc::new(doc)).unwrap()
    }

    fn run_to_end(walker: &mut DocumentWalker) -> String {
        let mut text = String::new();
        while walker.can_continue() {
            text.push_str(&walker.step().unwrap());
        }
        text
    }

    #[test]
    fn test_lines_and_direct_jump() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [
                {"->": "start"},
                "done",
                {
                    "start": ["^Hello", "\n", "^Still here", "\n", {"->": "reaction"}, {"#f": 1}],
                    "reaction": ["^Reacting", "\n", "end", {"#f": 1}]
                }
            ]
        }));

        assert_eq!(walker.current_position().unwrap().to_string(), "0");

        assert_eq!(walker.step().unwrap(), "Hello\n");
        assert_eq!(walker.current_position().unwrap().to_string(), "start.2");
        assert_eq!(walker.native_knot_guess().as_deref(), Some("start"));

        assert_eq!(walker.step().unwrap(), "Still here\n");
        assert_eq!(walker.current_position().unwrap().to_string(), "start.4");

        assert_eq!(walker.step().unwrap(), "Reacting\n");
        assert_eq!(walker.current_position().unwrap().to_string(), "reaction.2");

        assert_eq!(walker.step().unwrap(), "");
        assert_eq!(walker.state(), WalkerState::Finished);
        assert!(walker.current_position().is_none());
        assert!(!walker.can_continue());
        assert!(walker.step().is_err());
    }

    #[test]
    fn test_finished_walker_reports_last_knot() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [
                {"->": "start"},
                "done",
                {
                    "start": ["^Walking.", "\n", {"->": "reaction"}, {"#f": 1}],
                    "reaction": ["^You flinch.", "end", {"#f": 1}]
                }
            ]
        }));

        assert_eq!(walker.step().unwrap(), "Walking.\n");
        assert_eq!(walker.step().unwrap(), "You flinch.");
        assert_eq!(walker.state(), WalkerState::Finished);
        assert!(walker.current_position().is_none());
        assert_eq!(walker.native_knot_guess().as_deref(), Some("reaction"));
    }

    #[test]
    fn test_choices_are_presented_after_last_line() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [
                {"->": "start"},
                "done",
                {
                    "start": [
                        "^Pick one", "\n",
                        "ev", "str", "^Go left", "/str", "/ev",
                        {"*": ".^.c-0", "flg": 20},
                        "ev", "str", "^Go right", "/str", "/ev",
                        {"*": ".^.c-1", "flg": 20},
                        "done",
                        {
                            "c-0": ["\n", {"->": "left"}, {"#f": 5}],
                            "c-1": ["\n", {"->": "right"}, {"#f": 5}],
                            "#f": 1
                        }
                    ],
                    "left": ["^Went left", "\n", "end", null],
                    "right": ["^Went right", "\n", "end", null]
                }
            ]
        }));

        assert_eq!(walker.step().unwrap(), "Pick one\n");
        assert_eq!(walker.state(), WalkerState::AwaitingChoice);
        assert!(!walker.can_continue());

        let choices = walker.pending_choices();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].text, "Go left");
        assert_eq!(choices[1].text, "Go right");
        assert_eq!(choices[1].index, 1);
        assert_eq!(choices[1].target.to_string(), "start.c-1.0");
        assert!(walker
            .current_position()
            .unwrap()
            .starts_with(&StoryPath::parse("start")));

        assert_eq!(
            walker.select_choice(2),
            Err(RuntimeError::InvalidChoiceIndex {
                index: 2,
                available: 2
            })
        );

        walker.select_choice(1).unwrap();
        assert!(walker.pending_choices().is_empty());
        assert_eq!(
            walker.current_position().unwrap().to_string(),
            "start.c-1.0"
        );
        assert_eq!(walker.native_knot_guess().as_deref(), Some("c-1"));

        assert_eq!(walker.step().unwrap(), "Went right\n");
        assert_eq!(run_to_end(&mut walker), "");
        assert_eq!(walker.state(), WalkerState::Finished);
    }

    #[test]
    fn test_nested_containers_fall_through() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [
                [["^a", "\n", null], "^b", "\n", null],
                "^c", "\n",
                "end",
                null
            ]
        }));

        assert_eq!(walker.step().unwrap(), "a\n");
        assert_eq!(walker.step().unwrap(), "b\n");
        assert_eq!(walker.step().unwrap(), "c\n");
        assert_eq!(run_to_end(&mut walker), "");
    }

    #[test]
    fn test_tunnel_returns() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [
                {"->t->": "aside"},
                "^back", "\n",
                "end",
                {
                    "aside": ["^inside", "\n", "->->", null]
                }
            ]
        }));

        assert_eq!(walker.step().unwrap(), "inside\n");
        assert_eq!(walker.native_knot_guess().as_deref(), Some("aside"));
        assert_eq!(walker.step().unwrap(), "back\n");
    }

    #[test]
    fn test_divert_to_named_content_container() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [
                {"->": "g-0"},
                ["^skipped", "\n", null],
                ["^gathered", "\n", {"#n": "g-0"}],
                "^after", "\n",
                "end",
                null
            ]
        }));

        assert_eq!(walker.step().unwrap(), "gathered\n");
        assert_eq!(walker.current_position().unwrap().to_string(), "3");
        assert_eq!(walker.step().unwrap(), "after\n");
    }

    #[test]
    fn test_unknown_divert_target_faults() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [{"->": "0.nowhere"}, "end", null]
        }));
        assert!(matches!(walker.step(), Err(RuntimeError::Fault(_))));
    }

    #[test]
    fn test_conditional_divert_faults() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": [{"->": "x", "c": true}, "end", {"x": ["end", null]}]
        }));
        assert!(matches!(walker.step(), Err(RuntimeError::Fault(_))));
    }

    #[test]
    fn test_divert_loop_hits_budget() {
        let doc = document_from_value(&json!({
            "inkVersion": 21,
            "root": [{"->": "loop"}, {"loop": [{"->": "loop"}, null]}]
        }))
        .unwrap();
        let config = WalkerConfig {
            max_instructions_per_step: 50,
        };
        let mut walker = DocumentWalker::with_config(Arc::new(doc), config).unwrap();
        assert!(matches!(walker.step(), Err(RuntimeError::Fault(_))));
    }

    #[test]
    fn test_out_of_content_finishes() {
        let mut walker = walker(json!({
            "inkVersion": 21,
            "root": ["^only line", null]
        }));
        assert_eq!(walker.step().unwrap(), "only line");
        assert_eq!(walker.state(), WalkerState::Finished);
    }

    #[test]
    fn test_rejects_non_container_root() {
        let doc = document_from_value(&json!({"inkVersion": 21, "root": "done"})).unwrap();
        assert!(DocumentWalker::new(Arc::new(doc)).is_err());
    }

    #[test]
    fn test_walker_config_from_toml() {
        let config = WalkerConfig::from_toml_str("max_instructions_per_step = 64").unwrap();
        assert_eq!(config.max_instructions_per_step, 64);

        let defaults = WalkerConfig::from_toml_str("").unwrap();
        assert_eq!(defaults.max_instructions_per_step, 10_000);
    }
}
