//! Attribution Engine - drives an interpreter and groups its output by knot.
//!
//! Each step is bracketed by two resolutions:
//! 1. **Before**: resolve the position the step starts from
//! 2. **Step**: run one unit of continuation
//! 3. **After**: resolve the position the step landed on
//! 4. **Transition**: both readings valid and different
//! 5. **Ownership**: decided by [`content_owner`]
//! 6. **Flush**: a transition closes the open group; so do choices and the
//!    end of the story

mod config;
mod policy;
mod record;

pub use config::*;
pub use policy::*;
pub use record::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use story_model::{Choice, DocumentError, RuntimeError, StoryInterpreter};

use crate::knot_index::{IndexError, KnotIndex};
use crate::resolver::{resolve, ResolvedKnot, UNKNOWN_KNOT};

/// Errors surfaced by a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("interpreter fault: {0}")]
    Runtime(RuntimeError),

    #[error("choice index {index} is out of range ({available} choices available)")]
    InvalidChoiceIndex { index: usize, available: usize },

    #[error("story has finished")]
    Finished,

    #[error("story is waiting for a choice")]
    AwaitingChoice,

    #[error("session stopped after an interpreter fault: {0}")]
    Poisoned(RuntimeError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Unique identifier for sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Finished,
}

/// Steps not yet closed into a group. `knot` is `None` while attribution
/// is still pending.
#[derive(Debug, Clone, Default)]
struct OpenBuffer {
    knot: Option<String>,
    records: Vec<AttributionRecord>,
}

/// One story run with its own interpreter and attribution state.
pub struct AttributionSession<I: StoryInterpreter> {
    id: SessionId,
    interpreter: I,
    index: Arc<KnotIndex>,
    config: SessionConfig,
    state: SessionState,

    /// Last knot that resolved validly.
    sticky: Option<String>,
    buffer: OpenBuffer,

    /// Every step, in order.
    records: Vec<AttributionRecord>,
    /// Closed groups, in order.
    history: Vec<ContentGroup>,
    transitions: Vec<KnotTransition>,
    fault: Option<RuntimeError>,
}

impl<I: StoryInterpreter> AttributionSession<I> {
    /// Wrap an interpreter positioned at the start of its story.
    pub fn new(interpreter: I, index: Arc<KnotIndex>, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            interpreter,
            index,
            config,
            state: SessionState::Idle,
            sticky: None,
            buffer: OpenBuffer::default(),
            records: Vec::new(),
            history: Vec::new(),
            transitions: Vec::new(),
            fault: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<KnotIndex> {
        &self.index
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }

    /// Known knot names in declaration order.
    pub fn knot_names(&self) -> Vec<&str> {
        self.index.names().collect()
    }

    /// Last knot that resolved, if any has.
    pub fn current_knot(&self) -> Option<&str> {
        self.sticky.as_deref()
    }

    /// Completed content groups.
    pub fn history(&self) -> &[ContentGroup] {
        &self.history
    }

    /// Per-step log.
    pub fn records(&self) -> &[AttributionRecord] {
        &self.records
    }

    pub fn transitions(&self) -> &[KnotTransition] {
        &self.transitions
    }

    pub fn pending_choices(&self) -> Vec<Choice> {
        self.interpreter.pending_choices()
    }

    /// Text of steps not yet closed into a group.
    pub fn open_buffer_text(&self) -> String {
        self.buffer.records.iter().map(|r| r.text.as_str()).collect()
    }

    /// Owner of the open buffer, `None` while attribution is pending.
    pub fn open_buffer_knot(&self) -> Option<&str> {
        self.buffer.knot.as_deref()
    }

    /// The fault that stopped this session, if any.
    pub fn fault(&self) -> Option<&RuntimeError> {
        self.fault.as_ref()
    }

    fn ensure_usable(&self) -> Result<(), SessionError> {
        if let Some(fault) = &self.fault {
            return Err(SessionError::Poisoned(fault.clone()));
        }
        if self.state == SessionState::Finished {
            return Err(SessionError::Finished);
        }
        Ok(())
    }

    /// Run one interpreter step and attribute its text.
    pub fn step(&mut self) -> Result<AttributionRecord, SessionError> {
        self.ensure_usable()?;

        if !self.interpreter.can_continue() {
            if !self.interpreter.pending_choices().is_empty() {
                return Err(SessionError::AwaitingChoice);
            }
            self.close_if_stopped();
            return Err(SessionError::Finished);
        }

        if self.state == SessionState::Idle {
            self.state = SessionState::Running;
            info!(session = %self.id, knots = self.index.len(), "Session started");
        }

        let step = self.records.len();
        let before = self.resolve_position();

        let text = match self.interpreter.step() {
            Ok(text) => text,
            Err(error) => {
                warn!(session = %self.id, step, %error, "Interpreter fault, session stopped");
                self.fault = Some(error.clone());
                return Err(SessionError::Runtime(error));
            }
        };

        let after = self.resolve_position();
        let knot_changed = before.valid && after.valid && before.name != after.name;
        let owner = content_owner(self.config.policy, &before, &after)
            .or_else(|| self.buffer.knot.clone());

        debug!(
            session = %self.id,
            step,
            before = %before.name,
            after = %after.name,
            owner = owner.as_deref().unwrap_or(UNKNOWN_KNOT),
            "Step attributed"
        );

        let record = AttributionRecord {
            step,
            text,
            owner_knot: owner.clone().unwrap_or_else(|| UNKNOWN_KNOT.to_string()),
            knot_changed,
            before: before.clone(),
            after: after.clone(),
        };

        if knot_changed {
            info!(
                session = %self.id,
                from = %before.name,
                to = %after.name,
                step,
                "Knot transition"
            );

            // Content still held under another owner closes under that
            // owner, so the transition group only carries `before`'s steps.
            self.assign_owner(Some(&before.name));

            let departing_owns = owner.as_deref() == Some(before.name.as_str());
            if departing_owns {
                self.buffer.records.push(record.clone());
            }

            let flushed = self.flush(&before.name, FlushReason::Transition, Vec::new());
            self.transitions.push(KnotTransition {
                from: before.name.clone(),
                to: after.name.clone(),
                step,
                flushed,
            });
            self.buffer.knot = Some(after.name.clone());

            if !departing_owns {
                self.buffer.records.push(record.clone());
            }
        } else {
            self.assign_owner(owner.as_deref());
            self.buffer.records.push(record.clone());
        }

        self.records.push(record.clone());
        self.close_if_stopped();
        Ok(record)
    }

    /// Step until choices are offered or the story ends.
    pub fn run_until_choice(&mut self) -> Result<Vec<AttributionRecord>, SessionError> {
        self.ensure_usable()?;

        let mut produced = Vec::new();
        while self.state != SessionState::Finished && self.interpreter.can_continue() {
            produced.push(self.step()?);
        }
        Ok(produced)
    }

    /// Take one of the pending choices. Attribution happens on the next
    /// `step`.
    pub fn commit_choice(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_usable()?;

        let available = self.interpreter.pending_choices().len();
        if index >= available {
            return Err(SessionError::InvalidChoiceIndex { index, available });
        }

        match self.interpreter.select_choice(index) {
            Ok(()) => {
                debug!(session = %self.id, index, "Choice committed");
                Ok(())
            }
            Err(RuntimeError::InvalidChoiceIndex { index, available }) => {
                Err(SessionError::InvalidChoiceIndex { index, available })
            }
            Err(error) => {
                warn!(session = %self.id, %error, "Interpreter fault on choice, session stopped");
                self.fault = Some(error.clone());
                Err(SessionError::Runtime(error))
            }
        }
    }

    fn resolve_position(&mut self) -> ResolvedKnot {
        let position = self.interpreter.current_position();
        let guess = if self.config.trust_native_guess {
            self.interpreter.native_knot_guess()
        } else {
            None
        };

        let resolved = resolve(
            &self.index,
            position.as_ref(),
            guess.as_deref(),
            self.sticky.as_deref(),
        );
        if resolved.valid && self.sticky.as_deref() != Some(resolved.name.as_str()) {
            self.sticky = Some(resolved.name.clone());
        }
        resolved
    }

    /// Point the open buffer at `owner`. Pending or empty buffers are simply
    /// retagged; a buffer already holding another knot's steps is closed.
    fn assign_owner(&mut self, owner: Option<&str>) {
        let Some(owner) = owner else {
            return;
        };

        let current = self.buffer.knot.clone();
        match current.as_deref() {
            Some(current) if current == owner => {}
            None => {
                if !self.buffer.records.is_empty() {
                    debug!(
                        session = %self.id,
                        knot = owner,
                        steps = self.buffer.records.len(),
                        "Pending content adopted"
                    );
                }
                self.buffer.knot = Some(owner.to_string());
            }
            Some(current) => {
                self.flush(current, FlushReason::OwnerChanged, Vec::new());
                self.buffer.knot = Some(owner.to_string());
            }
        }
    }

    /// Close the open buffer as a group tagged `knot`. Empty buffers produce
    /// no group.
    fn flush(&mut self, knot: &str, reason: FlushReason, choices: Vec<Choice>) -> bool {
        if self.buffer.records.is_empty() {
            return false;
        }

        let records = std::mem::take(&mut self.buffer.records);
        debug!(
            session = %self.id,
            knot,
            steps = records.len(),
            ?reason,
            "Content group closed"
        );

        self.history.push(ContentGroup {
            knot: knot.to_string(),
            records,
            choices,
            reason,
        });
        true
    }

    /// Close the open group if the interpreter stopped for choices or for
    /// good.
    fn close_if_stopped(&mut self) {
        if self.interpreter.can_continue() {
            return;
        }

        let knot = self
            .buffer
            .knot
            .clone()
            .unwrap_or_else(|| UNKNOWN_KNOT.to_string());
        let choices = self.interpreter.pending_choices();

        if choices.is_empty() {
            self.flush(&knot, FlushReason::Finished, Vec::new());
            self.state = SessionState::Finished;
            info!(session = %self.id, groups = self.history.len(), "Session finished");
        } else if !self.flush(&knot, FlushReason::Choices, choices.clone()) {
            // The step that reached the choices also closed the buffer.
            if let Some(last) = self.history.last_mut() {
                debug!(
                    session = %self.id,
                    knot = %last.knot,
                    choices = choices.len(),
                    "Choices attached to closed group"
                );
                last.choices = choices;
            }
        }
    }
}
