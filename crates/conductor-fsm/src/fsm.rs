// SPDX-License-Identifier: MIT

//! Generic finite state machine library.
//!
//! States carry `stable`/`terminal` flags and an optional `target` (the
//! stable state a transient state is heading toward), plus optional
//! `on_enter`/`on_exit` hooks. Transitions are `(start, event) -> end`, at
//! most one per pair. The machine is a pure, side-effect-free data structure;
//! callers own persistence of `current_state`/`target_state`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsmError {
    #[error("state already declared")]
    Duplicate,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("state not found: {0}")]
    NotFound(String),
}

/// A hook invoked on state entry/exit, given the state and the event that
/// caused the transition.
pub type Hook<S, E> = Arc<dyn Fn(&S, &E) + Send + Sync>;

/// Declarative metadata for one state.
pub struct StateSpec<S> {
    pub stable: bool,
    pub terminal: bool,
    /// The stable state this transient state is heading toward, if any.
    pub target: Option<S>,
}

impl<S> Default for StateSpec<S> {
    fn default() -> Self {
        Self { stable: false, terminal: false, target: None }
    }
}

struct StateDef<S, E> {
    spec: StateSpec<S>,
    on_enter: Option<Hook<S, E>>,
    on_exit: Option<Hook<S, E>>,
}

/// A finite state machine over states `S` and events `E`.
pub struct Fsm<S, E> {
    states: HashMap<S, StateDef<S, E>>,
    transitions: HashMap<(S, E), S>,
    current: Option<S>,
    target_state: Option<S>,
}

impl<S, E> Default for Fsm<S, E>
where
    S: Eq + Hash + Clone,
    E: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> Fsm<S, E>
where
    S: Eq + Hash + Clone,
    E: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self { states: HashMap::new(), transitions: HashMap::new(), current: None, target_state: None }
    }

    /// Declare a state. Fails with `Duplicate` if already declared, or
    /// `InvalidState` if `spec.target` names an unknown or non-stable state.
    pub fn add_state(&mut self, name: S, spec: StateSpec<S>) -> Result<(), FsmError> {
        self.add_state_with_hooks(name, spec, None, None)
    }

    pub fn add_state_with_hooks(
        &mut self,
        name: S,
        spec: StateSpec<S>,
        on_enter: Option<Hook<S, E>>,
        on_exit: Option<Hook<S, E>>,
    ) -> Result<(), FsmError> {
        if self.states.contains_key(&name) {
            return Err(FsmError::Duplicate);
        }
        if let Some(target) = &spec.target {
            match self.states.get(target) {
                None => return Err(FsmError::InvalidState("target state not yet declared".into())),
                Some(t) if !t.spec.stable => {
                    return Err(FsmError::InvalidState("target state is not stable".into()))
                }
                Some(_) => {}
            }
        }
        self.states.insert(name, StateDef { spec, on_enter, on_exit });
        Ok(())
    }

    /// Declare `(start, event) -> end`. Both states must already exist.
    pub fn add_transition(&mut self, start: S, event: E, end: S) -> Result<(), FsmError> {
        if !self.states.contains_key(&start) {
            return Err(FsmError::NotFound("start state".into()));
        }
        if !self.states.contains_key(&end) {
            return Err(FsmError::NotFound("end state".into()));
        }
        self.transitions.insert((start, event), end);
        Ok(())
    }

    /// Position the machine at `start`. Fails if `start` is unknown or terminal.
    pub fn initialize(&mut self, start: S) -> Result<(), FsmError> {
        let def = self
            .states
            .get(&start)
            .ok_or_else(|| FsmError::NotFound("start state".into()))?;
        if def.spec.terminal {
            return Err(FsmError::InvalidState("cannot initialize into a terminal state".into()));
        }
        self.target_state = if def.spec.stable { None } else { def.spec.target.clone() };
        self.current = Some(start);
        Ok(())
    }

    pub fn current_state(&self) -> Option<&S> {
        self.current.as_ref()
    }

    pub fn target_state(&self) -> Option<&S> {
        self.target_state.as_ref()
    }

    pub fn is_valid_event(&self, event: &E) -> bool {
        match &self.current {
            None => false,
            Some(cur) => self.transitions.contains_key(&(cur.clone(), event.clone())),
        }
    }

    /// Apply `event` to the current state.
    ///
    /// Fails with `InvalidState` if uninitialised, if the current state is
    /// terminal, or if no transition is declared for `event`. On success:
    /// runs `on_exit(current, event)`, then `on_enter(next, event)`, then
    /// advances. After advancing, if the new state equals the previously
    /// tracked target, the target is cleared; if the new state itself
    /// declares a target, the target is set to it.
    pub fn process_event(&mut self, event: &E) -> Result<(), FsmError> {
        let current = self.current.clone().ok_or(FsmError::InvalidState("not initialized".into()))?;
        let current_def = self.states.get(&current).ok_or(FsmError::InvalidState("unknown current state".into()))?;
        if current_def.spec.terminal {
            return Err(FsmError::InvalidState("current state is terminal".into()));
        }
        let next = self
            .transitions
            .get(&(current.clone(), event.clone()))
            .cloned()
            .ok_or_else(|| FsmError::InvalidState("no transition for event from current state".to_string()))?;

        if let Some(on_exit) = current_def.on_exit.clone() {
            on_exit(&current, event);
        }
        let next_def = self.states.get(&next).ok_or(FsmError::InvalidState("unknown next state".into()))?;
        if let Some(on_enter) = next_def.on_enter.clone() {
            on_enter(&next, event);
        }

        let next_def_target = next_def.spec.target.clone();
        if self.target_state.as_ref() == Some(&next) {
            self.target_state = None;
        } else if let Some(target) = next_def_target {
            self.target_state = Some(target);
        }
        self.current = Some(next);
        Ok(())
    }

    /// Iterate over every declared `(start, event, end)` triple.
    pub fn transitions(&self) -> impl Iterator<Item = (&S, &E, &S)> {
        self.transitions.iter().map(|((s, e), end)| (s, e, end))
    }

    pub fn is_stable(&self, state: &S) -> bool {
        self.states.get(state).map(|d| d.spec.stable).unwrap_or(false)
    }

    pub fn is_terminal(&self, state: &S) -> bool {
        self.states.get(state).map(|d| d.spec.terminal).unwrap_or(false)
    }

    /// Copy the machine. When `deep` is true, the copy's `current`/`target`
    /// position is preserved so events can be applied to the copy
    /// independently of the original; when false, the copy is left
    /// uninitialised (definition only — states and transitions, no position).
    pub fn copy(&self, deep: bool) -> Self {
        let mut states = HashMap::with_capacity(self.states.len());
        for (name, def) in &self.states {
            states.insert(
                name.clone(),
                StateDef {
                    spec: StateSpec {
                        stable: def.spec.stable,
                        terminal: def.spec.terminal,
                        target: def.spec.target.clone(),
                    },
                    on_enter: def.on_enter.clone(),
                    on_exit: def.on_exit.clone(),
                },
            );
        }
        Self {
            states,
            transitions: self.transitions.clone(),
            current: if deep { self.current.clone() } else { None },
            target_state: if deep { self.target_state.clone() } else { None },
        }
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
