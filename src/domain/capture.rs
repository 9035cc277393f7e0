//! Program capture store.
//!
//! An append-only ordered sequence of captured items, reset at the start of
//! each program (re)evaluation. Items recorded during the initial synchronous
//! setup phase persist across frames; items recorded during steady-state
//! frame closures are ephemeral and dropped before the next frame runs.

use crate::domain::value::RawValue;

/// A value an item depends on: either a previously captured item (by id) or
/// a value never seen as a node, carried along so the graph builder can
/// synthesize one.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub id: String,
    pub untracked_value: Option<RawValue>,
}

impl Dependency {
    pub fn tracked(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            untracked_value: None,
        }
    }

    pub fn untracked(id: impl Into<String>, value: RawValue) -> Self {
        Self {
            id: id.into(),
            untracked_value: Some(value),
        }
    }
}

/// One recorded observation of a value during a program run.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedItem {
    pub id: String,
    pub parent_id: Option<String>,
    pub value: RawValue,
    pub ephemeral: bool,
    pub dependencies: Vec<Dependency>,
    pub call_chain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial synchronous execution of the program's setup function.
    Setup,
    /// Subsequent invocations of the returned per-frame closure.
    Steady,
}

pub struct CaptureStore {
    items: Vec<CapturedItem>,
    phase: Phase,
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureStore {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            phase: Phase::Setup,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Clear everything and re-enter the setup phase. Called at the start of
    /// each program (re)evaluation.
    pub fn reset(&mut self) {
        self.items.clear();
        self.phase = Phase::Setup;
    }

    /// Switch to the steady phase; newly pushed items become ephemeral.
    pub fn finish_setup(&mut self) {
        self.phase = Phase::Steady;
    }

    /// Record one item. O(1) append; ephemerality is decided by the current
    /// phase, never by the caller.
    pub fn push(
        &mut self,
        id: String,
        parent_id: Option<String>,
        value: RawValue,
        dependencies: Vec<Dependency>,
        call_chain: String,
    ) {
        self.items.push(CapturedItem {
            id,
            parent_id,
            value,
            ephemeral: self.phase == Phase::Steady,
            dependencies,
            call_chain,
        });
    }

    /// Drop the previous frame's ephemeral items. Invoked immediately before
    /// each render-closure run.
    pub fn begin_frame(&mut self) {
        self.items.retain(|item| !item.ephemeral);
    }

    pub fn items(&self) -> &[CapturedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
