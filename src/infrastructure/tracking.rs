//! Identity side-table for wrapped values.
//!
//! Tracking metadata lives outside the wrapped values themselves: host
//! objects may be intrinsic values that must not be mutated or copied, so
//! state is keyed by a handle minted at wrap time instead. The table never
//! keeps a wrapped value alive: the last clone of a wrapper releases its
//! state on drop, and a session reset drains the whole arena.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::domain::call_chain::CallChain;
use crate::infrastructure::intercept::{HookResult, Value};
use crate::domain::value::RawValue;

pub type Handle = u64;

/// Per wrapped-value record.
pub struct ProxyState<C> {
    /// The underlying host value, returned verbatim by unwrap.
    pub raw: RawValue,
    /// The chain of accesses that produced this value.
    pub chain: CallChain<C>,
    /// Result of the hook invocation that admitted this value, if any.
    pub last_hook: Option<HookResult<C>>,
    /// Receiver to use when this value (a function) is called through the
    /// wrapper rather than with an explicit receiver.
    pub bound_this: Option<RawValue>,
    /// Cached settlement of a wrapped promise, so repeated observation does
    /// not re-run hooks.
    pub settled: RefCell<Option<Result<Value<C>, Value<C>>>>,
}

pub struct Tracking<C> {
    next: Handle,
    states: HashMap<Handle, ProxyState<C>>,
}

impl<C> Default for Tracking<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Tracking<C> {
    pub fn new() -> Self {
        Self {
            next: 0,
            states: HashMap::new(),
        }
    }

    pub fn track(&mut self, state: ProxyState<C>) -> Handle {
        let handle = self.next;
        self.next += 1;
        self.states.insert(handle, state);
        handle
    }

    pub fn lookup(&self, handle: Handle) -> Option<&ProxyState<C>> {
        self.states.get(&handle)
    }

    /// Remove one state. Callers must drop the returned state only after
    /// releasing their borrow of the table: a state can own other wrapped
    /// values (settled cache), whose teardown re-enters the table.
    pub fn take(&mut self, handle: Handle) -> Option<ProxyState<C>> {
        self.states.remove(&handle)
    }

    /// Remove everything; same drop discipline as [`Tracking::take`].
    pub fn drain(&mut self) -> HashMap<Handle, ProxyState<C>> {
        std::mem::take(&mut self.states)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
