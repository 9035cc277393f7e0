//! The interception engine.
//!
//! Wraps a root host value so that every property read, function invocation,
//! and promise settlement extends a call chain, runs caller-supplied hooks,
//! and decides whether the resulting value stays wrapped or is handed back
//! raw. Hooks can substitute values, amend the chain's context (which then
//! flows to all descendants), or demand an untracked raw return.
//!
//! Matchers special-case host operations that reject wrapped arguments:
//! an ordered, first-match-wins list of predicates whose callback set fully
//! replaces the defaults for the matched value.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;
use thiserror::Error;

use crate::domain::call_chain::{CallChain, Step, StepKind};
use crate::domain::ident::Position;
use crate::domain::value::{HostError, HostFunction, HostObject, PromiseState, RawValue, TypeTag};
use crate::infrastructure::tracking::{Handle, ProxyState, Tracking};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Programmer error, rejected at registration time.
    #[error("matcher {0} has neither a value hook nor an exec hook")]
    EmptyMatcher(usize),
    #[error("value is not callable: {0}")]
    NotCallable(TypeTag),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// What a hook decided about an observed value.
#[derive(Clone)]
pub struct HookResult<C> {
    /// Substitute for the observed value; `None` keeps the original.
    pub value: Option<RawValue>,
    /// Context override, amended onto the chain's last step.
    pub context: Option<C>,
    /// Hand the value back raw and untracked.
    pub return_raw: bool,
}

impl<C> Default for HookResult<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HookResult<C> {
    pub fn new() -> Self {
        Self {
            value: None,
            context: None,
            return_raw: false,
        }
    }

    pub fn with_value(mut self, value: RawValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_context(mut self, context: C) -> Self {
        self.context = Some(context);
        self
    }

    pub fn raw(mut self) -> Self {
        self.return_raw = true;
        self
    }
}

/// Invokes the underlying raw function with the corrected receiver.
pub struct Invoker {
    func: Rc<HostFunction>,
    this: RawValue,
}

impl Invoker {
    pub fn name(&self) -> &str {
        &self.func.name
    }

    pub fn call(&self, args: &[RawValue]) -> Result<RawValue, HostError> {
        self.func.invoke(&self.this, args)
    }
}

pub type ValueHook<C> = Rc<dyn Fn(&CallChain<C>, &RawValue) -> Option<HookResult<C>>>;
pub type ExecHook<C> =
    Rc<dyn Fn(&CallChain<C>, &[Value<C>], &Invoker) -> Result<Option<HookResult<C>>, EngineError>>;
pub type MatchPredicate<C> = Rc<dyn Fn(&CallChain<C>, &RawValue) -> bool>;

/// A predicate plus callback overrides. When the predicate matches, the
/// matcher's callbacks fully replace the defaults for that value.
pub struct Matcher<C> {
    pub predicate: MatchPredicate<C>,
    pub value_hook: Option<ValueHook<C>>,
    pub exec_hook: Option<ExecHook<C>>,
}

pub struct InterceptOptions<C> {
    pub value_hook: Option<ValueHook<C>>,
    pub exec_hook: Option<ExecHook<C>>,
    pub matchers: Vec<Matcher<C>>,
    pub context: Option<C>,
}

impl<C> Default for InterceptOptions<C> {
    fn default() -> Self {
        Self {
            value_hook: None,
            exec_hook: None,
            matchers: Vec::new(),
            context: None,
        }
    }
}

struct SelectedHooks<'a, C> {
    value_hook: Option<&'a ValueHook<C>>,
    exec_hook: Option<&'a ExecHook<C>>,
}

fn select_hooks<'a, C: Clone>(
    options: &'a InterceptOptions<C>,
    chain: &CallChain<C>,
    value: &RawValue,
) -> SelectedHooks<'a, C> {
    for matcher in &options.matchers {
        if (matcher.predicate)(chain, value) {
            return SelectedHooks {
                value_hook: matcher.value_hook.as_ref(),
                exec_hook: matcher.exec_hook.as_ref(),
            };
        }
    }
    SelectedHooks {
        value_hook: options.value_hook.as_ref(),
        exec_hook: options.exec_hook.as_ref(),
    }
}

pub(crate) struct EngineShared<C> {
    pub(crate) tracking: RefCell<Tracking<C>>,
    pub(crate) options: InterceptOptions<C>,
}

/// The interception engine. Cheap to clone; all clones share one identity
/// side-table.
pub struct Engine<C> {
    shared: Rc<EngineShared<C>>,
}

impl<C> Clone for Engine<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C: Clone + 'static> Engine<C> {
    pub fn new(options: InterceptOptions<C>) -> Result<Self, EngineError> {
        for (index, matcher) in options.matchers.iter().enumerate() {
            if matcher.value_hook.is_none() && matcher.exec_hook.is_none() {
                return Err(EngineError::EmptyMatcher(index));
            }
        }
        Ok(Self {
            shared: Rc::new(EngineShared {
                tracking: RefCell::new(Tracking::new()),
                options,
            }),
        })
    }

    /// Wrap a root value. Hooks are not invoked for the root itself; its
    /// chain is empty and carries the options' root context.
    pub fn wrap(&self, root: RawValue) -> Value<C> {
        let chain = CallChain::root(self.shared.options.context.clone());
        track_or_raw(&self.shared, root, chain, None, None)
    }

    /// Recover the raw value behind any value, recursing through
    /// caller-composed aggregates. Tracked values come back via their stored
    /// raw reference, never cloned structurally.
    pub fn unwrap(&self, value: &Value<C>) -> RawValue {
        value.to_raw()
    }

    /// Effective context of a value, or `None` if it was never tracked.
    /// Absent context is an expected case, not an error.
    pub fn get_context(value: &Value<C>) -> Option<C> {
        value.context()
    }

    /// Drop all tracked state, e.g. between program evaluations.
    pub fn reset(&self) {
        let drained = { self.shared.tracking.borrow_mut().drain() };
        // dropped outside the borrow: state teardown can re-enter the table
        drop(drained);
    }

    pub fn tracked_count(&self) -> usize {
        self.shared.tracking.borrow().len()
    }
}

struct WrappedCore<C> {
    handle: Handle,
    shared: Rc<EngineShared<C>>,
}

impl<C> Drop for WrappedCore<C> {
    fn drop(&mut self) {
        let removed = { self.shared.tracking.borrow_mut().take(self.handle) };
        drop(removed);
    }
}

/// A tracked value: behaves like the original when read or called, but
/// triggers the engine's hooks on every access.
pub struct Wrapped<C> {
    core: Rc<WrappedCore<C>>,
}

impl<C> Clone for Wrapped<C> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<C: Clone + 'static> Wrapped<C> {
    fn with_state<R>(&self, f: impl FnOnce(&ProxyState<C>) -> R) -> Option<R> {
        let tracking = self.core.shared.tracking.borrow();
        tracking.lookup(self.core.handle).map(f)
    }

    /// The underlying raw value. `Null` if the state was already released.
    pub fn raw(&self) -> RawValue {
        self.with_state(|state| state.raw.clone())
            .unwrap_or(RawValue::Null)
    }

    pub fn chain(&self) -> Option<CallChain<C>> {
        self.with_state(|state| state.chain.clone())
    }

    pub fn chain_string(&self) -> String {
        self.with_state(|state| state.chain.to_chain_string())
            .unwrap_or_default()
    }

    pub fn context(&self) -> Option<C> {
        self.with_state(|state| state.chain.get_context()).flatten()
    }

    /// Read a property, extending the chain and re-entering the wrap
    /// algorithm for the result.
    #[track_caller]
    pub fn get(&self, name: &str) -> Value<C> {
        let position = Position::here();
        let Some((chain, target)) =
            self.with_state(|state| (state.chain.clone(), state.raw.clone()))
        else {
            return Value::Raw(RawValue::Null);
        };
        let value = match &target {
            RawValue::Object(object) => object.get(name).unwrap_or(RawValue::Null),
            _ => RawValue::Null,
        };
        let chain = chain.extend(Step::property(name, value.clone(), position));
        wrap_value(&self.core.shared, value, chain, Some(target))
    }

    /// Invoke this value as a function through the wrapper; the receiver is
    /// the original target object the function was read from.
    #[track_caller]
    pub fn call(&self, args: &[Value<C>]) -> Result<Value<C>, EngineError> {
        self.call_impl(None, args, Position::here())
    }

    /// Invoke with an explicit receiver, for methods detached and rebound by
    /// user code.
    #[track_caller]
    pub fn call_with(&self, receiver: &Value<C>, args: &[Value<C>]) -> Result<Value<C>, EngineError> {
        self.call_impl(Some(receiver), args, Position::here())
    }

    fn call_impl(
        &self,
        receiver: Option<&Value<C>>,
        args: &[Value<C>],
        position: Position,
    ) -> Result<Value<C>, EngineError> {
        let Some((chain, raw, bound_this)) = self.with_state(|state| {
            (
                state.chain.clone(),
                state.raw.clone(),
                state.bound_this.clone(),
            )
        }) else {
            return Err(EngineError::NotCallable(TypeTag::Null));
        };
        let RawValue::Function(func) = raw.clone() else {
            return Err(EngineError::NotCallable(raw.type_tag()));
        };
        let this = match receiver {
            Some(value) => value.to_raw(),
            None => bound_this.unwrap_or(RawValue::Null),
        };

        let mut chain = chain.extend(Step::synthetic(StepKind::Executed, position));
        let hooks = select_hooks(&self.core.shared.options, &chain, &raw);
        let invoker = Invoker {
            func: Rc::clone(&func),
            this,
        };

        let outcome = match hooks.exec_hook {
            Some(hook) => hook(&chain, args, &invoker)?,
            None => None,
        };

        let mut return_raw = false;
        let result = match outcome {
            None => {
                let raw_args: Vec<RawValue> = args.iter().map(Value::to_raw).collect();
                invoker
                    .call(&raw_args)
                    .map_err(|error| EngineError::Host(locate(error, position)))?
            }
            Some(outcome) => {
                if let Some(context) = &outcome.context {
                    chain = chain.with_context(context.clone());
                }
                return_raw = outcome.return_raw;
                match outcome.value {
                    Some(value) => value,
                    // returnRaw without a substitute still runs the call
                    None if outcome.return_raw => {
                        let raw_args: Vec<RawValue> = args.iter().map(Value::to_raw).collect();
                        invoker
                            .call(&raw_args)
                            .map_err(|error| EngineError::Host(locate(error, position)))?
                    }
                    None => RawValue::Null,
                }
            }
        };

        if return_raw {
            trace!("call {} returned raw", chain.to_chain_string());
            return Ok(Value::Raw(result));
        }
        let this = invoker.this.clone();
        Ok(wrap_value(&self.core.shared, result, chain, Some(this)))
    }

    /// Observe a wrapped promise. `None` while pending; on first observed
    /// settlement the chain gains a `resolved`/`rejected` step and the
    /// settled value re-enters the wrap algorithm. The outcome is cached so
    /// repeated observation runs no hooks.
    #[track_caller]
    pub fn settled(&self) -> Option<Result<Value<C>, Value<C>>> {
        let position = Position::here();
        if let Some(cached) = self
            .with_state(|state| state.settled.borrow().clone())
            .flatten()
        {
            return Some(cached);
        }
        let (chain, raw) = self.with_state(|state| (state.chain.clone(), state.raw.clone()))?;
        let RawValue::Promise(cell) = raw else {
            return None;
        };
        let result = match cell.state() {
            PromiseState::Pending => return None,
            PromiseState::Resolved(value) => {
                let chain = chain.extend(Step::synthetic(StepKind::Resolved, position));
                Ok(wrap_value(&self.core.shared, value, chain, None))
            }
            PromiseState::Rejected(value) => {
                let chain = chain.extend(Step::synthetic(StepKind::Rejected, position));
                Err(wrap_value(&self.core.shared, value, chain, None))
            }
        };
        self.with_state(|state| *state.settled.borrow_mut() = Some(result.clone()));
        Some(result)
    }
}

/// A value observed through the engine: tracked, raw, or a caller-composed
/// aggregate of both (e.g. an argument list entry).
pub enum Value<C> {
    Tracked(Wrapped<C>),
    Raw(RawValue),
    List(Vec<Value<C>>),
    Record(Vec<(String, Value<C>)>),
}

impl<C> Clone for Value<C> {
    fn clone(&self) -> Self {
        match self {
            Value::Tracked(wrapped) => Value::Tracked(wrapped.clone()),
            Value::Raw(raw) => Value::Raw(raw.clone()),
            Value::List(items) => Value::List(items.clone()),
            Value::Record(fields) => Value::Record(fields.clone()),
        }
    }
}

impl<C: Clone + 'static> Value<C> {
    pub fn as_wrapped(&self) -> Option<&Wrapped<C>> {
        match self {
            Value::Tracked(wrapped) => Some(wrapped),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<C> {
        self.as_wrapped().and_then(Wrapped::context)
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Tracked(wrapped) => wrapped.raw().type_tag(),
            Value::Raw(raw) => raw.type_tag(),
            Value::List(_) => TypeTag::Array,
            Value::Record(_) => TypeTag::Object,
        }
    }

    /// Property read; raw and aggregate values have no tracked properties.
    #[track_caller]
    pub fn get(&self, name: &str) -> Value<C> {
        match self {
            Value::Tracked(wrapped) => wrapped.get(name),
            _ => Value::Raw(RawValue::Null),
        }
    }

    #[track_caller]
    pub fn call(&self, args: &[Value<C>]) -> Result<Value<C>, EngineError> {
        match self {
            Value::Tracked(wrapped) => wrapped.call(args),
            other => Err(EngineError::NotCallable(other.type_tag())),
        }
    }

    /// Structural unwrap: tracked values yield their stored raw reference,
    /// aggregates recurse, raw values pass through unchanged.
    pub fn to_raw(&self) -> RawValue {
        match self {
            Value::Tracked(wrapped) => wrapped.raw(),
            Value::Raw(raw) => raw.clone(),
            Value::List(items) => RawValue::array(items.iter().map(Value::to_raw).collect()),
            Value::Record(fields) => RawValue::Object(HostObject::with_fields(
                "object",
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_raw())),
            )),
        }
    }
}

fn locate(error: HostError, position: Position) -> HostError {
    if error.position.is_none() {
        error.at(position)
    } else {
        error
    }
}

/// Core wrap algorithm: run the selected value hook, apply its overrides,
/// then track objects/functions/promises and hand everything else back raw.
fn wrap_value<C: Clone + 'static>(
    shared: &Rc<EngineShared<C>>,
    value: RawValue,
    chain: CallChain<C>,
    bound_this: Option<RawValue>,
) -> Value<C> {
    let mut value = value;
    let mut chain = chain;
    let mut last_hook = None;

    let hook = select_hooks(&shared.options, &chain, &value).value_hook.cloned();
    if let Some(hook) = hook {
        if let Some(outcome) = hook(&chain, &value) {
            if let Some(substitute) = &outcome.value {
                value = substitute.clone();
            }
            if let Some(context) = &outcome.context {
                chain = chain.with_context(context.clone());
            }
            let return_raw = outcome.return_raw;
            last_hook = Some(outcome);
            if return_raw {
                return Value::Raw(value);
            }
        }
    }

    trace!("wrap {} ({})", chain.to_chain_string(), value.type_tag());
    track_or_raw(shared, value, chain, bound_this, last_hook)
}

fn track_or_raw<C: Clone + 'static>(
    shared: &Rc<EngineShared<C>>,
    value: RawValue,
    chain: CallChain<C>,
    bound_this: Option<RawValue>,
    last_hook: Option<HookResult<C>>,
) -> Value<C> {
    match value.type_tag() {
        TypeTag::Object | TypeTag::Function | TypeTag::Promise => {
            let handle = shared.tracking.borrow_mut().track(ProxyState {
                raw: value,
                chain,
                last_hook,
                bound_this,
                settled: RefCell::new(None),
            });
            Value::Tracked(Wrapped {
                core: Rc::new(WrappedCore {
                    handle,
                    shared: Rc::clone(shared),
                }),
            })
        }
        _ => Value::Raw(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_with(name: &str, value: RawValue) -> RawValue {
        RawValue::Object(HostObject::with_fields(
            "T",
            vec![(name.to_string(), value)],
        ))
    }

    #[test]
    fn empty_matchers_are_rejected_at_registration() {
        let options: InterceptOptions<u32> = InterceptOptions {
            matchers: vec![Matcher {
                predicate: Rc::new(|_, _| true),
                value_hook: None,
                exec_hook: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(options),
            Err(EngineError::EmptyMatcher(0))
        ));
    }

    #[test]
    fn primitives_come_back_raw_and_untracked() {
        let engine: Engine<u32> = Engine::new(InterceptOptions::default()).unwrap();
        let root = engine.wrap(object_with("n", RawValue::Number(5.0)));
        match root.get("n") {
            Value::Raw(RawValue::Number(n)) => assert_eq!(n, 5.0),
            other => panic!("expected raw number, got {:?}", other.type_tag()),
        }
        assert_eq!(engine.tracked_count(), 1); // only the root
    }

    #[test]
    fn dropping_wrappers_releases_side_table_state() {
        let engine: Engine<u32> = Engine::new(InterceptOptions::default()).unwrap();
        let root = engine.wrap(object_with("a", object_with("b", RawValue::Null)));
        let child = root.get("a");
        assert_eq!(engine.tracked_count(), 2);
        drop(child);
        assert_eq!(engine.tracked_count(), 1);
        drop(root);
        assert_eq!(engine.tracked_count(), 0);
    }

    #[test]
    fn reset_drains_all_state() {
        let engine: Engine<u32> = Engine::new(InterceptOptions::default()).unwrap();
        let root = engine.wrap(object_with("a", RawValue::Null));
        assert_eq!(engine.tracked_count(), 1);
        engine.reset();
        assert_eq!(engine.tracked_count(), 0);
        // a stale wrapper degrades to "no context", never an error
        assert!(root.context().is_none());
        assert_eq!(root.to_raw(), RawValue::Null);
    }

    #[test]
    fn receiver_defaults_to_the_original_target() {
        let object = HostObject::new("Counter");
        object.set("value", RawValue::Number(41.0));
        object.set(
            "next",
            RawValue::Function(HostFunction::new("next", |this, _| {
                let RawValue::Object(this) = this else {
                    return Err(HostError::new("detached receiver"));
                };
                match this.get("value") {
                    Some(RawValue::Number(n)) => Ok(RawValue::Number(n + 1.0)),
                    _ => Err(HostError::new("missing value")),
                }
            })),
        );
        let engine: Engine<u32> = Engine::new(InterceptOptions::default()).unwrap();
        let root = engine.wrap(RawValue::Object(object));
        let result = root.get("next").call(&[]).unwrap();
        assert_eq!(result.to_raw(), RawValue::Number(42.0));
    }

    #[test]
    fn explicit_receivers_are_respected() {
        let source = HostObject::new("A");
        source.set(
            "name_of",
            RawValue::Function(HostFunction::new("name_of", |this, _| {
                let RawValue::Object(this) = this else {
                    return Ok(RawValue::Null);
                };
                Ok(RawValue::str(this.type_name.clone()))
            })),
        );
        let other = RawValue::Object(HostObject::new("B"));

        let engine: Engine<u32> = Engine::new(InterceptOptions::default()).unwrap();
        let root = engine.wrap(RawValue::Object(source));
        let method = root.get("name_of");
        let rebound = method
            .as_wrapped()
            .unwrap()
            .call_with(&Value::Raw(other), &[])
            .unwrap();
        assert_eq!(rebound.to_raw(), RawValue::str("B"));
    }

    #[test]
    fn aggregate_arguments_unwrap_structurally() {
        let engine: Engine<u32> = Engine::new(InterceptOptions::default()).unwrap();
        let root = engine.wrap(object_with("inner", RawValue::Null));
        let composed = Value::Record(vec![
            ("target".to_string(), root.clone()),
            ("count".to_string(), Value::Raw(RawValue::Number(2.0))),
        ]);
        let raw = engine.unwrap(&composed);
        let RawValue::Object(object) = raw else {
            panic!("expected object");
        };
        assert!(matches!(object.get("target"), Some(RawValue::Object(_))));
        assert_eq!(object.get("count"), Some(RawValue::Number(2.0)));
    }
}
