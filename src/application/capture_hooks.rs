//! Capture-layer hooks: translate engine observations into captured items.
//!
//! The value hook records every interesting observed value as a
//! `CapturedItem` with a deterministic id and overrides the chain context so
//! descendants know their structural parent. The exec hook derives
//! dependencies from a call's arguments and threads them forward so the
//! call's result inherits them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::domain::call_chain::CallChain;
use crate::domain::capture::{CaptureStore, Dependency};
use crate::domain::ident::{gen_id, Position};
use crate::domain::value::{RawValue, TypeTag};
use crate::infrastructure::intercept::{
    ExecHook, HookResult, InterceptOptions, Matcher, Value, ValueHook,
};

/// Context threaded along call chains by the capture layer: the item id the
/// chain last produced, its structural parent, and the dependencies the next
/// captured value should inherit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemContext {
    pub id: String,
    pub parent_id: Option<String>,
    pub dependencies: Vec<Dependency>,
}

/// Capture policy knobs.
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// Call-chain suffixes whose invocations bypass wrapping entirely, for
    /// host operations that reject wrapped arguments (e.g. low-level
    /// memory-mapping accessors).
    pub raw_call_suffixes: Vec<String>,
}

/// Build the engine options that feed a capture store.
pub fn capture_options(
    store: Rc<RefCell<CaptureStore>>,
    config: &CaptureConfig,
) -> InterceptOptions<ItemContext> {
    let matchers = config
        .raw_call_suffixes
        .iter()
        .map(|suffix| {
            let suffix = suffix.clone();
            Matcher {
                predicate: Rc::new(move |chain: &CallChain<ItemContext>, _: &RawValue| {
                    chain.ends_with(&suffix)
                }),
                value_hook: None,
                exec_hook: Some(Rc::new(|_, _, _| Ok(Some(HookResult::new().raw())))),
            }
        })
        .collect();

    let value_store = Rc::clone(&store);
    let value_hook: ValueHook<ItemContext> =
        Rc::new(move |chain: &CallChain<ItemContext>, raw: &RawValue| {
            // functions and bare promises are never captured directly
            if matches!(raw.type_tag(), TypeTag::Function | TypeTag::Promise) {
                return None;
            }
            let context = chain.get_context().unwrap_or_default();
            let position = chain.last_position().unwrap_or_else(Position::unknown);
            let id = gen_id(&raw.preview(), position, &context.id);
            let parent_id = if context.id.is_empty() {
                None
            } else {
                Some(context.id.clone())
            };
            value_store.borrow_mut().push(
                id.clone(),
                parent_id.clone(),
                raw.clone(),
                context.dependencies.clone(),
                chain.to_chain_string(),
            );
            Some(HookResult::new().with_context(ItemContext {
                id,
                parent_id,
                dependencies: Vec::new(),
            }))
        });

    let exec_hook: ExecHook<ItemContext> = Rc::new(
        move |chain: &CallChain<ItemContext>, args: &[Value<ItemContext>], invoker| {
            let context = chain.get_context().unwrap_or_default();
            let position = chain.last_position().unwrap_or_else(Position::unknown);
            let dependencies = args
                .iter()
                .filter_map(|arg| dependency_of(arg, position))
                .collect();
            // host functions see raw arguments only
            let raw_args: Vec<RawValue> = args.iter().map(Value::to_raw).collect();
            let result = invoker.call(&raw_args)?;
            Ok(Some(HookResult::new().with_value(result).with_context(
                ItemContext {
                    id: context.id,
                    parent_id: context.parent_id,
                    dependencies,
                },
            )))
        },
    );

    InterceptOptions {
        value_hook: Some(value_hook),
        exec_hook: Some(exec_hook),
        matchers,
        context: Some(ItemContext::default()),
    }
}

/// An argument's contribution to the next item's dependencies: captured
/// arguments by id, uncaptured object-like arguments as untracked values,
/// primitives not at all.
fn dependency_of(arg: &Value<ItemContext>, position: Position) -> Option<Dependency> {
    if let Some(context) = arg.context() {
        if !context.id.is_empty() {
            return Some(Dependency::tracked(context.id));
        }
    }
    match arg.type_tag() {
        TypeTag::Object | TypeTag::Array => {
            let raw = arg.to_raw();
            let id = gen_id(&raw.preview(), position, "");
            Some(Dependency::untracked(id, raw))
        }
        _ => None,
    }
}
