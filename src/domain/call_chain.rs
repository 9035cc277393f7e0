//! Call chains: the immutable path of accesses that led to a value.
//!
//! A chain is a persistent linked list sharing its tail structurally:
//! `extend` allocates exactly one node pointing at the previous last step,
//! so sibling accesses branching off the same prefix stay independent.
//! Each step may carry an explicit context; the effective context of a chain
//! is the context of the most recent step that set one, falling back to the
//! root context (rightmost override wins, never a merge).

use std::fmt;
use std::rc::Rc;

use crate::domain::ident::Position;
use crate::domain::value::{RawValue, TypeTag};

/// One hop in a call chain.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// A named property access, with the runtime type and raw value seen.
    Property {
        name: String,
        type_tag: TypeTag,
        value: RawValue,
    },
    /// A function invocation, rendered as `()`.
    Executed,
    /// A promise resolution.
    Resolved,
    /// A promise rejection.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Step<C> {
    pub kind: StepKind,
    pub context: Option<C>,
    pub position: Position,
}

impl<C> Step<C> {
    pub fn property(name: impl Into<String>, value: RawValue, position: Position) -> Self {
        Self {
            kind: StepKind::Property {
                name: name.into(),
                type_tag: value.type_tag(),
                value,
            },
            context: None,
            position,
        }
    }

    pub fn synthetic(kind: StepKind, position: Position) -> Self {
        Self {
            kind,
            context: None,
            position,
        }
    }
}

struct ChainNode<C> {
    step: Step<C>,
    prev: Option<Rc<ChainNode<C>>>,
}

/// An immutable call chain with a caller-supplied root context.
pub struct CallChain<C> {
    last: Option<Rc<ChainNode<C>>>,
    root_context: Option<C>,
}

impl<C: Clone> Clone for CallChain<C> {
    fn clone(&self) -> Self {
        Self {
            last: self.last.clone(),
            root_context: self.root_context.clone(),
        }
    }
}

impl<C: Clone> CallChain<C> {
    pub fn root(context: Option<C>) -> Self {
        Self {
            last: None,
            root_context: context,
        }
    }

    /// Returns a new chain with one more step. Never mutates in place.
    pub fn extend(&self, step: Step<C>) -> Self {
        Self {
            last: Some(Rc::new(ChainNode {
                step,
                prev: self.last.clone(),
            })),
            root_context: self.root_context.clone(),
        }
    }

    /// Returns a chain whose last step carries `context`, cloning only that
    /// step. This is how hook-returned context flows to descendants without
    /// touching the prefix shared with siblings.
    pub fn with_context(&self, context: C) -> Self {
        match &self.last {
            Some(node) => {
                let mut step = node.step.clone();
                step.context = Some(context);
                Self {
                    last: Some(Rc::new(ChainNode {
                        step,
                        prev: node.prev.clone(),
                    })),
                    root_context: self.root_context.clone(),
                }
            }
            None => Self {
                last: None,
                root_context: Some(context),
            },
        }
    }

    /// The effective context: the most recent explicitly-set step context,
    /// or the root context if no step set one.
    pub fn get_context(&self) -> Option<C> {
        let mut node = self.last.as_ref();
        while let Some(current) = node {
            if let Some(context) = &current.step.context {
                return Some(context.clone());
            }
            node = current.prev.as_ref();
        }
        self.root_context.clone()
    }

    /// Position of the most recent step, if the chain is non-empty.
    pub fn last_position(&self) -> Option<Position> {
        self.last.as_ref().map(|node| node.step.position)
    }

    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut node = self.last.as_ref();
        while let Some(current) = node {
            count += 1;
            node = current.prev.as_ref();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Human-readable rendering, doubling as the label for parent edges.
    pub fn to_chain_string(&self) -> String {
        let mut parts = Vec::new();
        let mut node = self.last.as_ref();
        while let Some(current) = node {
            parts.push(step_string(&current.step.kind));
            node = current.prev.as_ref();
        }
        parts.reverse();
        parts.concat()
    }

    pub fn ends_with(&self, suffix: &str) -> bool {
        self.to_chain_string().ends_with(suffix)
    }
}

fn step_string(kind: &StepKind) -> String {
    match kind {
        StepKind::Property { name, .. } => format!(".{}", name),
        StepKind::Executed => ".()".to_string(),
        StepKind::Resolved => ".__asyncResolved()".to_string(),
        StepKind::Rejected => ".__asyncRejected()".to_string(),
    }
}

impl<C: Clone> fmt::Display for CallChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_chain_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(name: &str) -> Step<u32> {
        Step::property(name, RawValue::Null, Position::unknown())
    }

    #[test]
    fn chain_string_renders_steps() {
        let chain = CallChain::<u32>::root(None)
            .extend(property("a"))
            .extend(Step::synthetic(StepKind::Executed, Position::unknown()))
            .extend(Step::synthetic(StepKind::Resolved, Position::unknown()));
        assert_eq!(chain.to_chain_string(), ".a.().__asyncResolved()");
        assert!(chain.ends_with(".__asyncResolved()"));
    }

    #[test]
    fn extend_leaves_original_untouched() {
        let base = CallChain::<u32>::root(Some(0)).extend(property("a"));
        let extended = base.extend(property("b"));
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert_eq!(base.to_chain_string(), ".a");
    }

    #[test]
    fn rightmost_context_wins() {
        let chain = CallChain::root(Some(1))
            .extend(property("a"))
            .with_context(2)
            .extend(property("b"));
        // no context on `.b`, the override on `.a` is still the latest
        assert_eq!(chain.get_context(), Some(2));
        assert_eq!(chain.with_context(3).get_context(), Some(3));
    }

    #[test]
    fn root_context_is_the_fallback() {
        let chain = CallChain::root(Some(7)).extend(property("a"));
        assert_eq!(chain.get_context(), Some(7));
        assert_eq!(CallChain::<u32>::root(None).get_context(), None);
    }

    #[test]
    fn with_context_does_not_leak_into_siblings() {
        let base = CallChain::root(Some(0)).extend(property("a"));
        let amended = base.with_context(5);
        let sibling = base.extend(property("b"));
        assert_eq!(amended.get_context(), Some(5));
        assert_eq!(sibling.get_context(), Some(0));
    }
}
