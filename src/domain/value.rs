//! Dynamic value model for instrumented host APIs.
//!
//! The engine makes no assumption about a host API's shape beyond
//! "properties, functions returning values/promises/objects", so host values
//! are modeled by one dynamic enum. Objects and functions are reference
//! counted; cloning a `RawValue` never copies host state.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::domain::ident::Position;

/// Runtime type tag of a raw value, used in call-chain steps and as the
/// pruning predicate's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
    Function,
    Promise,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Null => "null",
            TypeTag::Bool => "bool",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
            TypeTag::Function => "function",
            TypeTag::Promise => "promise",
        };
        f.write_str(name)
    }
}

/// Error raised by host functions. Carries the source position where the
/// failing access happened, when known, so the evaluation boundary can
/// translate it back to user-authored source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub message: String,
    pub position: Option<Position>,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} (at {})", self.message, position),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for HostError {}

/// A host object: a named bag of properties. Fields live behind a `RefCell`
/// so host code can mutate them; the engine itself never does.
pub struct HostObject {
    pub type_name: String,
    fields: RefCell<BTreeMap<String, RawValue>>,
}

impl HostObject {
    pub fn new(type_name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            type_name: type_name.into(),
            fields: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn with_fields(
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = (String, RawValue)>,
    ) -> Rc<Self> {
        Rc::new(Self {
            type_name: type_name.into(),
            fields: RefCell::new(fields.into_iter().collect()),
        })
    }

    pub fn get(&self, name: &str) -> Option<RawValue> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: RawValue) {
        self.fields.borrow_mut().insert(name.into(), value);
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }
}

/// Signature of a native host function: receiver plus positional arguments.
pub type NativeFn = dyn Fn(&RawValue, &[RawValue]) -> Result<RawValue, HostError>;

pub struct HostFunction {
    pub name: String,
    body: Box<NativeFn>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, body: F) -> Rc<Self>
    where
        F: Fn(&RawValue, &[RawValue]) -> Result<RawValue, HostError> + 'static,
    {
        Rc::new(Self {
            name: name.into(),
            body: Box::new(body),
        })
    }

    pub fn invoke(&self, this: &RawValue, args: &[RawValue]) -> Result<RawValue, HostError> {
        (self.body)(this, args)
    }
}

/// Settlement state of a host promise.
#[derive(Clone)]
pub enum PromiseState {
    Pending,
    Resolved(RawValue),
    Rejected(RawValue),
}

/// A host promise. Settlement is driven by host code; the engine only
/// observes it. Settling twice is a host bug and is ignored.
pub struct PromiseCell {
    state: RefCell<PromiseState>,
}

impl PromiseCell {
    pub fn pending() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(PromiseState::Pending),
        })
    }

    pub fn resolved(value: RawValue) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(PromiseState::Resolved(value)),
        })
    }

    pub fn rejected(value: RawValue) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(PromiseState::Rejected(value)),
        })
    }

    pub fn resolve(&self, value: RawValue) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, PromiseState::Pending) {
            *state = PromiseState::Resolved(value);
        }
    }

    pub fn reject(&self, value: RawValue) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, PromiseState::Pending) {
            *state = PromiseState::Rejected(value);
        }
    }

    pub fn state(&self) -> PromiseState {
        self.state.borrow().clone()
    }
}

/// A value in the traced object graph.
#[derive(Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<RefCell<Vec<RawValue>>>),
    Object(Rc<HostObject>),
    Function(Rc<HostFunction>),
    Promise(Rc<PromiseCell>),
}

impl RawValue {
    pub fn array(items: Vec<RawValue>) -> Self {
        RawValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn str(value: impl Into<String>) -> Self {
        RawValue::Str(value.into())
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            RawValue::Null => TypeTag::Null,
            RawValue::Bool(_) => TypeTag::Bool,
            RawValue::Number(_) => TypeTag::Number,
            RawValue::Str(_) => TypeTag::String,
            RawValue::Array(_) => TypeTag::Array,
            RawValue::Object(_) => TypeTag::Object,
            RawValue::Function(_) => TypeTag::Function,
            RawValue::Promise(_) => TypeTag::Promise,
        }
    }

    /// Stable string form used as the data part of the deterministic id seed.
    pub fn preview(&self) -> String {
        match self {
            RawValue::Null => "null".to_string(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => n.to_string(),
            RawValue::Str(s) => s.clone(),
            RawValue::Array(_) => "[array]".to_string(),
            RawValue::Object(o) => format!("[object {}]", o.type_name),
            RawValue::Function(f) => format!("function {}", f.name),
            RawValue::Promise(_) => "[promise]".to_string(),
        }
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("Null"),
            RawValue::Bool(b) => write!(f, "Bool({})", b),
            RawValue::Number(n) => write!(f, "Number({})", n),
            RawValue::Str(s) => write!(f, "Str({:?})", s),
            RawValue::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            RawValue::Object(o) => write!(f, "Object({})", o.type_name),
            RawValue::Function(func) => write!(f, "Function({})", func.name),
            RawValue::Promise(_) => f.write_str("Promise"),
        }
    }
}

/// Identity comparison for reference values, structural for primitives.
impl PartialEq for RawValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RawValue::Null, RawValue::Null) => true,
            (RawValue::Bool(a), RawValue::Bool(b)) => a == b,
            (RawValue::Number(a), RawValue::Number(b)) => a == b,
            (RawValue::Str(a), RawValue::Str(b)) => a == b,
            (RawValue::Array(a), RawValue::Array(b)) => Rc::ptr_eq(a, b),
            (RawValue::Object(a), RawValue::Object(b)) => Rc::ptr_eq(a, b),
            (RawValue::Function(a), RawValue::Function(b)) => Rc::ptr_eq(a, b),
            (RawValue::Promise(a), RawValue::Promise(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Display summary of a value, used to label graph nodes at the render
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

pub fn value_info(value: &RawValue) -> ValueInfo {
    let mut info = ValueInfo {
        name: value.type_tag().to_string(),
        label: None,
        fields: BTreeMap::new(),
    };
    match value {
        RawValue::Object(object) => {
            info.name = object.type_name.clone();
            for name in object.field_names() {
                match object.get(&name) {
                    Some(RawValue::Str(s)) if name == "label" => {
                        if !s.is_empty() {
                            info.label = Some(s);
                        }
                    }
                    Some(RawValue::Str(s)) => {
                        info.fields.insert(name, serde_json::Value::from(s));
                    }
                    Some(RawValue::Number(n)) => {
                        info.fields.insert(name, serde_json::Value::from(n));
                    }
                    Some(RawValue::Bool(b)) => {
                        info.fields.insert(name, serde_json::Value::from(b));
                    }
                    _ => {}
                }
            }
        }
        RawValue::Str(s) => {
            info.label = Some(s.clone());
        }
        RawValue::Number(n) => {
            info.label = Some(n.to_string());
        }
        RawValue::Function(func) => {
            info.label = Some(func.name.clone());
        }
        _ => {}
    }
    info
}
