//! Host values that cross the bridge by handle.
//!
//! `HostValue` is the host object graph as the bridge sees it. Shared
//! variants (`Object`, `Function`, `Error`, `Resource`) are reference
//! counted, so cloning a value never copies the underlying object and
//! identity comparisons stay meaningful.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::HostError;
use crate::function::HostFunction;
use crate::resource::ResourceToken;

/// A value owned by the host.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(Rc<str>),
    Object(Rc<HostObject>),
    Function(HostFunction),
    Error(Rc<ErrorValue>),
    Resource(ResourceToken),
}

impl HostValue {
    /// Build a string value.
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Self::String(text.into())
    }

    /// Build an error value.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(Rc::new(ErrorValue::new(name, message)))
    }

    /// Host type name, as reported by the host's `typeof`.
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Null | Self::Object(_) | Self::Error(_) | Self::Resource(_) => "object",
        }
    }

    /// `undefined` or `null`.
    pub fn is_like_none(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<HostObject>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceToken> {
        match self {
            Self::Resource(token) => Some(token),
            _ => None,
        }
    }

    /// Strict equality: value equality for primitives, identity for shared values.
    ///
    /// `NaN` is never equal to itself and `0.0 == -0.0`, as with the host's `===`.
    pub fn strict_eq(&self, other: &HostValue) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Error(a), Self::Error(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.same(b),
            (Self::Resource(a), Self::Resource(b)) => a.same(b),
            _ => false,
        }
    }

    /// Human-readable rendering used for diagnostics and `debug_string`.
    pub fn debug_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".into(),
            Self::Null => "null".into(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::BigInt(n) => n.to_string(),
            Self::String(s) => format!("\"{}\"", s),
            Self::Function(f) => match f.name() {
                "" => "Function".into(),
                name => format!("Function({})", name),
            },
            Self::Error(e) => format!("{}: {}", e.name, e.message),
            Self::Resource(token) => token.class_name().to_owned(),
            Self::Object(obj) => {
                if obj.class() != "Object" {
                    return obj.class().to_owned();
                }
                let props = obj.props.borrow();
                let body: Vec<String> = props
                    .iter()
                    .map(|(k, v)| format!("\"{}\":{}", k, v.debug_string()))
                    .collect();
                format!("Object({{{}}})", body.join(","))
            }
        }
    }
}

/// Render a number the way the host prints it.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else {
        n.to_string()
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        Self::Object(Rc::new(obj))
    }
}

impl From<HostFunction> for HostValue {
    fn from(f: HostFunction) -> Self {
        Self::Function(f)
    }
}

impl From<ResourceToken> for HostValue {
    fn from(token: ResourceToken) -> Self {
        Self::Resource(token)
    }
}

/// A shared, mutable property bag standing in for host objects (elements,
/// events, plain records).
#[derive(Debug)]
pub struct HostObject {
    class: String,
    props: RefCell<BTreeMap<String, HostValue>>,
    frozen: Cell<bool>,
}

impl HostObject {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            props: RefCell::new(BTreeMap::new()),
            frozen: Cell::new(false),
        }
    }

    /// A plain `Object`.
    pub fn plain() -> Self {
        Self::new("Object")
    }

    /// Builder-style property initialisation.
    pub fn with(self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.props.borrow_mut().insert(key.into(), value.into());
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Read a property; missing properties read as `undefined`.
    pub fn get(&self, key: &str) -> HostValue {
        self.props.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.props.borrow().contains_key(key)
    }

    /// Write a property. Fails on frozen objects.
    pub fn set(&self, key: &str, value: HostValue) -> Result<(), HostError> {
        if self.frozen.get() {
            return Err(HostError::ReadOnly {
                class: self.class.clone(),
                key: key.to_owned(),
            });
        }
        self.props.borrow_mut().insert(key.to_owned(), value);
        Ok(())
    }

    /// Reject all further writes.
    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.borrow().keys().cloned().collect()
    }
}

/// An error object (`name: message`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    name: String,
    message: String,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
