use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::RuntimeError;
use crate::runtime::interpreter::{Interpreter, Unwind};
use crate::runtime::scope::Scope;
use crate::syntax::cst::{FunctionLiteral, Span};

pub type Array = Arc<RwLock<Vec<Value>>>;

#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Arc<Object>),
    Function(Arc<Closure>),
    NativeFunction(Arc<Native>),
    Time(DateTime<Utc>),
    /// Length in milliseconds.
    Duration(f64),
}

/// A string-keyed property bag. Entity objects (message, member, ...) name
/// their class, whose method table is consulted after own properties.
pub struct Object {
    pub class: Option<&'static str>,
    pub props: RwLock<IndexMap<String, Value>>,
}

impl Object {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.props.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.props.write().insert(key.into(), value);
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A user function together with the scope chain it was defined in.
pub struct Closure {
    pub func: Arc<FunctionLiteral>,
    pub scope: Arc<Scope>,
}

// ─── Native functions ─────────────────────────────────────────────────────────

pub type PureFn = fn(&Value, &[Value], Span) -> Result<Value, RuntimeError>;

pub type AsyncFn = for<'a> fn(&'a mut Interpreter, NativeCall) -> BoxFuture<'a, Result<Value, Unwind>>;

#[derive(Clone, Copy)]
pub enum NativeFn {
    /// No interpreter access.
    Pure(PureFn),
    /// May call back into the interpreter or out to the host.
    Async(AsyncFn),
}

pub struct NativeCall {
    pub this: Value,
    pub args: Vec<Value>,
    pub span: Span,
}

impl NativeCall {
    pub fn arg(&self, i: usize) -> &Value {
        self.args.get(i).unwrap_or(&Value::Null)
    }
}

/// A built-in, optionally bound to the receiver it was looked up on.
pub struct Native {
    pub name: &'static str,
    pub func: NativeFn,
    pub this: Value,
}

// ─── Constructors ─────────────────────────────────────────────────────────────

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Arc::new(RwLock::new(items)))
    }

    pub fn object(props: IndexMap<String, Value>) -> Self {
        Self::Object(Arc::new(Object { class: None, props: RwLock::new(props) }))
    }

    pub fn entity(class: &'static str, props: IndexMap<String, Value>) -> Self {
        Self::Object(Arc::new(Object { class: Some(class), props: RwLock::new(props) }))
    }

    pub fn native(name: &'static str, func: NativeFn) -> Self {
        Self::NativeFunction(Arc::new(Native { name, func, this: Value::Null }))
    }

    pub fn bound(name: &'static str, func: NativeFn, this: Value) -> Self {
        Self::NativeFunction(Arc::new(Native { name, func, this }))
    }

    pub fn opt_string(s: Option<impl Into<String>>) -> Self {
        s.map_or(Self::Null, |s| Self::String(s.into()))
    }
}

// ─── Inspection ───────────────────────────────────────────────────────────────

impl Value {
    /// Name reported by `typeOf` and `.type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null              => "null",
            Self::Boolean(_)        => "boolean",
            Self::Number(_)         => "number",
            Self::String(_)         => "string",
            Self::Array(_)          => "array",
            Self::Object(o)         => o.class.unwrap_or("object"),
            Self::Function(_)
            | Self::NativeFunction(_) => "function",
            Self::Time(_)           => "time",
            Self::Duration(_)       => "duration",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            _ => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Same variant and content; arrays, objects and functions by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::NativeFunction(a), Self::NativeFunction(b)) => Arc::ptr_eq(a, b),
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            _ => false,
        }
    }

    /// The `toString` result, or `None` for variants without one (null, functions).
    pub fn to_display(&self) -> Option<String> {
        Some(match self {
            Self::Null | Self::Function(_) | Self::NativeFunction(_) => return None,
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(items) => {
                let mut out = String::new();
                join_display(items, &mut Vec::new(), &mut out);
                out
            }
            Self::Object(o) => match o.class {
                Some(class) => crate::bridge::entities::mention(class, o).unwrap_or_else(|| format!("[object {class}]")),
                None => "[object Object]".to_string(),
            },
            Self::Time(t) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Duration(ms) => crate::types::time::humanize(*ms),
        })
    }

    /// `to_display`, with a placeholder where there is no `toString`.
    pub fn stringify(&self) -> String {
        self.to_display().unwrap_or_else(|| "[no toString func]".to_string())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Numbers print the way script authors expect: no trailing `.0`, exponent
/// notation only for very large or very small magnitudes.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n == 0.0 {
        return "0".into();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let s = format!("{n:e}");
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        };
    }
    format!("{n}")
}

// ─── JSON conversion ──────────────────────────────────────────────────────────

/// Arrays nested deeper than this display as empty.
const MAX_DISPLAY_DEPTH: usize = 64;

/// Comma-joined display of an array. An array already being shown displays
/// as empty, and output stops growing once it passes the string limit.
fn join_display(items: &Array, open: &mut Vec<Array>, out: &mut String) {
    if open.len() >= MAX_DISPLAY_DEPTH || open.iter().any(|a| Arc::ptr_eq(a, items)) {
        return;
    }
    open.push(items.clone());
    for (i, v) in items.read().iter().enumerate() {
        if out.len() > crate::types::string::MAX_STRING_LEN {
            break;
        }
        if i > 0 {
            out.push(',');
        }
        match v {
            Value::Array(inner) => join_display(inner, open, out),
            other => out.push_str(&other.to_display().unwrap_or_default()),
        }
    }
    open.pop();
}

impl Value {
    /// Plain data for replies and host payloads. Entities become their
    /// mention strings, times ISO strings, durations milliseconds.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null | Self::Function(_) | Self::NativeFunction(_) => J::Null,
            Self::Boolean(b) => J::Bool(*b),
            Self::Number(n) => json_number(*n),
            Self::String(s) => J::String(s.clone()),
            Self::Array(items) => J::Array(items.read().iter().map(Value::to_json).collect()),
            Self::Object(o) => match o.class.and_then(|c| crate::bridge::entities::mention(c, o)) {
                Some(mention) => J::String(mention),
                None => J::Object(o.props.read().iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            },
            Self::Time(t) => J::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Duration(ms) => json_number(*ms),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Self::Null,
            J::Bool(b) => Self::Boolean(*b),
            J::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Self::String(s.clone()),
            J::Array(items) => Self::array(items.iter().map(Value::from_json).collect()),
            J::Object(map) => Self::object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect()),
        }
    }
}

/// Integral values stay integers so hosts see `3`, not `3.0`.
fn json_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

// ─── Debug ────────────────────────────────────────────────────────────────────

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Array(items) => f.debug_list().entries(items.read().iter()).finish(),
            Self::Object(o) => {
                if let Some(class) = o.class {
                    write!(f, "{class} ")?;
                }
                f.debug_map().entries(o.props.read().iter()).finish()
            }
            Self::Function(c) => write!(f, "<func {}>", c.func.name.as_deref().unwrap_or("anonymous")),
            Self::NativeFunction(n) => write!(f, "<native {}>", n.name),
            Self::Time(t) => write!(f, "Time({t})"),
            Self::Duration(ms) => write!(f, "Duration({ms}ms)"),
        }
    }
}
