//! Per-variant property and method tables, built once per process.
//!
//! Lookup order for `value.key` after own object properties:
//!   entity class table → the variant's table → the common table.
//!
//! Adding a method = one entry in the owning type's descriptor. No edits to
//! the interpreter needed.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{ErrorCode, RuntimeError};
use crate::runtime::value::{AsyncFn, NativeFn, PureFn, Value};
use crate::syntax::cst::Span;

// ─── Descriptors ──────────────────────────────────────────────────────────────

/// Read a computed property. Caller guarantees `v` is the right variant.
pub type FieldGetter = fn(&Value) -> Value;

pub struct FieldDesc {
    pub name: &'static str,
    pub get:  FieldGetter,
}

pub struct MethodDesc {
    pub name: &'static str,
    pub func: NativeFn,
}

pub struct TypeDesc {
    pub name:    &'static str,
    pub fields:  Vec<FieldDesc>,
    pub methods: Vec<MethodDesc>,
}

impl TypeDesc {
    pub fn new(name: &'static str) -> Self {
        Self { name, fields: Vec::new(), methods: Vec::new() }
    }

    pub fn field(mut self, name: &'static str, get: FieldGetter) -> Self {
        self.fields.push(FieldDesc { name, get });
        self
    }

    pub fn method(mut self, name: &'static str, func: PureFn) -> Self {
        self.methods.push(MethodDesc { name, func: NativeFn::Pure(func) });
        self
    }

    pub fn async_method(mut self, name: &'static str, func: AsyncFn) -> Self {
        self.methods.push(MethodDesc { name, func: NativeFn::Async(func) });
        self
    }
}

/// What a table lookup found.
pub enum Lookup {
    Field(Value),
    Method(&'static str, NativeFn),
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct TypeRegistry {
    types: HashMap<&'static str, TypeDesc>,
}

pub static TYPES: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::standard);

impl TypeRegistry {
    pub fn new() -> Self {
        Self { types: HashMap::new() }
    }

    pub fn register(&mut self, desc: TypeDesc) {
        self.types.insert(desc.name, desc);
    }

    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(common_desc());
        r.register(super::number::number_desc());
        r.register(super::string::string_desc());
        r.register(super::array::array_desc());
        r.register(super::object::object_desc());
        r.register(super::time::time_desc());
        r.register(super::time::duration_desc());
        for class in crate::bridge::entities::classes() {
            r.register(class);
        }
        r.register(crate::bridge::embed::embed_desc());
        r
    }

    pub fn get(&self, name: &str) -> Option<&TypeDesc> {
        self.types.get(name)
    }

    /// Resolve `key` on `v` through its class, variant and common tables.
    pub fn lookup(&self, v: &Value, key: &str) -> Option<Lookup> {
        let class = match v {
            Value::Object(o) => o.class,
            _ => None,
        };
        let chain = class.into_iter().chain([type_key(v), "common"]);

        for name in chain {
            let Some(desc) = self.types.get(name) else { continue };
            if let Some(f) = desc.fields.iter().find(|f| f.name == key) {
                return Some(Lookup::Field((f.get)(v)));
            }
            if let Some(m) = desc.methods.iter().find(|m| m.name == key) {
                if name == "common" && key == "toString" && v.to_display().is_none() {
                    return None;
                }
                return Some(Lookup::Method(m.name, m.func));
            }
        }
        None
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ─── Type key ─────────────────────────────────────────────────────────────────

/// The variant's table name. Entity classes are looked up separately.
pub fn type_key(v: &Value) -> &'static str {
    match v {
        Value::Null               => "null",
        Value::Boolean(_)         => "boolean",
        Value::Number(_)          => "number",
        Value::String(_)          => "string",
        Value::Array(_)           => "array",
        Value::Object(_)          => "object",
        Value::Function(_)
        | Value::NativeFunction(_) => "function",
        Value::Time(_)            => "time",
        Value::Duration(_)        => "duration",
    }
}

fn common_desc() -> TypeDesc {
    TypeDesc::new("common")
        .field("type", |v| Value::string(v.type_name()))
        .method("toString", |this, _, _| Ok(Value::String(this.stringify())))
}

// ─── Argument helpers ─────────────────────────────────────────────────────────

pub fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::Null)
}

pub fn invalid_arg(span: Span, msg: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorCode::R007, span.line, span.column, msg)
}

/// A string or array grown past its limit.
pub fn too_large(span: Span, msg: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorCode::R012, span.line, span.column, msg)
}

pub fn number_arg(args: &[Value], i: usize, what: &str, span: Span) -> Result<f64, RuntimeError> {
    match arg(args, i) {
        Value::Number(n) => Ok(*n),
        other => Err(invalid_arg(span, format!("{what} expects a number, got {}", other.type_name()))),
    }
}

/// A number argument that may be left out.
pub fn opt_number_arg(args: &[Value], i: usize, what: &str, span: Span) -> Result<Option<f64>, RuntimeError> {
    match arg(args, i) {
        Value::Null => Ok(None),
        _ => number_arg(args, i, what, span).map(Some),
    }
}

pub fn string_arg(args: &[Value], i: usize, what: &str, span: Span) -> Result<String, RuntimeError> {
    match arg(args, i) {
        Value::String(s) => Ok(s.clone()),
        other => Err(invalid_arg(span, format!("{what} expects a string, got {}", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_table_serves_every_variant_but_null_and_functions() {
        assert!(matches!(TYPES.lookup(&Value::Boolean(true), "toString"), Some(Lookup::Method("toString", _))));
        assert!(TYPES.lookup(&Value::Null, "toString").is_none());
        assert!(TYPES.lookup(&Value::native("f", NativeFn::Pure(|_, _, _| Ok(Value::Null))), "toString").is_none());
    }

    #[test]
    fn type_field() {
        let Some(Lookup::Field(v)) = TYPES.lookup(&Value::Duration(1.0), "type") else { panic!() };
        assert_eq!(v.as_str(), Some("duration"));
    }

    #[test]
    fn variant_table_wins_over_common() {
        // Number has its own radix-aware toString.
        let Some(Lookup::Method(_, NativeFn::Pure(f))) = TYPES.lookup(&Value::Number(255.0), "toString") else {
            panic!()
        };
        let out = f(&Value::Number(255.0), &[Value::Number(16.0)], Span::default()).unwrap();
        assert_eq!(out.as_str(), Some("ff"));
    }

    #[test]
    fn argument_helpers_report_types() {
        let e = number_arg(&[Value::string("x")], 0, "floor", Span::new(2, 3)).unwrap_err();
        assert_eq!(e.code, ErrorCode::R007);
        assert_eq!((e.line, e.column), (2, 3));
        assert_eq!(opt_number_arg(&[], 0, "f", Span::default()).unwrap(), None);
    }
}
