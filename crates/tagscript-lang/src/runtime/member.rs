//! Property protocol: reading `a.b` / `a[b]`, writing through them, and the
//! assignable places produced for assignment targets.

use std::sync::Arc;

use crate::error::{ErrorCode, RuntimeError};
use crate::runtime::scope::Scope;
use crate::runtime::value::{format_number, Value};
use crate::syntax::cst::Span;
use crate::types::array;
use crate::types::registry::{Lookup, TYPES};
use crate::types::string::{utf16_len, utf16_unit};

/// Something an assignment can write to, with its current value cached.
pub enum Place {
    Variable { scope: Arc<Scope>, name: String, value: Value },
    Member { parent: Value, key: Value, value: Value },
}

impl Place {
    pub fn value(&self) -> &Value {
        match self {
            Self::Variable { value, .. } | Self::Member { value, .. } => value,
        }
    }

    /// Store `new` and refresh the cached value.
    pub fn update(&mut self, new: Value, span: Span) -> Result<(), RuntimeError> {
        match self {
            Self::Variable { scope, name, value } => {
                scope.declare(name.clone(), new.clone());
                *value = new;
            }
            Self::Member { parent, key, value } => {
                set_member(parent, key, new.clone(), span)?;
                *value = new;
            }
        }
        Ok(())
    }
}

/// Property key as used for objects: strings as-is, numbers printed.
pub fn property_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.stringify(),
    }
}

/// `target[key]`
pub fn get_member(target: &Value, key: &Value, span: Span) -> Result<Value, RuntimeError> {
    match (target, key) {
        (Value::Null, _) => Err(null_access(&property_key(key), span)),
        (Value::String(s), Value::Number(n)) => Ok(index_of(*n, utf16_len(s))
            .and_then(|i| utf16_unit(s, i))
            .map_or(Value::Null, Value::String)),
        (Value::Array(items), Value::Number(n)) => {
            let items = items.read();
            Ok(index_of(*n, items.len()).and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null))
        }
        _ => get_prop(target, &property_key(key), span),
    }
}

/// `target.key`
pub fn get_prop(target: &Value, key: &str, span: Span) -> Result<Value, RuntimeError> {
    if let Value::Null = target {
        return Err(null_access(key, span));
    }
    if let Value::Object(o) = target {
        if let Some(v) = o.get(key) {
            return Ok(v);
        }
    }
    if let Value::Array(items) = target {
        if let Ok(i) = key.parse::<usize>() {
            return Ok(items.read().get(i).cloned().unwrap_or(Value::Null));
        }
    }
    Ok(match TYPES.lookup(target, key) {
        Some(Lookup::Field(v)) => v,
        Some(Lookup::Method(name, func)) => Value::bound(name, func, target.clone()),
        None => Value::Null,
    })
}

/// `target[key] = value`
pub fn set_member(target: &Value, key: &Value, value: Value, span: Span) -> Result<(), RuntimeError> {
    match target {
        Value::Null => Err(RuntimeError::new(ErrorCode::R004, span.line, span.column, format!(
            "cannot set property '{}' of null", property_key(key)
        ))),
        Value::Array(items) => {
            let index = match key {
                Value::Number(n) => Some(*n),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            match index {
                Some(n) if n >= 0.0 && n.fract() == 0.0 && n < (u32::MAX as f64) => {
                    let i = n as usize;
                    let mut items = items.write();
                    if i >= items.len() {
                        array::check_len(i + 1, span)?;
                        items.resize(i + 1, Value::Null);
                    }
                    items[i] = value;
                    Ok(())
                }
                _ => Err(cannot_set(target, key, span)),
            }
        }
        Value::Object(o) => {
            o.set(property_key(key), value);
            Ok(())
        }
        _ => Err(cannot_set(target, key, span)),
    }
}

/// Integral, in-range index.
fn index_of(n: f64, len: usize) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < len as f64).then_some(n as usize)
}

fn null_access(key: &str, span: Span) -> RuntimeError {
    RuntimeError::new(ErrorCode::R004, span.line, span.column, format!("cannot read property '{key}' of null"))
}

fn cannot_set(target: &Value, key: &Value, span: Span) -> RuntimeError {
    let key = match key {
        Value::Number(n) => format_number(*n),
        other => property_key(other),
    };
    RuntimeError::new(ErrorCode::R011, span.line, span.column, format!(
        "cannot set property '{key}' on {}", target.type_name()
    ))
}
