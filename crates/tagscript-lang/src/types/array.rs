//! Array methods. Callback methods are async natives: they call back into
//! the interpreter with `(item, index, array)` and work on a snapshot taken
//! when the method starts.

use std::cmp::Ordering;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::RuntimeError;
use crate::runtime::interpreter::{Interpreter, Unwind};
use crate::runtime::value::{NativeCall, Value};
use crate::syntax::cst::Span;
use crate::types::registry::{arg, invalid_arg, opt_number_arg, too_large, TypeDesc};
use crate::types::string;

/// Most elements one array can hold.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// R012 unless an array of `len` elements fits under [`MAX_ARRAY_LEN`].
pub fn check_len(len: usize, span: Span) -> Result<(), RuntimeError> {
    if len > MAX_ARRAY_LEN {
        return Err(too_large(span, format!("array would exceed {MAX_ARRAY_LEN} elements")));
    }
    Ok(())
}

pub fn array_desc() -> TypeDesc {
    TypeDesc::new("array")
        .field("length", |v| Value::Number(snapshot(v).len() as f64))
        .method("push", |this, args, span| {
            let Value::Array(items) = this else { return Ok(Value::Null) };
            let mut items = items.write();
            check_len(items.len() + args.len(), span)?;
            items.extend(args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        })
        .method("pop", |this, _, _| {
            let Value::Array(items) = this else { return Ok(Value::Null) };
            Ok(items.write().pop().unwrap_or(Value::Null))
        })
        .method("shift", |this, _, _| {
            let Value::Array(items) = this else { return Ok(Value::Null) };
            let mut items = items.write();
            Ok(if items.is_empty() { Value::Null } else { items.remove(0) })
        })
        .method("unshift", |this, args, span| {
            let Value::Array(items) = this else { return Ok(Value::Null) };
            let mut items = items.write();
            check_len(items.len() + args.len(), span)?;
            items.splice(0..0, args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        })
        .method("slice", slice)
        .method("concat", |this, args, span| {
            let mut out = snapshot(this);
            for a in args {
                match a {
                    Value::Array(more) => {
                        let more = more.read();
                        check_len(out.len() + more.len(), span)?;
                        out.extend(more.iter().cloned());
                    }
                    other => {
                        check_len(out.len() + 1, span)?;
                        out.push(other.clone());
                    }
                }
            }
            Ok(Value::array(out))
        })
        .method("join", |this, args, span| {
            let sep = match arg(args, 0) {
                Value::Null => ",".to_string(),
                other => other.stringify(),
            };
            let parts: Vec<String> = snapshot(this).iter().map(|v| v.to_display().unwrap_or_default()).collect();
            let len = parts.iter().map(String::len).sum::<usize>() + sep.len() * parts.len().saturating_sub(1);
            string::check_len(len, span)?;
            Ok(Value::String(parts.join(&sep)))
        })
        .method("indexOf", |this, args, _| {
            let needle = arg(args, 0);
            let at = snapshot(this).iter().position(|v| v.equals(needle));
            Ok(Value::Number(at.map_or(-1.0, |i| i as f64)))
        })
        .method("includes", |this, args, _| {
            let needle = arg(args, 0);
            Ok(Value::Boolean(snapshot(this).iter().any(|v| v.equals(needle))))
        })
        .method("reverse", |this, _, _| {
            if let Value::Array(items) = this {
                items.write().reverse();
            }
            Ok(this.clone())
        })
        .async_method("sort", sort)
        .async_method("map", map)
        .async_method("filter", filter)
        .async_method("find", find)
        .async_method("findIndex", find_index)
        .async_method("forEach", for_each)
        .async_method("some", some)
        .async_method("every", every)
        .async_method("reduce", reduce)
}

/// Copy of the elements, so no lock is held while script code runs.
pub fn snapshot(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.read().clone(),
        _ => Vec::new(),
    }
}

fn slice(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let items = snapshot(this);
    let len = items.len() as f64;
    let resolve = |n: f64| {
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        (if n < 0.0 { (len + n).max(0.0) } else { n.min(len) }) as usize
    };
    let start = resolve(opt_number_arg(args, 0, "slice", span)?.unwrap_or(0.0));
    let end = resolve(opt_number_arg(args, 1, "slice", span)?.unwrap_or(len));
    Ok(Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
}

// ─── Callback methods ─────────────────────────────────────────────────────────

fn callback(call: &NativeCall, what: &str) -> Result<Value, RuntimeError> {
    match call.arg(0) {
        f @ (Value::Function(_) | Value::NativeFunction(_)) => Ok(f.clone()),
        other => Err(invalid_arg(call.span, format!("{what} expects a function, got {}", other.type_name()))),
    }
}

/// Run `f(item, index, array)` for each element, stopping when `stop`
/// returns true for a result. Returns the index and item it stopped on.
async fn scan(
    interp: &mut Interpreter,
    call: &NativeCall,
    what: &str,
    stop: fn(&Value) -> bool,
) -> Result<Option<(usize, Value)>, Unwind> {
    let f = callback(call, what)?;
    for (i, item) in snapshot(&call.this).into_iter().enumerate() {
        let args = vec![item.clone(), Value::Number(i as f64), call.this.clone()];
        let out = interp.call(f.clone(), args, call.span).await?;
        if stop(&out) {
            return Ok(Some((i, item)));
        }
    }
    Ok(None)
}

fn map(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let f = callback(&call, "map")?;
        let items = snapshot(&call.this);
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let args = vec![item, Value::Number(i as f64), call.this.clone()];
            out.push(interp.call(f.clone(), args, call.span).await?);
        }
        Ok(Value::array(out))
    }
    .boxed()
}

fn filter(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let f = callback(&call, "filter")?;
        let mut out = Vec::new();
        for (i, item) in snapshot(&call.this).into_iter().enumerate() {
            let args = vec![item.clone(), Value::Number(i as f64), call.this.clone()];
            if interp.call(f.clone(), args, call.span).await?.truthy() {
                out.push(item);
            }
        }
        Ok(Value::array(out))
    }
    .boxed()
}

fn find(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let hit = scan(interp, &call, "find", Value::truthy).await?;
        Ok(hit.map_or(Value::Null, |(_, item)| item))
    }
    .boxed()
}

fn find_index(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let hit = scan(interp, &call, "findIndex", Value::truthy).await?;
        Ok(Value::Number(hit.map_or(-1.0, |(i, _)| i as f64)))
    }
    .boxed()
}

fn for_each(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        scan(interp, &call, "forEach", |_| false).await?;
        Ok(Value::Null)
    }
    .boxed()
}

fn some(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let hit = scan(interp, &call, "some", Value::truthy).await?;
        Ok(Value::Boolean(hit.is_some()))
    }
    .boxed()
}

fn every(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let miss = scan(interp, &call, "every", |v| !v.truthy()).await?;
        Ok(Value::Boolean(miss.is_none()))
    }
    .boxed()
}

fn reduce(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let f = callback(&call, "reduce")?;
        let mut items = snapshot(&call.this).into_iter().enumerate();
        let mut acc = match call.args.get(1) {
            Some(initial) => initial.clone(),
            None => match items.next() {
                Some((_, first)) => first,
                None => return Err(invalid_arg(call.span, "reduce of empty array with no initial value").into()),
            },
        };
        for (i, item) in items {
            let args = vec![acc, item, Value::Number(i as f64), call.this.clone()];
            acc = interp.call(f.clone(), args, call.span).await?;
        }
        Ok(acc)
    }
    .boxed()
}

// ─── Sorting ──────────────────────────────────────────────────────────────────

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or_else(|| y.is_nan().cmp(&x.is_nan()).reverse()),
        _ => a.stringify().cmp(&b.stringify()),
    }
}

/// Sorts in place and returns the array. With a comparator, a stable
/// bottom-up merge sort awaits each comparison.
fn sort(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let Value::Array(target) = &call.this else { return Ok(Value::Null) };
        let mut items = snapshot(&call.this);

        match call.arg(0) {
            Value::Null => items.sort_by(default_order),
            _ => {
                let f = callback(&call, "sort")?;
                let mut width = 1;
                while width < items.len() {
                    let mut merged = Vec::with_capacity(items.len());
                    for chunk in items.chunks(width * 2) {
                        let (left, right) = chunk.split_at(width.min(chunk.len()));
                        let (mut l, mut r) = (0, 0);
                        while l < left.len() && r < right.len() {
                            let args = vec![left[l].clone(), right[r].clone()];
                            let order = interp.call(f.clone(), args, call.span).await?;
                            if order.as_number().is_some_and(|n| n > 0.0) {
                                merged.push(right[r].clone());
                                r += 1;
                            } else {
                                merged.push(left[l].clone());
                                l += 1;
                            }
                        }
                        merged.extend_from_slice(&left[l..]);
                        merged.extend_from_slice(&right[r..]);
                    }
                    items = merged;
                    width *= 2;
                }
            }
        }

        *target.write() = items;
        Ok(call.this.clone())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::runtime::value::NativeFn;
    use crate::types::registry::{Lookup, TYPES};

    fn call(this: &Value, name: &str, args: &[Value]) -> Value {
        let Some(Lookup::Method(_, NativeFn::Pure(f))) = TYPES.lookup(this, name) else { panic!() };
        f(this, args, Span::default()).unwrap()
    }

    fn nums(ns: &[f64]) -> Value {
        Value::array(ns.iter().map(|n| Value::Number(*n)).collect())
    }

    #[test]
    fn push_pop_shift_unshift() {
        let a = nums(&[2.0]);
        assert_eq!(call(&a, "push", &[Value::Number(3.0)]).as_number(), Some(2.0));
        assert_eq!(call(&a, "unshift", &[Value::Number(1.0)]).as_number(), Some(3.0));
        assert_eq!(a.stringify(), "1,2,3");
        assert_eq!(call(&a, "pop", &[]).as_number(), Some(3.0));
        assert_eq!(call(&a, "shift", &[]).as_number(), Some(1.0));
        assert!(call(&nums(&[]), "pop", &[]).is_null());
    }

    #[test]
    fn slice_concat_join() {
        let a = nums(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(call(&a, "slice", &[Value::Number(1.0), Value::Number(-1.0)]).stringify(), "2,3");
        assert_eq!(call(&a, "concat", &[nums(&[5.0]), Value::Number(6.0)]).stringify(), "1,2,3,4,5,6");
        assert_eq!(call(&a, "join", &[Value::string(" ")]).stringify(), "1 2 3 4");
        assert_eq!(call(&a, "indexOf", &[Value::Number(3.0)]).as_number(), Some(2.0));
        assert!(!call(&a, "includes", &[Value::string("3")]).truthy());
    }

    #[test]
    fn growth_past_the_limit_fails() {
        let fail = |this: &Value, name: &str, args: &[Value]| {
            let Some(Lookup::Method(_, NativeFn::Pure(f))) = TYPES.lookup(this, name) else { panic!() };
            f(this, args, Span::default()).unwrap_err().code
        };
        let full = Value::array(vec![Value::Null; MAX_ARRAY_LEN]);
        assert_eq!(fail(&full, "push", &[Value::Number(1.0)]), ErrorCode::R012);
        assert_eq!(fail(&full, "unshift", &[Value::Number(1.0)]), ErrorCode::R012);
        assert_eq!(snapshot(&full).len(), MAX_ARRAY_LEN);

        let half = Value::array(vec![Value::Null; MAX_ARRAY_LEN / 2 + 1]);
        assert_eq!(fail(&half, "concat", &[half.clone()]), ErrorCode::R012);

        let text = Value::String("a".repeat(string::MAX_STRING_LEN / 2 + 1));
        let twice = Value::array(vec![text.clone(), text]);
        assert_eq!(fail(&twice, "join", &[]), ErrorCode::R012);
    }

    #[test]
    fn reverse_is_in_place() {
        let a = nums(&[1.0, 2.0]);
        let out = call(&a, "reverse", &[]);
        assert!(out.equals(&a));
        assert_eq!(a.stringify(), "2,1");
    }

    #[test]
    fn default_order_is_numeric_for_numbers() {
        let mut v = vec![Value::Number(10.0), Value::Number(9.0), Value::Number(100.0)];
        v.sort_by(default_order);
        assert_eq!(Value::array(v).stringify(), "9,10,100");
        let mut v = vec![Value::string("b"), Value::string("a")];
        v.sort_by(default_order);
        assert_eq!(Value::array(v).stringify(), "a,b");
    }
}
