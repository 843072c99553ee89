//! Always-available built-ins: clock, conversions, math and `embed`.

use futures_util::future::{BoxFuture, FutureExt};

use super::{Export, Namespace};
use crate::bridge::embed::embed;
use crate::error::RuntimeError;
use crate::runtime::interpreter::{Interpreter, Unwind};
use crate::runtime::value::{NativeCall, Value};
use crate::syntax::cst::Span;
use crate::types::number::{round, to_number};
use crate::types::registry::{arg, invalid_arg, number_arg};
use crate::types::time::{from_millis, millis, parse_time, unit_arg};

pub struct CoreNamespace;

impl Namespace for CoreNamespace {
    fn name(&self) -> &'static str {
        "core"
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            // Clock
            Export::async_fn("now",      now),
            Export::async_fn("time",     time),
            Export::pure("duration",     duration),

            // Conversions
            Export::pure("number",       |_, args, _| Ok(Value::Number(number(arg(args, 0))))),
            Export::pure("string",       |_, args, _| Ok(Value::String(arg(args, 0).stringify()))),
            Export::pure("typeOf",       |_, args, _| Ok(Value::string(arg(args, 0).type_name()))),

            // Math
            Export::pure("floor",        |_, args, span| unary(args, "floor", span, f64::floor)),
            Export::pure("ceil",         |_, args, span| unary(args, "ceil", span, f64::ceil)),
            Export::pure("round",        |_, args, span| unary(args, "round", span, round)),
            Export::pure("abs",          |_, args, span| unary(args, "abs", span, f64::abs)),
            Export::pure("sqrt",         |_, args, span| unary(args, "sqrt", span, f64::sqrt)),
            Export::pure("pow",          |_, args, span| {
                Ok(Value::Number(number_arg(args, 0, "pow", span)?.powf(number_arg(args, 1, "pow", span)?)))
            }),
            Export::pure("min",          |_, args, span| fold(args, "min", span, f64::INFINITY, f64::min)),
            Export::pure("max",          |_, args, span| fold(args, "max", span, f64::NEG_INFINITY, f64::max)),

            // Embeds
            Export::pure("embed",        embed),
        ]
    }
}

// ─── Clock ────────────────────────────────────────────────────────────────────

fn now(interp: &mut Interpreter, _: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    let t = interp.now();
    async move { Ok(Value::Time(t)) }.boxed()
}

/// `time()` is now; `time(ms)` and `time(iso)` build an instant.
fn time(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    let now = interp.now();
    async move {
        let t = match call.arg(0) {
            Value::Null => Some(now),
            Value::Time(t) => Some(*t),
            Value::Number(ms) => from_millis(*ms),
            Value::String(s) => parse_time(s),
            other => {
                return Err(invalid_arg(call.span, format!(
                    "time expects milliseconds or an ISO string, got {}", other.type_name()
                )).into())
            }
        };
        let t = t.ok_or_else(|| {
            invalid_arg(call.span, format!("time: cannot read '{}' as a time", call.arg(0).stringify()))
        })?;
        Ok(Value::Time(t))
    }
    .boxed()
}

/// `duration(amount, unit = "ms")`
fn duration(_: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let amount = number_arg(args, 0, "duration", span)?;
    let unit = unit_arg(args, 1, "duration", span)?;
    Ok(Value::Duration(amount * unit.ms()))
}

// ─── Conversions ──────────────────────────────────────────────────────────────

fn number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::Number(n) | Value::Duration(n) => *n,
        Value::String(s) => to_number(s),
        Value::Time(t) => millis(t),
        _ => f64::NAN,
    }
}

// ─── Math ─────────────────────────────────────────────────────────────────────

fn unary(args: &[Value], what: &str, span: Span, f: fn(f64) -> f64) -> Result<Value, RuntimeError> {
    Ok(Value::Number(f(number_arg(args, 0, what, span)?)))
}

/// NaN anywhere wins; no arguments gives the identity.
fn fold(args: &[Value], what: &str, span: Span, init: f64, f: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    let mut acc = init;
    for i in 0..args.len() {
        let n = number_arg(args, i, what, span)?;
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        acc = f(acc, n);
    }
    Ok(Value::Number(acc))
}
