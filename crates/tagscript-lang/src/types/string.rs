//! String methods. Lengths and indices count UTF-16 code units, so script
//! authors get the same answers their chat client's JavaScript would.

use crate::error::RuntimeError;
use crate::runtime::value::Value;
use crate::syntax::cst::Span;
use crate::types::registry::{arg, invalid_arg, number_arg, opt_number_arg, string_arg, too_large, TypeDesc};

/// Longest string, in bytes, a script can build.
pub const MAX_STRING_LEN: usize = 1 << 20;

/// R012 unless a string of `len` bytes fits under [`MAX_STRING_LEN`].
pub fn check_len(len: usize, span: Span) -> Result<(), RuntimeError> {
    if len > MAX_STRING_LEN {
        return Err(too_large(span, format!("string would exceed {MAX_STRING_LEN} bytes")));
    }
    Ok(())
}

// ─── UTF-16 helpers ───────────────────────────────────────────────────────────

pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// The `i`-th UTF-16 unit as its own string. Lone surrogates come back as
/// U+FFFD.
pub fn utf16_unit(s: &str, i: usize) -> Option<String> {
    s.encode_utf16().nth(i).map(|u| String::from_utf16_lossy(&[u]))
}

pub fn utf16_units(s: &str) -> Vec<String> {
    s.encode_utf16().map(|u| String::from_utf16_lossy(&[u])).collect()
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(u: &[u16]) -> String {
    String::from_utf16_lossy(u)
}

/// Resolve a possibly negative index against `len`, clamped into `0..=len`.
fn relative(n: f64, len: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn this_str(this: &Value) -> &str {
    this.as_str().unwrap_or_default()
}

// ─── Table ────────────────────────────────────────────────────────────────────

pub fn string_desc() -> TypeDesc {
    TypeDesc::new("string")
        .field("length", |v| Value::Number(utf16_len(this_str(v)) as f64))
        .method("split", split)
        .method("trim", |this, _, _| Ok(Value::string(this_str(this).trim())))
        .method("trimStart", |this, _, _| Ok(Value::string(this_str(this).trim_start())))
        .method("trimEnd", |this, _, _| Ok(Value::string(this_str(this).trim_end())))
        .method("toLowerCase", |this, _, _| Ok(Value::String(this_str(this).to_lowercase())))
        .method("toUpperCase", |this, _, _| Ok(Value::String(this_str(this).to_uppercase())))
        .method("includes", |this, args, span| {
            let needle = string_arg(args, 0, "includes", span)?;
            Ok(Value::Boolean(this_str(this).contains(needle.as_str())))
        })
        .method("startsWith", |this, args, span| {
            let needle = string_arg(args, 0, "startsWith", span)?;
            Ok(Value::Boolean(this_str(this).starts_with(needle.as_str())))
        })
        .method("endsWith", |this, args, span| {
            let needle = string_arg(args, 0, "endsWith", span)?;
            Ok(Value::Boolean(this_str(this).ends_with(needle.as_str())))
        })
        .method("indexOf", index_of)
        .method("replace", |this, args, span| {
            let from = string_arg(args, 0, "replace", span)?;
            let to = arg(args, 1).stringify();
            check_len(this_str(this).len() + to.len(), span)?;
            Ok(Value::String(this_str(this).replacen(from.as_str(), &to, 1)))
        })
        .method("replaceAll", |this, args, span| {
            let from = string_arg(args, 0, "replaceAll", span)?;
            let to = arg(args, 1).stringify();
            if from.is_empty() {
                return Err(invalid_arg(span, "replaceAll expects a non-empty search string"));
            }
            let s = this_str(this);
            let hits = s.matches(from.as_str()).count();
            check_len(s.len() - hits * from.len() + hits * to.len(), span)?;
            Ok(Value::String(this_str(this).replace(from.as_str(), &to)))
        })
        .method("slice", slice)
        .method("substring", substring)
        .method("repeat", repeat)
        .method("padStart", |this, args, span| pad(this, args, span, true))
        .method("padEnd", |this, args, span| pad(this, args, span, false))
        .method("charAt", |this, args, span| {
            let i = number_arg(args, 0, "charAt", span)?;
            let s = this_str(this);
            let unit = (i >= 0.0 && i.fract() == 0.0).then(|| utf16_unit(s, i as usize)).flatten();
            Ok(Value::String(unit.unwrap_or_default()))
        })
        .method("charCodeAt", |this, args, span| {
            let i = opt_number_arg(args, 0, "charCodeAt", span)?.unwrap_or(0.0);
            let code = (i >= 0.0 && i.fract() == 0.0)
                .then(|| this_str(this).encode_utf16().nth(i as usize))
                .flatten();
            Ok(Value::Number(code.map_or(f64::NAN, f64::from)))
        })
        .method("toNumber", |this, _, _| Ok(Value::Number(super::number::to_number(this_str(this)))))
}

fn split(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let s = this_str(this);
    let limit = opt_number_arg(args, 1, "split", span)?.map(|n| n.max(0.0) as usize);
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Null => vec![Value::string(s)],
        Value::String(sep) if sep.is_empty() => utf16_units(s).into_iter().map(Value::String).collect(),
        Value::String(sep) => s.split(sep.as_str()).map(Value::string).collect(),
        other => return Err(invalid_arg(span, format!("split expects a string, got {}", other.type_name()))),
    };
    let parts = match limit {
        Some(n) => parts.into_iter().take(n).collect(),
        None => parts,
    };
    Ok(Value::array(parts))
}

fn index_of(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let s = this_str(this);
    let needle = string_arg(args, 0, "indexOf", span)?;
    let from = relative(opt_number_arg(args, 1, "indexOf", span)?.unwrap_or(0.0).max(0.0), utf16_len(s));
    let hay = units(s);
    let needle = units(&needle);
    let found = (from..=hay.len().saturating_sub(needle.len()))
        .find(|&i| hay.len() >= needle.len() && hay[i..i + needle.len()] == needle[..]);
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn slice(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let u = units(this_str(this));
    let start = relative(opt_number_arg(args, 0, "slice", span)?.unwrap_or(0.0), u.len());
    let end = relative(opt_number_arg(args, 1, "slice", span)?.unwrap_or(u.len() as f64), u.len());
    Ok(Value::String(if start < end { from_units(&u[start..end]) } else { String::new() }))
}

fn substring(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let u = units(this_str(this));
    let clamp = |n: f64| if n.is_nan() { 0 } else { n.clamp(0.0, u.len() as f64) as usize };
    let a = clamp(opt_number_arg(args, 0, "substring", span)?.unwrap_or(0.0));
    let b = clamp(opt_number_arg(args, 1, "substring", span)?.unwrap_or(u.len() as f64));
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::String(from_units(&u[lo..hi])))
}

fn repeat(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let s = this_str(this);
    let n = number_arg(args, 0, "repeat", span)?;
    if n.is_nan() || n < 0.0 || n.is_infinite() {
        return Err(invalid_arg(span, format!("repeat count must be a non-negative number, got {n}")));
    }
    let n = n as usize;
    check_len(s.len().saturating_mul(n), span)?;
    Ok(Value::String(s.repeat(n)))
}

fn pad(this: &Value, args: &[Value], span: Span, start: bool) -> Result<Value, RuntimeError> {
    let s = this_str(this);
    let what = if start { "padStart" } else { "padEnd" };
    let target = number_arg(args, 0, what, span)?.max(0.0) as usize;
    check_len(target, span)?;
    let fill = match arg(args, 1) {
        Value::Null => " ".to_string(),
        other => other.stringify(),
    };
    let len = utf16_len(s);
    if target <= len || fill.is_empty() {
        return Ok(Value::string(s));
    }
    let fill: Vec<u16> = units(&fill).into_iter().cycle().take(target - len).collect();
    let fill = from_units(&fill);
    Ok(Value::String(if start { fill + s } else { format!("{s}{fill}") }))
}
