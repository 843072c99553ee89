//! Binary and unary operators over the closed value union.
//!
//! Every operand combination is an arm here; anything not listed is an
//! R006 error except `+`, which falls back to string concatenation.

use crate::error::{ErrorCode, RuntimeError};
use crate::runtime::value::Value;
use crate::syntax::cst::{BinaryOp, Span, UnaryOp};
use crate::types::number::to_number;
use crate::types::string;
use crate::types::time::{millis, shift};

pub fn binary(op: BinaryOp, l: &Value, r: &Value, span: Span) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    use Value::{Duration as Dur, Number as Num, Time};

    let time = |t| shift_or_err(t, span);
    Ok(match (op, l, r) {
        // ── equality and ordering ──
        (Eq, a, b) => Value::Boolean(a.equals(b)),
        (Ne, a, b) => Value::Boolean(!a.equals(b)),
        (Lt, Num(a), Num(b)) => Value::Boolean(a < b),
        (Le, Num(a), Num(b)) => Value::Boolean(a <= b),
        (Gt, Num(a), Num(b)) => Value::Boolean(a > b),
        (Ge, Num(a), Num(b)) => Value::Boolean(a >= b),
        (Lt | Le | Gt | Ge, _, _) => Value::Boolean(false),

        // ── addition ──
        (Add, Num(a), Num(b))   => Num(a + b),
        (Add, Time(t), Num(ms)) => time(shift(t, *ms))?,
        (Add, Time(t), Dur(ms)) => time(shift(t, *ms))?,
        (Add, Dur(ms), Time(t)) => time(shift(t, *ms))?,
        (Add, Dur(a), Dur(b))   => Dur(a + b),
        (Add, Dur(a), Num(b))   => Dur(a + b),
        (Add, a, b)             => concat(a, b, span)?,

        // ── subtraction ──
        (Sub, Num(a), Num(b))   => Num(a - b),
        (Sub, Time(t), Num(ms)) => time(shift(t, -ms))?,
        (Sub, Time(t), Dur(ms)) => time(shift(t, -ms))?,
        (Sub, Time(a), Time(b)) => Dur(millis(a) - millis(b)),
        (Sub, Dur(a), Dur(b))   => Dur(a - b),
        (Sub, Dur(a), Num(b))   => Dur(a - b),

        // ── multiplication and division ──
        (Mul, Num(a), Num(b)) => Num(a * b),
        (Mul, Dur(a), Num(b)) => Dur(a * b),
        (Mul, Num(a), Dur(b)) => Dur(a * b),
        (Div, Num(a), Num(b)) => Num(a / b),
        (Div, Dur(a), Num(b)) => Dur(a / b),
        (Div, Dur(a), Dur(b)) => Num(a / b),
        (Rem, Num(a), Num(b)) => Num(a % b),
        (Pow, Num(a), Num(b)) => Num(a.powf(*b)),

        (Sub | Mul | Div | Rem | Pow, a, b) => return Err(mismatch(op.symbol(), a, Some(b), span)),
    })
}

pub fn unary(op: UnaryOp, v: &Value, span: Span) -> Result<Value, RuntimeError> {
    Ok(match (op, v) {
        (UnaryOp::Not, v)                  => Value::Boolean(!v.truthy()),
        (UnaryOp::Neg, Value::Number(n))   => Value::Number(-n),
        (UnaryOp::Neg, Value::Duration(d)) => Value::Duration(-d),
        (UnaryOp::Plus, Value::Number(n))  => Value::Number(*n),
        (UnaryOp::Plus, Value::String(s))  => Value::Number(to_number(s)),
        (UnaryOp::Neg, v)  => return Err(mismatch("-", v, None, span)),
        (UnaryOp::Plus, v) => return Err(mismatch("+", v, None, span)),
    })
}

fn shift_or_err(t: Option<chrono::DateTime<chrono::Utc>>, span: Span) -> Result<Value, RuntimeError> {
    t.map(Value::Time)
        .ok_or_else(|| RuntimeError::new(ErrorCode::R006, span.line, span.column, "time is out of range"))
}

fn mismatch(symbol: &str, a: &Value, b: Option<&Value>, span: Span) -> RuntimeError {
    let message = match b {
        Some(b) => format!("cannot apply '{symbol}' to {} and {}", a.type_name(), b.type_name()),
        None => format!("cannot apply unary '{symbol}' to {}", a.type_name()),
    };
    RuntimeError::new(ErrorCode::R006, span.line, span.column, message)
}

/// String `+`, refused once the result would pass the string limit.
fn concat(a: &Value, b: &Value, span: Span) -> Result<Value, RuntimeError> {
    let (a, b) = (a.stringify(), b.stringify());
    string::check_len(a.len() + b.len(), span)?;
    Ok(Value::String(a + &b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time::parse_time;

    fn span() -> Span {
        Span::new(1, 1)
    }

    #[test]
    fn time_arithmetic() {
        let t = Value::Time(parse_time("2024-01-01T00:00:00Z").unwrap());
        let later = binary(BinaryOp::Add, &t, &Value::Duration(60_000.0), span()).unwrap();
        assert_eq!(later.stringify(), "2024-01-01T00:01:00.000Z");
        let gap = binary(BinaryOp::Sub, &later, &t, span()).unwrap();
        assert!(matches!(gap, Value::Duration(ms) if ms == 60_000.0));
        let ratio = binary(BinaryOp::Div, &gap, &Value::Duration(30_000.0), span()).unwrap();
        assert_eq!(ratio.as_number(), Some(2.0));
    }

    #[test]
    fn non_numeric_arithmetic_fails() {
        let e = binary(BinaryOp::Sub, &Value::string("a"), &Value::Number(1.0), span()).unwrap_err();
        assert_eq!(e.code, ErrorCode::R006);
        assert_eq!(e.message, "cannot apply '-' to string and number");
        assert!(binary(BinaryOp::Pow, &Value::Null, &Value::Null, span()).is_err());
    }

    #[test]
    fn unary_operators() {
        assert_eq!(unary(UnaryOp::Plus, &Value::string("12"), span()).unwrap().as_number(), Some(12.0));
        assert!(matches!(unary(UnaryOp::Neg, &Value::Duration(5.0), span()).unwrap(), Value::Duration(d) if d == -5.0));
        assert!(unary(UnaryOp::Not, &Value::Null, span()).unwrap().truthy());
        assert_eq!(unary(UnaryOp::Plus, &Value::Boolean(true), span()).unwrap_err().code, ErrorCode::R006);
    }

    #[test]
    fn power_and_remainder() {
        assert_eq!(binary(BinaryOp::Pow, &Value::Number(2.0), &Value::Number(10.0), span()).unwrap().as_number(), Some(1024.0));
        assert_eq!(binary(BinaryOp::Rem, &Value::Number(7.0), &Value::Number(3.0), span()).unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn string_concatenation_is_bounded() {
        let half = Value::String("a".repeat(string::MAX_STRING_LEN / 2 + 1));
        let e = binary(BinaryOp::Add, &half, &half, span()).unwrap_err();
        assert_eq!(e.code, ErrorCode::R012);
        let ok = binary(BinaryOp::Add, &half, &Value::Number(1.0), span()).unwrap();
        assert!(ok.as_str().unwrap().ends_with("a1"));
    }
}
