use crate::error::RuntimeError;
use crate::runtime::value::{format_number, Value};
use crate::syntax::cst::Span;
use crate::types::registry::{invalid_arg, opt_number_arg, TypeDesc};

fn this_num(v: &Value) -> f64 {
    v.as_number().unwrap_or(f64::NAN)
}

pub fn number_desc() -> TypeDesc {
    TypeDesc::new("number")
        .method("toFixed", to_fixed)
        .method("toString", to_string)
        .method("floor", |this, _, _| Ok(Value::Number(this_num(this).floor())))
        .method("ceil", |this, _, _| Ok(Value::Number(this_num(this).ceil())))
        .method("round", |this, _, _| Ok(Value::Number(round(this_num(this)))))
        .method("abs", |this, _, _| Ok(Value::Number(this_num(this).abs())))
}

/// Halves round towards +∞, as in `Math.round`.
pub fn round(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn to_fixed(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let n = this_num(this);
    let digits = opt_number_arg(args, 0, "toFixed", span)?.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&digits) {
        return Err(invalid_arg(span, "toFixed digits must be between 0 and 100"));
    }
    if !n.is_finite() {
        return Ok(Value::String(format_number(n)));
    }
    Ok(Value::String(format!("{:.*}", digits as usize, n)))
}

fn to_string(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let n = this_num(this);
    let radix = opt_number_arg(args, 0, "toString", span)?.unwrap_or(10.0);
    if radix.fract() != 0.0 || !(2.0..=36.0).contains(&radix) {
        return Err(invalid_arg(span, "toString radix must be an integer between 2 and 36"));
    }
    Ok(Value::String(to_radix(n, radix as u32)))
}

/// Fractions carry at most this many digits in non-decimal radixes.
const MAX_FRACTION_DIGITS: usize = 20;

fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return format_number(n);
    }
    let negative = n < 0.0;
    let n = n.abs();
    let mut int = n.trunc();
    let mut frac = n - int;

    let mut digits = Vec::new();
    if int == 0.0 {
        digits.push('0');
    }
    while int >= 1.0 {
        let d = (int % radix as f64) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('?'));
        int = (int / radix as f64).trunc();
    }
    if negative {
        digits.push('-');
    }
    let mut out: String = digits.into_iter().rev().collect();

    if frac > 0.0 {
        out.push('.');
        for _ in 0..MAX_FRACTION_DIGITS {
            frac *= radix as f64;
            let d = frac.trunc() as u32;
            out.push(std::char::from_digit(d, radix).unwrap_or('?'));
            frac -= d as f64;
            if frac == 0.0 {
                break;
            }
        }
    }
    out
}

/// Numeric parse used by unary `+`, `number(v)` and `toNumber`. Blank input
/// is 0, anything unparseable is NaN.
pub fn to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    let (sign, body) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    let radix = |prefix: &str, radix: u32| {
        body.strip_prefix(prefix)
            .or_else(|| body.strip_prefix(&prefix.to_ascii_uppercase()))
            .map(|digits| match u64::from_str_radix(digits, radix) {
                Ok(v) if sign > 0.0 => v as f64,
                _ => f64::NAN,
            })
    };
    if let Some(v) = radix("0x", 16).or_else(|| radix("0o", 8)).or_else(|| radix("0b", 2)) {
        return v;
    }
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    let plain = body.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    match body.parse::<f64>() {
        Ok(v) if plain => sign * v,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_numbers() {
        assert_eq!(to_number(""), 0.0);
        assert_eq!(to_number("  12.5 "), 12.5);
        assert_eq!(to_number("-3"), -3.0);
        assert_eq!(to_number("0xff"), 255.0);
        assert_eq!(to_number("0b101"), 5.0);
        assert_eq!(to_number("1e3"), 1000.0);
        assert_eq!(to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(to_number("inf").is_nan());
        assert!(to_number("12px").is_nan());
        assert!(to_number("-0x10").is_nan());
    }

    #[test]
    fn rounding_goes_up_on_halves() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert_eq!(round(-2.6), -3.0);
    }

    #[test]
    fn fixed_and_radix() {
        let fixed = to_fixed(&Value::Number(3.14159), &[Value::Number(2.0)], Span::default()).unwrap();
        assert_eq!(fixed.as_str(), Some("3.14"));
        assert_eq!(to_radix(255.0, 2), "11111111");
        assert_eq!(to_radix(-255.0, 16), "-ff");
        assert_eq!(to_radix(0.5, 2), "0.1");
        assert!(to_fixed(&Value::Number(1.0), &[Value::Number(101.0)], Span::default()).is_err());
    }
}
