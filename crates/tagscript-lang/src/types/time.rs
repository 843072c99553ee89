//! Time and Duration values: calendar getters, immutable setters,
//! arithmetic helpers shared with the operator table, and humanized output.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, Timelike, Utc};

use crate::error::RuntimeError;
use crate::runtime::value::Value;
use crate::syntax::cst::Span;
use crate::types::registry::{arg, invalid_arg, number_arg, TypeDesc};
use crate::types::number::round;

// ─── Clock ────────────────────────────────────────────────────────────────────

/// Source of `now()`. Injected so runs can be replayed deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ─── Units ────────────────────────────────────────────────────────────────────

const SECOND: f64 = 1_000.0;
const MINUTE: f64 = 60.0 * SECOND;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    /// Short forms are case-sensitive (`m` minute, `M` month).
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "ms" => Self::Millisecond,
            "s"  => Self::Second,
            "m"  => Self::Minute,
            "h"  => Self::Hour,
            "d"  => Self::Day,
            "w"  => Self::Week,
            "M"  => Self::Month,
            "y"  => Self::Year,
            _ => match s.to_ascii_lowercase().trim_end_matches('s') {
                "millisecond" => Self::Millisecond,
                "second"      => Self::Second,
                "minute"      => Self::Minute,
                "hour"        => Self::Hour,
                "day"         => Self::Day,
                "week"        => Self::Week,
                "month"       => Self::Month,
                "year"        => Self::Year,
                _ => return None,
            },
        })
    }

    /// Fixed length. Months and years use 30 and 365 days outside calendar math.
    pub fn ms(self) -> f64 {
        match self {
            Self::Millisecond => 1.0,
            Self::Second      => SECOND,
            Self::Minute      => MINUTE,
            Self::Hour        => HOUR,
            Self::Day         => DAY,
            Self::Week        => 7.0 * DAY,
            Self::Month       => 30.0 * DAY,
            Self::Year        => 365.0 * DAY,
        }
    }
}

pub fn unit_arg(args: &[Value], i: usize, what: &str, span: Span) -> Result<Unit, RuntimeError> {
    match arg(args, i) {
        Value::Null => Ok(Unit::Millisecond),
        Value::String(s) => Unit::parse(s).ok_or_else(|| invalid_arg(span, format!("{what}: unknown unit '{s}'"))),
        other => Err(invalid_arg(span, format!("{what} expects a unit string, got {}", other.type_name()))),
    }
}

// ─── Instants ─────────────────────────────────────────────────────────────────

pub fn millis(t: &DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64
}

pub fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
}

/// `t` moved by `ms` milliseconds.
pub fn shift(t: &DateTime<Utc>, ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    t.checked_add_signed(TimeDelta::try_milliseconds(ms.trunc() as i64)?)
}

/// `t` moved by a whole number of calendar months.
fn shift_months(t: &DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let m = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 { t.checked_add_months(m) } else { t.checked_sub_months(m) }
}

/// RFC 3339 timestamps, or a bare `YYYY-MM-DD` date at midnight UTC.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn out_of_range(span: Span) -> RuntimeError {
    invalid_arg(span, "time is out of range")
}

fn this_time(v: &Value) -> DateTime<Utc> {
    match v {
        Value::Time(t) => *t,
        _ => DateTime::<Utc>::default(),
    }
}

fn this_ms(v: &Value) -> f64 {
    match v {
        Value::Duration(ms) => *ms,
        _ => 0.0,
    }
}

// ─── Time table ───────────────────────────────────────────────────────────────

pub fn time_desc() -> TypeDesc {
    TypeDesc::new("time")
        .field("year", |v| Value::Number(this_time(v).year() as f64))
        .field("month", |v| Value::Number(this_time(v).month() as f64))
        .field("date", |v| Value::Number(this_time(v).day() as f64))
        .field("day", |v| Value::Number(this_time(v).weekday().num_days_from_sunday() as f64))
        .field("hour", |v| Value::Number(this_time(v).hour() as f64))
        .field("minute", |v| Value::Number(this_time(v).minute() as f64))
        .field("second", |v| Value::Number(this_time(v).second() as f64))
        .field("millisecond", |v| Value::Number(this_time(v).timestamp_subsec_millis() as f64))
        .method("setYear", |this, args, span| {
            let n = whole(args, "setYear", span)?;
            set(span, this_time(this).with_year(n as i32))
        })
        .method("setMonth", |this, args, span| {
            let n = whole(args, "setMonth", span)?;
            set(span, u32::try_from(n).ok().and_then(|m| this_time(this).with_month(m)))
        })
        .method("setDate", |this, args, span| {
            let n = whole(args, "setDate", span)?;
            set(span, u32::try_from(n).ok().and_then(|d| this_time(this).with_day(d)))
        })
        .method("setHour", |this, args, span| {
            let n = whole(args, "setHour", span)?;
            set(span, u32::try_from(n).ok().and_then(|h| this_time(this).with_hour(h)))
        })
        .method("setMinute", |this, args, span| {
            let n = whole(args, "setMinute", span)?;
            set(span, u32::try_from(n).ok().and_then(|m| this_time(this).with_minute(m)))
        })
        .method("setSecond", |this, args, span| {
            let n = whole(args, "setSecond", span)?;
            set(span, u32::try_from(n).ok().and_then(|s| this_time(this).with_second(s)))
        })
        .method("setMillisecond", |this, args, span| {
            let n = whole(args, "setMillisecond", span)?;
            let ms = u32::try_from(n).ok().filter(|ms| *ms < 1000);
            set(span, ms.and_then(|ms| this_time(this).with_nanosecond(ms * 1_000_000)))
        })
        .method("add", |this, args, span| move_time(this, args, span, 1.0, "add"))
        .method("subtract", |this, args, span| move_time(this, args, span, -1.0, "subtract"))
        .method("diff", diff)
        .method("isBefore", |this, args, span| Ok(Value::Boolean(this_time(this) < other_time(args, "isBefore", span)?)))
        .method("isAfter", |this, args, span| Ok(Value::Boolean(this_time(this) > other_time(args, "isAfter", span)?)))
        .method("isSame", |this, args, span| Ok(Value::Boolean(this_time(this) == other_time(args, "isSame", span)?)))
        .method("format", format)
        .method("valueOf", |this, _, _| Ok(Value::Number(millis(&this_time(this)))))
        .method("unix", |this, _, _| Ok(Value::Number(this_time(this).timestamp() as f64)))
        .method("toISOString", |this, _, _| Ok(Value::String(this.stringify())))
}

fn whole(args: &[Value], what: &str, span: Span) -> Result<i64, RuntimeError> {
    let n = number_arg(args, 0, what, span)?;
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(invalid_arg(span, format!("{what} expects a whole number")));
    }
    Ok(n as i64)
}

fn set(span: Span, t: Option<DateTime<Utc>>) -> Result<Value, RuntimeError> {
    t.map(Value::Time).ok_or_else(|| out_of_range(span))
}

fn other_time(args: &[Value], what: &str, span: Span) -> Result<DateTime<Utc>, RuntimeError> {
    match arg(args, 0) {
        Value::Time(t) => Ok(*t),
        other => Err(invalid_arg(span, format!("{what} expects a time, got {}", other.type_name()))),
    }
}

/// `add(duration)` or `add(amount, unit)`; months and years move by calendar.
fn move_time(this: &Value, args: &[Value], span: Span, sign: f64, what: &str) -> Result<Value, RuntimeError> {
    let t = this_time(this);
    let moved = match arg(args, 0) {
        Value::Duration(ms) => shift(&t, sign * ms),
        Value::Number(amount) => match unit_arg(args, 1, what, span)? {
            Unit::Month => shift_months(&t, (sign * amount.trunc()) as i64),
            Unit::Year => shift_months(&t, (sign * amount.trunc()) as i64 * 12),
            unit => shift(&t, sign * amount * unit.ms()),
        },
        other => return Err(invalid_arg(span, format!("{what} expects a duration or number, got {}", other.type_name()))),
    };
    set(span, moved)
}

/// Whole calendar months from `b` to `a`, truncated towards zero.
fn months_between(a: &DateTime<Utc>, b: &DateTime<Utc>) -> i64 {
    let total = (a.year() as i64 - b.year() as i64) * 12 + a.month() as i64 - b.month() as i64;
    let rest = |t: &DateTime<Utc>| (t.day(), t.num_seconds_from_midnight(), t.timestamp_subsec_nanos());
    if total > 0 && rest(a) < rest(b) {
        total - 1
    } else if total < 0 && rest(a) > rest(b) {
        total + 1
    } else {
        total
    }
}

fn diff(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let a = this_time(this);
    let b = other_time(args, "diff", span)?;
    let n = match unit_arg(args, 1, "diff", span)? {
        Unit::Month => months_between(&a, &b) as f64,
        Unit::Year => (months_between(&a, &b) / 12) as f64,
        unit => ((millis(&a) - millis(&b)) / unit.ms()).trunc(),
    };
    Ok(Value::Number(n))
}

fn format(this: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let t = this_time(this);
    let pattern = match arg(args, 0) {
        Value::Null => return Ok(Value::String(this.stringify())),
        Value::String(s) => s.clone(),
        other => return Err(invalid_arg(span, format!("format expects a string, got {}", other.type_name()))),
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(&pattern).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(invalid_arg(span, format!("invalid format string '{pattern}'")));
    }
    Ok(Value::String(t.format_with_items(items.iter()).to_string()))
}

// ─── Duration table ───────────────────────────────────────────────────────────

pub fn duration_desc() -> TypeDesc {
    TypeDesc::new("duration")
        .field("milliseconds", |v| Value::Number((this_ms(v) % SECOND).trunc()))
        .field("seconds", |v| Value::Number((this_ms(v) / SECOND % 60.0).trunc()))
        .field("minutes", |v| Value::Number((this_ms(v) / MINUTE % 60.0).trunc()))
        .field("hours", |v| Value::Number((this_ms(v) / HOUR % 24.0).trunc()))
        .field("days", |v| Value::Number((this_ms(v) / DAY).trunc()))
        .method("asMilliseconds", |this, _, _| Ok(Value::Number(this_ms(this))))
        .method("asSeconds", |this, _, _| Ok(Value::Number(this_ms(this) / SECOND)))
        .method("asMinutes", |this, _, _| Ok(Value::Number(this_ms(this) / MINUTE)))
        .method("asHours", |this, _, _| Ok(Value::Number(this_ms(this) / HOUR)))
        .method("asDays", |this, _, _| Ok(Value::Number(this_ms(this) / DAY)))
        .method("add", |this, args, span| move_duration(this, args, span, 1.0, "add"))
        .method("subtract", |this, args, span| move_duration(this, args, span, -1.0, "subtract"))
        .method("humanize", |this, _, _| Ok(Value::String(humanize(this_ms(this)))))
        .method("valueOf", |this, _, _| Ok(Value::Number(this_ms(this))))
}

fn move_duration(this: &Value, args: &[Value], span: Span, sign: f64, what: &str) -> Result<Value, RuntimeError> {
    let delta = match arg(args, 0) {
        Value::Duration(ms) => *ms,
        Value::Number(amount) => amount * unit_arg(args, 1, what, span)?.ms(),
        other => return Err(invalid_arg(span, format!("{what} expects a duration or number, got {}", other.type_name()))),
    };
    Ok(Value::Duration(this_ms(this) + sign * delta))
}

/// Rough, human wording of a length: "a few seconds", "3 hours", "a year".
pub fn humanize(ms: f64) -> String {
    let ms = ms.abs();
    let seconds = round(ms / SECOND);
    let minutes = round(ms / MINUTE);
    let hours = round(ms / HOUR);
    let days = round(ms / DAY);
    let months = round(ms / DAY / 30.4);
    let years = round(ms / DAY / 365.0);

    match () {
        _ if seconds < 45.0 => "a few seconds".into(),
        _ if seconds < 90.0 => "a minute".into(),
        _ if minutes < 45.0 => format!("{minutes} minutes"),
        _ if minutes < 90.0 => "an hour".into(),
        _ if hours < 22.0   => format!("{hours} hours"),
        _ if hours < 36.0   => "a day".into(),
        _ if days < 26.0    => format!("{days} days"),
        _ if days < 45.0    => "a month".into(),
        _ if days < 320.0   => format!("{months} months"),
        _ if days < 548.0   => "a year".into(),
        _ => format!("{years} years"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::NativeFn;
    use crate::types::registry::{Lookup, TYPES};

    fn at(s: &str) -> Value {
        Value::Time(parse_time(s).unwrap())
    }

    fn call(this: &Value, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let Some(Lookup::Method(_, NativeFn::Pure(f))) = TYPES.lookup(this, name) else { panic!("{name}") };
        f(this, args, Span::default())
    }

    fn field(this: &Value, name: &str) -> f64 {
        let Some(Lookup::Field(v)) = TYPES.lookup(this, name) else { panic!("{name}") };
        v.as_number().unwrap()
    }

    #[test]
    fn units_parse_short_and_long_forms() {
        assert_eq!(Unit::parse("m"), Some(Unit::Minute));
        assert_eq!(Unit::parse("M"), Some(Unit::Month));
        assert_eq!(Unit::parse("Hours"), Some(Unit::Hour));
        assert_eq!(Unit::parse("day"), Some(Unit::Day));
        assert_eq!(Unit::parse("fortnight"), None);
    }

    #[test]
    fn calendar_getters() {
        let t = at("2024-03-10T14:05:09.250Z");
        assert_eq!(field(&t, "year"), 2024.0);
        assert_eq!(field(&t, "month"), 3.0);
        assert_eq!(field(&t, "date"), 10.0);
        assert_eq!(field(&t, "day"), 0.0);
        assert_eq!(field(&t, "hour"), 14.0);
        assert_eq!(field(&t, "millisecond"), 250.0);
    }

    #[test]
    fn setters_return_new_times() {
        let t = at("2024-01-31T00:00:00Z");
        let moved = call(&t, "setHour", &[Value::Number(5.0)]).unwrap();
        assert_eq!(field(&moved, "hour"), 5.0);
        assert_eq!(field(&t, "hour"), 0.0);
        assert!(call(&t, "setMonth", &[Value::Number(2.0)]).is_err());
    }

    #[test]
    fn calendar_add_and_diff() {
        let t = at("2024-01-31T00:00:00Z");
        let next = call(&t, "add", &[Value::Number(1.0), Value::string("month")]).unwrap();
        assert_eq!(next.stringify(), "2024-02-29T00:00:00.000Z");
        let later = call(&t, "add", &[Value::Duration(DAY)]).unwrap();
        assert_eq!(call(&later, "diff", &[t.clone(), Value::string("hours")]).unwrap().as_number(), Some(24.0));
        let year = at("2025-01-30T00:00:00Z");
        assert_eq!(call(&year, "diff", &[t.clone(), Value::string("months")]).unwrap().as_number(), Some(11.0));
    }

    #[test]
    fn comparisons_and_format() {
        let a = at("2024-01-01");
        let b = at("2024-06-01");
        assert!(call(&a, "isBefore", &[b.clone()]).unwrap().truthy());
        assert!(!call(&a, "isSame", &[b]).unwrap().truthy());
        assert_eq!(call(&a, "format", &[Value::string("%Y/%m/%d")]).unwrap().as_str(), Some("2024/01/01"));
        assert!(call(&a, "format", &[Value::string("%Q")]).is_err());
        assert_eq!(call(&a, "unix", &[]).unwrap().as_number(), Some(1_704_067_200.0));
    }

    #[test]
    fn duration_components() {
        let d = Value::Duration(DAY + 2.0 * HOUR + 3.0 * MINUTE + 4.5 * SECOND);
        assert_eq!(field(&d, "days"), 1.0);
        assert_eq!(field(&d, "hours"), 2.0);
        assert_eq!(field(&d, "minutes"), 3.0);
        assert_eq!(field(&d, "seconds"), 4.0);
        assert_eq!(field(&d, "milliseconds"), 500.0);
        assert_eq!(call(&d, "asDays", &[]).unwrap().as_number().map(f64::floor), Some(1.0));
        let d = call(&Value::Duration(0.0), "add", &[Value::Number(2.0), Value::string("h")]).unwrap();
        assert_eq!(call(&d, "asHours", &[]).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn humanized_lengths() {
        assert_eq!(humanize(10.0 * SECOND), "a few seconds");
        assert_eq!(humanize(5.0 * MINUTE), "5 minutes");
        assert_eq!(humanize(-3.0 * HOUR), "3 hours");
        assert_eq!(humanize(DAY), "a day");
        assert_eq!(humanize(400.0 * DAY), "a year");
        assert_eq!(humanize(3.0 * 365.0 * DAY), "3 years");
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = FixedClock(parse_time("2020-02-02T02:02:02Z").unwrap());
        assert_eq!(clock.now(), clock.now());
    }
}
