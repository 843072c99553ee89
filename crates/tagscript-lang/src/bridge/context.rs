//! Per-run context: the `$` names bound at program entry and the
//! `parseArgs` helper.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::entities::{self, resolve};
use super::snapshot::{ChannelSnapshot, GuildSnapshot, MemberSnapshot, MessageSnapshot, RoleSnapshot};
use super::EntityRef;
use crate::error::RuntimeError;
use crate::runtime::interpreter::{Interpreter, Unwind};
use crate::runtime::scope::Scope;
use crate::runtime::value::{NativeCall, NativeFn, Value};
use crate::syntax::cst::Span;
use crate::types::array::snapshot;
use crate::types::number::to_number;
use crate::types::registry::invalid_arg;

/// Names bound by [`bind`]. Scripts may read but never assign them.
pub const CONTEXT_NAMES: &[&str] = &[
    "$msg", "$text", "$user", "$member", "$channel", "$guild", "$mentions", "$args", "parseArgs",
];

/// How the command was invoked, sent along with every run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSettings {
    pub prefix: String,
    /// Command name as the user typed it.
    pub command: String,
    /// Host-call timeout override for this run.
    pub call_timeout_ms: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { prefix: "!".into(), command: String::new(), call_timeout_ms: None }
    }
}

// ─── Binding ──────────────────────────────────────────────────────────────────

/// Declare the context names in `scope`.
pub fn bind(scope: &Arc<Scope>, msg: &MessageSnapshot, settings: &RunSettings) {
    let text = strip_invocation(&msg.content, settings);
    let args = Value::array(split_args(&text).into_iter().map(Value::String).collect());

    let channel = match &msg.channel {
        Some(c) => entities::channel(c),
        None => entities::channel(&ChannelSnapshot {
            id: msg.channel_id.clone(),
            guild_id: msg.guild_id.clone(),
            ..Default::default()
        }),
    };
    let guild = match (&msg.guild, &msg.guild_id) {
        (Some(g), _) => entities::guild(g),
        (None, Some(id)) => entities::guild(&GuildSnapshot { id: id.clone(), ..Default::default() }),
        (None, None) => Value::Null,
    };

    scope.declare("$msg", entities::message(msg));
    scope.declare("$text", Value::String(text));
    scope.declare("$user", entities::user(&msg.author));
    scope.declare("$member", msg.member.as_ref().map_or(Value::Null, entities::member));
    scope.declare("$channel", channel);
    scope.declare("$guild", guild);
    scope.declare("$mentions", entities::mentions(&msg.mentions));
    scope.declare("parseArgs", Value::bound("parseArgs", NativeFn::Async(parse_args), args.clone()));
    scope.declare("$args", args);
}

/// Message content without the prefix and command name.
pub fn strip_invocation(content: &str, settings: &RunSettings) -> String {
    let mut rest = content.trim_start();
    if let Some(after) = rest.strip_prefix(settings.prefix.as_str()) {
        rest = after;
    }
    let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if !settings.command.is_empty() && rest[..word_end].eq_ignore_ascii_case(&settings.command) {
        rest = &rest[word_end..];
    }
    rest.trim().to_string()
}

/// Split on whitespace, keeping double-quoted groups together. An
/// unterminated quote runs to the end of the text.
pub fn split_args(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    out.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        out.push(current);
    }
    out
}

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:<(?:@[!&]?|#|a?:\w+:)(\d+)>|(\d+))$").expect("valid mention regex"));

/// The id inside a mention (`<@1>`, `<@!1>`, `<@&1>`, `<#1>`, `<:name:1>`)
/// or a bare numeric id.
pub fn extract_id(s: &str) -> Option<String> {
    let caps = MENTION.captures(s.trim())?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

// ─── parseArgs ────────────────────────────────────────────────────────────────

fn mismatch(position: usize, kind: &str, span: Span) -> RuntimeError {
    invalid_arg(span, format!("argument {position} must be a {kind}"))
}

fn parse_boolean(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// `parseArgs(type, ...)`: coerce `$args` positionally. Missing arguments
/// are Null; a present argument that does not fit its type is an error.
/// `"text"` takes every remaining argument joined by spaces.
fn parse_args(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let raw: Vec<String> = snapshot(&call.this).iter().map(Value::stringify).collect();
        let mut out = Vec::with_capacity(call.args.len());
        // Everything after a "text" argument belongs to it.
        let mut rest_taken = false;

        for (i, kind) in call.args.iter().enumerate() {
            let position = i + 1;
            let kind = match kind {
                Value::String(s) => s.as_str(),
                other => {
                    return Err(invalid_arg(call.span, format!(
                        "parseArgs expects type names, got {}", other.type_name()
                    )).into())
                }
            };
            if kind == "text" && !rest_taken {
                rest_taken = true;
                let rest = raw.get(i..).unwrap_or_default();
                out.push(if rest.is_empty() { Value::Null } else { Value::String(rest.join(" ")) });
                continue;
            }
            let Some(text) = raw.get(i).filter(|_| !rest_taken) else {
                out.push(Value::Null);
                continue;
            };
            let value = coerce(interp, text, kind, position, call.span).await?;
            out.push(value);
        }
        Ok(Value::array(out))
    }
    .boxed()
}

async fn coerce(interp: &Interpreter, text: &str, kind: &str, position: usize, span: Span) -> Result<Value, Unwind> {
    let by_id = |text: &str| extract_id(text).ok_or_else(|| mismatch(position, kind, span));
    let found = |v: Value| if v.is_null() { Err(mismatch(position, kind, span)) } else { Ok(v) };

    Ok(match kind {
        "string" => Value::string(text),
        "number" => {
            let n = to_number(text);
            if n.is_nan() {
                return Err(mismatch(position, kind, span).into());
            }
            Value::Number(n)
        }
        "integer" => {
            let n = to_number(text);
            if !n.is_finite() || n.fract() != 0.0 {
                return Err(mismatch(position, "whole number", span).into());
            }
            Value::Number(n)
        }
        "boolean" => Value::Boolean(parse_boolean(text).ok_or_else(|| mismatch(position, kind, span))?),
        "member" => {
            let r = EntityRef::<MemberSnapshot>::ById(by_id(text)?);
            found(resolve(interp, r, span).await?)?
        }
        "user" => {
            let r = EntityRef::<MemberSnapshot>::ById(by_id(text)?);
            match resolve(interp, r, span).await? {
                Value::Object(o) => o.get("user").unwrap_or(Value::Null),
                _ => return Err(mismatch(position, kind, span).into()),
            }
        }
        "channel" => {
            let r = EntityRef::<ChannelSnapshot>::ById(by_id(text)?);
            found(resolve(interp, r, span).await?)?
        }
        "role" => {
            let r = EntityRef::<RoleSnapshot>::ById(by_id(text)?);
            found(resolve(interp, r, span).await?)?
        }
        other => return Err(invalid_arg(span, format!("unknown argument type '{other}'")).into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NoHost;
    use crate::error::ErrorCode;
    use crate::runtime::interpreter::RunOutcome;
    use crate::syntax::parser::parse;

    fn settings(command: &str) -> RunSettings {
        RunSettings { command: command.into(), ..Default::default() }
    }

    #[test]
    fn strips_prefix_and_command() {
        assert_eq!(strip_invocation("!roll 2 d6", &settings("roll")), "2 d6");
        assert_eq!(strip_invocation("!ROLL", &settings("roll")), "");
        assert_eq!(strip_invocation("!rolling 2", &settings("roll")), "rolling 2");
    }

    #[test]
    fn splits_with_quotes() {
        assert_eq!(split_args(r#"a "b c"  d"#), vec!["a", "b c", "d"]);
        assert_eq!(split_args(r#"say "" done"#), vec!["say", "", "done"]);
        assert_eq!(split_args(r#"open "quote runs"#), vec!["open", "quote runs"]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn ids_from_mentions() {
        assert_eq!(extract_id("<@!123>").as_deref(), Some("123"));
        assert_eq!(extract_id("<@&5>").as_deref(), Some("5"));
        assert_eq!(extract_id("<#77>").as_deref(), Some("77"));
        assert_eq!(extract_id("<a:dance:9>").as_deref(), Some("9"));
        assert_eq!(extract_id(" 42 ").as_deref(), Some("42"));
        assert_eq!(extract_id("@someone"), None);
    }

    async fn run(content: &str, src: &str) -> RunOutcome {
        let msg = MessageSnapshot { content: content.into(), channel_id: "1".into(), ..Default::default() };
        let globals = Scope::root();
        bind(&globals, &msg, &settings("cmd"));
        let mut interp = Interpreter::new(Arc::new(NoHost));
        interp.run(&parse(src).unwrap(), globals).await
    }

    #[tokio::test]
    async fn args_and_text_are_bound() {
        let RunOutcome::Reply(v) = run(r#"!cmd one "two three""#, "reply $args.length + ':' + $text").await else {
            panic!()
        };
        assert_eq!(v.stringify(), r#"2:one "two three""#);
    }

    #[tokio::test]
    async fn parse_args_coerces_positionally() {
        let src = "reply parseArgs('integer', 'boolean', 'text', 'number')";
        let RunOutcome::Reply(v) = run("!cmd 3 yes the rest", src).await else { panic!() };
        assert_eq!(v.stringify(), "3,true,the rest,");
    }

    #[tokio::test]
    async fn parse_args_names_the_failing_position() {
        let RunOutcome::Error(e) = run("!cmd 3 maybe", "parseArgs('number', 'boolean')").await else { panic!() };
        assert_eq!(e.code, ErrorCode::R007);
        assert_eq!(e.message, "argument 2 must be a boolean");
    }

    #[tokio::test]
    async fn context_names_cannot_be_assigned() {
        let RunOutcome::Error(e) = run("!cmd", "$text = 'x'").await else { panic!() };
        assert_eq!(e.code, ErrorCode::R008);
    }
}
