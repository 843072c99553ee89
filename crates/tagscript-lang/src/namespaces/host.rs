//! Lookups that go through the host: `getEmoji`, `getMessage`, `getRole`,
//! `getMember`, `getChannel`. Each takes an id or a mention and resolves
//! against the guild/channel the command ran in. Unknown ids give null.

use futures_util::future::{BoxFuture, FutureExt};

use super::{Export, Namespace};
use crate::bridge::context::extract_id;
use crate::bridge::entities::{fetch, resolve, Entity};
use crate::bridge::snapshot::{ChannelSnapshot, EmojiSnapshot, MemberSnapshot, MessageSnapshot, RoleSnapshot};
use crate::bridge::{EntityRef, HostRequest};
use crate::error::RuntimeError;
use crate::runtime::interpreter::{Interpreter, Unwind};
use crate::runtime::value::{NativeCall, Value};
use crate::syntax::cst::Span;
use crate::types::registry::invalid_arg;

pub struct HostNamespace;

impl Namespace for HostNamespace {
    fn name(&self) -> &'static str {
        "host"
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            Export::async_fn("getEmoji",   get_emoji),
            Export::async_fn("getMessage", get_message),
            Export::async_fn("getRole",    get_role),
            Export::async_fn("getMember",  get_member),
            Export::async_fn("getChannel", get_channel),
        ]
    }
}

/// The id in an argument: a mention, a bare id string, or an entity.
fn id_arg(v: &Value, what: &str, span: Span) -> Result<String, RuntimeError> {
    let id = match v {
        Value::String(s) => extract_id(s),
        Value::Object(o) if o.class.is_some() => o.get_str("id"),
        _ => None,
    };
    id.ok_or_else(|| invalid_arg(span, format!("{what} expects an id or a mention, got {}", v.stringify())))
}

async fn by_id<T: Entity>(interp: &Interpreter, call: &NativeCall, what: &str) -> Result<Value, Unwind> {
    let id = id_arg(call.arg(0), what, call.span)?;
    resolve::<T>(interp, EntityRef::ById(id), call.span).await
}

fn get_emoji(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move { by_id::<EmojiSnapshot>(interp, &call, "getEmoji").await }.boxed()
}

fn get_role(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move { by_id::<RoleSnapshot>(interp, &call, "getRole").await }.boxed()
}

fn get_member(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move { by_id::<MemberSnapshot>(interp, &call, "getMember").await }.boxed()
}

fn get_channel(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move { by_id::<ChannelSnapshot>(interp, &call, "getChannel").await }.boxed()
}

/// `getMessage(id, channel?)`. Without a channel, the current one.
fn get_message(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        if call.arg(1).is_null() {
            return by_id::<MessageSnapshot>(interp, &call, "getMessage").await;
        }
        let message_id = id_arg(call.arg(0), "getMessage", call.span)?;
        let channel_id = id_arg(call.arg(1), "getMessage", call.span)?;
        fetch::<MessageSnapshot>(interp, HostRequest::GetMessage { channel_id, message_id }, call.span).await
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::future;
    use parking_lot::Mutex;

    use super::*;
    use crate::bridge::{BridgeError, HostBridge};
    use crate::error::ErrorCode;
    use crate::runtime::interpreter::RunOutcome;
    use crate::runtime::scope::Scope;
    use crate::syntax::parser::parse;

    struct Directory {
        seen: Mutex<Vec<HostRequest>>,
    }

    impl HostBridge for Directory {
        fn call(&self, request: HostRequest, _: Option<Duration>) -> BoxFuture<'_, Result<serde_json::Value, BridgeError>> {
            let answer = match &request {
                HostRequest::GetMember { user_id, .. } if user_id == "7" => {
                    serde_json::json!({"guildId": "1", "user": {"id": "7", "username": "ada"}, "nickname": "countess"})
                }
                HostRequest::GetMessage { message_id, channel_id } => {
                    serde_json::json!({"id": message_id, "channelId": channel_id, "content": "hello"})
                }
                _ => serde_json::Value::Null,
            };
            self.seen.lock().push(request);
            future::ready(Ok(answer)).boxed()
        }
    }

    async fn run(src: &str) -> (RunOutcome, Vec<HostRequest>) {
        let host = Arc::new(Directory { seen: Mutex::new(Vec::new()) });
        let mut interp = Interpreter::new(host.clone()).with_context(Some("1".into()), Some("2".into()));
        let outcome = interp.run(&parse(src).unwrap(), Scope::root()).await;
        let seen = host.seen.lock().clone();
        (outcome, seen)
    }

    #[tokio::test]
    async fn member_by_mention() {
        let (outcome, seen) = run("m = getMember('<@!7>')\nreply m.displayName + ' ' + m").await;
        assert!(matches!(outcome, RunOutcome::Reply(v) if v.stringify() == "countess <@7>"));
        assert_eq!(seen, vec![HostRequest::GetMember { guild_id: "1".into(), user_id: "7".into() }]);
    }

    #[tokio::test]
    async fn unknown_entities_are_null() {
        let (outcome, _) = run("reply getRole('99') == null").await;
        assert!(matches!(outcome, RunOutcome::Reply(Value::Boolean(true))));
    }

    #[tokio::test]
    async fn message_defaults_to_current_channel() {
        let (outcome, seen) = run("reply getMessage('5').content + getMessage('6', '<#8>').channelId").await;
        assert!(matches!(outcome, RunOutcome::Reply(v) if v.stringify() == "hello8"));
        assert_eq!(seen[0], HostRequest::GetMessage { channel_id: "2".into(), message_id: "5".into() });
    }

    #[tokio::test]
    async fn bad_ids_are_rejected_before_the_host() {
        let (outcome, seen) = run("getChannel('general')").await;
        let RunOutcome::Error(e) = outcome else { panic!("{outcome:?}") };
        assert_eq!(e.code, ErrorCode::R007);
        assert!(seen.is_empty());
    }
}
