//! Entity values built from host snapshots, and the class tables whose
//! methods make further host round-trips.

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use super::embed::payload;
use super::snapshot::*;
use super::{EntityRef, HostRequest};
use crate::error::RuntimeError;
use crate::runtime::interpreter::{Interpreter, Unwind};
use crate::runtime::value::{NativeCall, Object, Value};
use crate::syntax::cst::Span;
use crate::types::registry::{invalid_arg, opt_number_arg, TypeDesc};

// ─── Constructors ─────────────────────────────────────────────────────────────

/// A snapshot type that can become a script value.
pub trait Entity: DeserializeOwned + Send + 'static {
    fn to_value(&self) -> Value;

    /// The host call that fetches this entity by bare id in the run's
    /// context. `None` when the context lacks what the call needs.
    fn lookup(_interp: &Interpreter, _id: String) -> Option<HostRequest> {
        None
    }
}

fn props<const N: usize>(pairs: [(&str, Value); N]) -> IndexMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn time(t: Option<DateTime<Utc>>) -> Value {
    t.map_or(Value::Null, Value::Time)
}

fn list<T: Entity>(items: &[T]) -> Value {
    Value::array(items.iter().map(Entity::to_value).collect())
}

pub fn user(u: &UserSnapshot) -> Value {
    let display = u.global_name.clone().unwrap_or_else(|| u.username.clone());
    Value::entity("user", props([
        ("id", Value::string(&u.id)),
        ("username", Value::string(&u.username)),
        ("globalName", Value::opt_string(u.global_name.clone())),
        ("displayName", Value::String(display)),
        ("avatarUrl", Value::opt_string(u.avatar_url.clone())),
        ("bot", Value::Boolean(u.bot)),
    ]))
}

pub fn member(m: &MemberSnapshot) -> Value {
    Value::entity("member", props([
        ("id", Value::string(&m.user.id)),
        ("guildId", Value::string(&m.guild_id)),
        ("user", user(&m.user)),
        ("nickname", Value::opt_string(m.nickname.clone())),
        ("displayName", Value::string(m.display_name())),
        ("roles", Value::array(m.roles.iter().map(Value::string).collect())),
        ("joinedAt", time(m.joined_at)),
        ("bot", Value::Boolean(m.user.bot)),
    ]))
}

pub fn role(r: &RoleSnapshot) -> Value {
    Value::entity("role", props([
        ("id", Value::string(&r.id)),
        ("guildId", Value::string(&r.guild_id)),
        ("name", Value::string(&r.name)),
        ("color", Value::Number(r.color as f64)),
        ("position", Value::Number(r.position as f64)),
        ("mentionable", Value::Boolean(r.mentionable)),
        ("hoist", Value::Boolean(r.hoist)),
    ]))
}

pub fn channel(c: &ChannelSnapshot) -> Value {
    Value::entity("channel", props([
        ("id", Value::string(&c.id)),
        ("guildId", Value::opt_string(c.guild_id.clone())),
        ("name", Value::string(&c.name)),
        ("kind", Value::string(&c.kind)),
        ("topic", Value::opt_string(c.topic.clone())),
        ("nsfw", Value::Boolean(c.nsfw)),
    ]))
}

pub fn guild(g: &GuildSnapshot) -> Value {
    Value::entity("guild", props([
        ("id", Value::string(&g.id)),
        ("name", Value::string(&g.name)),
        ("ownerId", Value::string(&g.owner_id)),
        ("memberCount", Value::Number(g.member_count as f64)),
        ("iconUrl", Value::opt_string(g.icon_url.clone())),
    ]))
}

pub fn emoji(e: &EmojiSnapshot) -> Value {
    Value::entity("emoji", props([
        ("id", Value::string(&e.id)),
        ("name", Value::string(&e.name)),
        ("animated", Value::Boolean(e.animated)),
        ("guildId", Value::opt_string(e.guild_id.clone())),
    ]))
}

pub fn mentions(m: &MentionsSnapshot) -> Value {
    Value::object(props([
        ("users", list(&m.users)),
        ("members", list(&m.members)),
        ("roles", list(&m.roles)),
        ("channels", list(&m.channels)),
        ("everyone", Value::Boolean(m.everyone)),
    ]))
}

pub fn message(m: &MessageSnapshot) -> Value {
    let reactions = m.reactions.iter().map(|r| {
        Value::object(props([
            ("emoji", Value::string(&r.emoji)),
            ("count", Value::Number(r.count as f64)),
            ("me", Value::Boolean(r.me)),
        ]))
    });
    Value::entity("message", props([
        ("id", Value::string(&m.id)),
        ("channelId", Value::string(&m.channel_id)),
        ("guildId", Value::opt_string(m.guild_id.clone())),
        ("content", Value::string(&m.content)),
        ("author", user(&m.author)),
        ("member", m.member.as_ref().map_or(Value::Null, member)),
        ("channel", m.channel.as_ref().map_or(Value::Null, channel)),
        ("guild", m.guild.as_ref().map_or(Value::Null, guild)),
        ("mentions", mentions(&m.mentions)),
        ("reactions", Value::array(reactions.collect())),
        ("createdAt", time(m.created_at)),
        ("editedAt", time(m.edited_at)),
        ("pinned", Value::Boolean(m.pinned)),
    ]))
}

impl Entity for UserSnapshot {
    fn to_value(&self) -> Value {
        user(self)
    }
}

impl Entity for MemberSnapshot {
    fn to_value(&self) -> Value {
        member(self)
    }

    fn lookup(interp: &Interpreter, user_id: String) -> Option<HostRequest> {
        Some(HostRequest::GetMember { guild_id: interp.guild_id()?.to_string(), user_id })
    }
}

impl Entity for RoleSnapshot {
    fn to_value(&self) -> Value {
        role(self)
    }

    fn lookup(interp: &Interpreter, role_id: String) -> Option<HostRequest> {
        Some(HostRequest::GetRole { guild_id: interp.guild_id()?.to_string(), role_id })
    }
}

impl Entity for ChannelSnapshot {
    fn to_value(&self) -> Value {
        channel(self)
    }

    fn lookup(interp: &Interpreter, channel_id: String) -> Option<HostRequest> {
        Some(HostRequest::GetChannel { guild_id: interp.guild_id()?.to_string(), channel_id })
    }
}

impl Entity for GuildSnapshot {
    fn to_value(&self) -> Value {
        guild(self)
    }
}

impl Entity for EmojiSnapshot {
    fn to_value(&self) -> Value {
        emoji(self)
    }

    fn lookup(interp: &Interpreter, emoji_id: String) -> Option<HostRequest> {
        Some(HostRequest::GetEmoji { guild_id: interp.guild_id()?.to_string(), emoji_id })
    }
}

impl Entity for MessageSnapshot {
    fn to_value(&self) -> Value {
        message(self)
    }

    fn lookup(interp: &Interpreter, message_id: String) -> Option<HostRequest> {
        Some(HostRequest::GetMessage { channel_id: interp.channel_id()?.to_string(), message_id })
    }
}

/// Turn a reference into a value, asking the host when only the id is known.
/// An entity the host does not know resolves to Null.
pub async fn resolve<T: Entity>(interp: &Interpreter, entity: EntityRef<T>, span: Span) -> Result<Value, Unwind> {
    match entity {
        EntityRef::Snapshot(s) => Ok(s.to_value()),
        EntityRef::ById(id) => match T::lookup(interp, id) {
            Some(request) => fetch::<T>(interp, request, span).await,
            None => Ok(Value::Null),
        },
    }
}

/// One host call whose answer is a single `T`, or null.
pub async fn fetch<T: Entity>(interp: &Interpreter, request: HostRequest, span: Span) -> Result<Value, Unwind> {
    let method = request.method();
    let json = interp.host_call(request, span).await?;
    Ok(decode::<T>(json, method)?.map_or(Value::Null, |s| s.to_value()))
}

/// One host call whose answer is a list of `T`.
async fn fetch_list<T: Entity>(interp: &Interpreter, request: HostRequest, span: Span) -> Result<Value, Unwind> {
    let method = request.method();
    let json = interp.host_call(request, span).await?;
    let items: Vec<T> = decode(json, method)?.unwrap_or_default();
    Ok(list(&items))
}

pub(crate) fn decode<T: DeserializeOwned>(json: serde_json::Value, method: &str) -> Result<Option<T>, Unwind> {
    if json.is_null() {
        return Ok(None);
    }
    serde_json::from_value(json).map(Some).map_err(|e| {
        tracing::warn!(method, error = %e, "malformed host response");
        Unwind::Internal(format!("{method}: malformed host response: {e}"))
    })
}

// ─── Mentions ─────────────────────────────────────────────────────────────────

/// Chat markup for entities that have one.
pub fn mention(class: &str, o: &Object) -> Option<String> {
    let id = o.get_str("id")?;
    Some(match class {
        "user" | "member" => format!("<@{id}>"),
        "role" => format!("<@&{id}>"),
        "channel" => format!("<#{id}>"),
        "emoji" => {
            let name = o.get_str("name").unwrap_or_default();
            let animated = o.get("animated").is_some_and(|v| v.truthy());
            format!("<{}:{name}:{id}>", if animated { "a" } else { "" })
        }
        _ => return None,
    })
}

// ─── Class tables ─────────────────────────────────────────────────────────────

pub fn classes() -> Vec<TypeDesc> {
    vec![
        TypeDesc::new("user"),
        TypeDesc::new("emoji"),
        TypeDesc::new("member").async_method("getRoles", member_get_roles),
        TypeDesc::new("role").async_method("getMembers", role_get_members),
        TypeDesc::new("channel")
            .async_method("send", channel_send)
            .async_method("createInvite", channel_create_invite),
        TypeDesc::new("guild")
            .async_method("getMembers", guild_get_members)
            .async_method("getRoles", guild_get_roles)
            .async_method("getChannels", guild_get_channels)
            .async_method("getEmojis", guild_get_emojis),
        TypeDesc::new("message")
            .async_method("delete", message_delete)
            .async_method("edit", message_edit)
            .async_method("react", message_react),
    ]
}

/// A string property of the receiver that a host call needs.
fn id_of(this: &Value, key: &str, span: Span) -> Result<String, RuntimeError> {
    let id = match this {
        Value::Object(o) => o.get_str(key),
        _ => None,
    };
    id.filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_arg(span, format!("{} has no {key}", this.type_name())))
}

fn message_delete(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let channel_id = id_of(&call.this, "channelId", call.span)?;
        let message_id = id_of(&call.this, "id", call.span)?;
        interp.host_call(HostRequest::MessageDelete { channel_id, message_id }, call.span).await?;
        Ok(Value::Null)
    }
    .boxed()
}

fn message_edit(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let channel_id = id_of(&call.this, "channelId", call.span)?;
        let message_id = id_of(&call.this, "id", call.span)?;
        let payload = payload(call.arg(0), call.span)?;
        let request = HostRequest::MessageEdit { channel_id, message_id, payload };
        fetch::<MessageSnapshot>(interp, request, call.span).await
    }
    .boxed()
}

fn message_react(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let channel_id = id_of(&call.this, "channelId", call.span)?;
        let message_id = id_of(&call.this, "id", call.span)?;
        let emoji = match call.arg(0) {
            Value::Object(o) if o.class == Some("emoji") => {
                format!("{}:{}", o.get_str("name").unwrap_or_default(), o.get_str("id").unwrap_or_default())
            }
            Value::String(s) if !s.is_empty() => s.clone(),
            other => {
                return Err(invalid_arg(call.span, format!("react expects an emoji, got {}", other.type_name())).into())
            }
        };
        interp.host_call(HostRequest::MessageReact { channel_id, message_id, emoji }, call.span).await?;
        Ok(Value::Null)
    }
    .boxed()
}

fn member_get_roles(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let guild_id = id_of(&call.this, "guildId", call.span)?;
        let user_id = id_of(&call.this, "id", call.span)?;
        fetch_list::<RoleSnapshot>(interp, HostRequest::MemberGetRoles { guild_id, user_id }, call.span).await
    }
    .boxed()
}

fn role_get_members(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let guild_id = id_of(&call.this, "guildId", call.span)?;
        let role_id = id_of(&call.this, "id", call.span)?;
        fetch_list::<MemberSnapshot>(interp, HostRequest::RoleGetMembers { guild_id, role_id }, call.span).await
    }
    .boxed()
}

fn channel_send(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let channel_id = id_of(&call.this, "id", call.span)?;
        let payload = payload(call.arg(0), call.span)?;
        fetch::<MessageSnapshot>(interp, HostRequest::ChannelSend { channel_id, payload }, call.span).await
    }
    .boxed()
}

/// `channel.createInvite(maxAgeSeconds?, maxUses?)` → invite URL.
fn channel_create_invite(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let channel_id = id_of(&call.this, "id", call.span)?;
        let count = |i: usize| -> Result<Option<u64>, RuntimeError> {
            match opt_number_arg(&call.args, i, "createInvite", call.span)? {
                Some(n) if n < 0.0 || n.is_nan() => {
                    Err(invalid_arg(call.span, "createInvite expects non-negative numbers"))
                }
                other => Ok(other.map(|n| n as u64)),
            }
        };
        let request = HostRequest::ChannelCreateInvite { channel_id, max_age: count(0)?, max_uses: count(1)? };
        let json = interp.host_call(request, call.span).await?;
        Ok(Value::from_json(json.get("url").unwrap_or(&json)))
    }
    .boxed()
}

fn guild_get_members(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let guild_id = id_of(&call.this, "id", call.span)?;
        fetch_list::<MemberSnapshot>(interp, HostRequest::GuildGetMembers { guild_id }, call.span).await
    }
    .boxed()
}

fn guild_get_roles(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let guild_id = id_of(&call.this, "id", call.span)?;
        fetch_list::<RoleSnapshot>(interp, HostRequest::GuildGetRoles { guild_id }, call.span).await
    }
    .boxed()
}

fn guild_get_channels(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let guild_id = id_of(&call.this, "id", call.span)?;
        fetch_list::<ChannelSnapshot>(interp, HostRequest::GuildGetChannels { guild_id }, call.span).await
    }
    .boxed()
}

fn guild_get_emojis(interp: &mut Interpreter, call: NativeCall) -> BoxFuture<'_, Result<Value, Unwind>> {
    async move {
        let guild_id = id_of(&call.this, "id", call.span)?;
        fetch_list::<EmojiSnapshot>(interp, HostRequest::GuildGetEmojis { guild_id }, call.span).await
    }
    .boxed()
}
