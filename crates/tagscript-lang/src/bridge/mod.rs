//! Host bridge: the interpreter's only way to reach chat entities.
//!
//! A run asks the host for data or side effects through [`HostBridge::call`].
//! The host answers with a JSON snapshot which the entity constructors turn
//! into runtime values.

use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

pub mod context;
pub mod embed;
pub mod entities;
pub mod snapshot;

use embed::MessagePayload;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum BridgeError {
    /// The host understood the call and refused it (missing permission,
    /// unknown entity). Surfaces to the script as a runtime error.
    #[error("{0}")]
    Rejected(String),
    #[error("host call timed out after {0:?}")]
    Timeout(Duration),
    #[error("host channel closed")]
    Closed,
    #[error("malformed host response: {0}")]
    Malformed(String),
    /// The host itself broke while serving the call.
    #[error("host error: {0}")]
    Failed(String),
}

// ─── Trait ────────────────────────────────────────────────────────────────────

pub trait HostBridge: Send + Sync {
    /// `timeout` overrides the bridge's default for this call.
    fn call(
        &self,
        request: HostRequest,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<serde_json::Value, BridgeError>>;
}

/// A bridge with nothing behind it. Every call is rejected.
pub struct NoHost;

impl HostBridge for NoHost {
    fn call(&self, request: HostRequest, _: Option<Duration>) -> BoxFuture<'_, Result<serde_json::Value, BridgeError>> {
        let method = request.method();
        future::ready(Err(BridgeError::Rejected(format!("no host available for {method}")))).boxed()
    }
}

// ─── Requests ─────────────────────────────────────────────────────────────────

/// Every call a script can make on the host, with its id-bearing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all_fields = "camelCase")]
pub enum HostRequest {
    #[serde(rename = "getEmoji")]
    GetEmoji { guild_id: String, emoji_id: String },
    #[serde(rename = "getMessage")]
    GetMessage { channel_id: String, message_id: String },
    #[serde(rename = "getRole")]
    GetRole { guild_id: String, role_id: String },
    #[serde(rename = "getMember")]
    GetMember { guild_id: String, user_id: String },
    #[serde(rename = "getChannel")]
    GetChannel { guild_id: String, channel_id: String },

    #[serde(rename = "message.delete")]
    MessageDelete { channel_id: String, message_id: String },
    #[serde(rename = "message.edit")]
    MessageEdit { channel_id: String, message_id: String, payload: MessagePayload },
    #[serde(rename = "message.react")]
    MessageReact { channel_id: String, message_id: String, emoji: String },

    #[serde(rename = "channel.send")]
    ChannelSend { channel_id: String, payload: MessagePayload },
    #[serde(rename = "channel.createInvite")]
    ChannelCreateInvite { channel_id: String, max_age: Option<u64>, max_uses: Option<u64> },

    #[serde(rename = "role.getMembers")]
    RoleGetMembers { guild_id: String, role_id: String },
    #[serde(rename = "member.getRoles")]
    MemberGetRoles { guild_id: String, user_id: String },

    #[serde(rename = "guild.getMembers")]
    GuildGetMembers { guild_id: String },
    #[serde(rename = "guild.getRoles")]
    GuildGetRoles { guild_id: String },
    #[serde(rename = "guild.getChannels")]
    GuildGetChannels { guild_id: String },
    #[serde(rename = "guild.getEmojis")]
    GuildGetEmojis { guild_id: String },
}

impl HostRequest {
    /// Wire name of the call.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetEmoji { .. }            => "getEmoji",
            Self::GetMessage { .. }          => "getMessage",
            Self::GetRole { .. }             => "getRole",
            Self::GetMember { .. }           => "getMember",
            Self::GetChannel { .. }          => "getChannel",
            Self::MessageDelete { .. }       => "message.delete",
            Self::MessageEdit { .. }         => "message.edit",
            Self::MessageReact { .. }        => "message.react",
            Self::ChannelSend { .. }         => "channel.send",
            Self::ChannelCreateInvite { .. } => "channel.createInvite",
            Self::RoleGetMembers { .. }      => "role.getMembers",
            Self::MemberGetRoles { .. }      => "member.getRoles",
            Self::GuildGetMembers { .. }     => "guild.getMembers",
            Self::GuildGetRoles { .. }       => "guild.getRoles",
            Self::GuildGetChannels { .. }    => "guild.getChannels",
            Self::GuildGetEmojis { .. }      => "guild.getEmojis",
        }
    }
}

/// An entity the script already holds, or only knows the id of.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRef<T> {
    ById(String),
    Snapshot(T),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_serialize_with_wire_names() {
        let req = HostRequest::GetMember { guild_id: "1".into(), user_id: "2".into() };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"method": "getMember", "params": {"guildId": "1", "userId": "2"}}));
        assert_eq!(req.method(), "getMember");
    }

    #[test]
    fn dotted_names_round_trip() {
        let req = HostRequest::GuildGetEmojis { guild_id: "9".into() };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"guild.getEmojis\""));
        assert_eq!(serde_json::from_str::<HostRequest>(&json).unwrap(), req);
    }

    #[tokio::test]
    async fn no_host_rejects() {
        let e = NoHost.call(HostRequest::GuildGetRoles { guild_id: "1".into() }, None).await.unwrap_err();
        assert!(matches!(e, BridgeError::Rejected(m) if m.contains("guild.getRoles")));
    }
}
