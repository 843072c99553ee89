//! Plain-data views of chat entities as the host sends them. Every field has
//! a default so hosts may omit what they do not know.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSnapshot {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemberSnapshot {
    pub guild_id: String,
    pub user: UserSnapshot,
    pub nickname: Option<String>,
    /// Role ids.
    pub roles: Vec<String>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl MemberSnapshot {
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .or(self.user.global_name.as_deref())
            .unwrap_or(&self.user.username)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleSnapshot {
    pub id: String,
    pub guild_id: String,
    pub name: String,
    pub color: u32,
    pub position: i64,
    pub mentionable: bool,
    pub hoist: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSnapshot {
    pub id: String,
    pub guild_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: Option<String>,
    pub nsfw: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuildSnapshot {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub member_count: u64,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmojiSnapshot {
    pub id: String,
    pub name: String,
    pub animated: bool,
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReactionSnapshot {
    /// Unicode emoji or `name:id` for custom ones.
    pub emoji: String,
    pub count: u64,
    pub me: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MentionsSnapshot {
    pub users: Vec<UserSnapshot>,
    pub members: Vec<MemberSnapshot>,
    pub roles: Vec<RoleSnapshot>,
    pub channels: Vec<ChannelSnapshot>,
    pub everyone: bool,
}

/// The triggering message, with the entities around it the host already
/// has at hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageSnapshot {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub content: String,
    pub author: UserSnapshot,
    pub member: Option<MemberSnapshot>,
    pub channel: Option<ChannelSnapshot>,
    pub guild: Option<GuildSnapshot>,
    pub mentions: MentionsSnapshot,
    pub reactions: Vec<ReactionSnapshot>,
    pub created_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub pinned: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_snapshots_fill_defaults() {
        let m: MessageSnapshot = serde_json::from_value(serde_json::json!({
            "id": "1",
            "channelId": "2",
            "content": "!hi",
            "author": {"id": "3", "username": "ada"}
        }))
        .unwrap();
        assert_eq!(m.author.username, "ada");
        assert!(m.member.is_none());
        assert!(m.mentions.users.is_empty());
    }

    #[test]
    fn channel_kind_is_named_type_on_the_wire() {
        let c: ChannelSnapshot = serde_json::from_str(r#"{"id":"5","name":"general","type":"text"}"#).unwrap();
        assert_eq!(c.kind, "text");
    }

    #[test]
    fn display_name_prefers_nickname() {
        let mut m = MemberSnapshot::default();
        m.user.username = "ada".into();
        assert_eq!(m.display_name(), "ada");
        m.user.global_name = Some("Ada L".into());
        assert_eq!(m.display_name(), "Ada L");
        m.nickname = Some("countess".into());
        assert_eq!(m.display_name(), "countess");
    }
}
