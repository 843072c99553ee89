//! Envelopes exchanged between the bot process and the worker.
//!
//! Both directions carry their own correlation ids. The bot numbers its
//! requests; the worker numbers its host calls. Replies are matched by id,
//! never by arrival order.

use serde::{Deserialize, Serialize};
use tagscript_lang::{CompileDiagnostic, HostRequest, MessageSnapshot, RunResult, RunSettings};

pub type CorrelationId = u64;

// ─── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Envelope {
    /// bot → worker
    Request { id: CorrelationId, request: Request },
    /// worker → bot
    Response { id: CorrelationId, response: Response },
    /// worker → bot
    HostCall {
        id: CorrelationId,
        call: HostRequest,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// bot → worker
    HostReply { id: CorrelationId, reply: HostReply },
}

impl Envelope {
    pub fn id(&self) -> CorrelationId {
        match self {
            Self::Request { id, .. }
            | Self::Response { id, .. }
            | Self::HostCall { id, .. }
            | Self::HostReply { id, .. } => *id,
        }
    }
}

// ─── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Request {
    Compile(CompileRequest),
    Run(RunRequest),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Compile(_) => "compile",
            Self::Run(_)     => "run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub code: String,
}

/// The dispatch layer's calling contract. Without `cst` the worker
/// compiles `code` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Command id, used for logging.
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub cst: Option<Vec<u8>>,
    pub message: MessageSnapshot,
    #[serde(default)]
    pub settings: RunSettings,
}

// ─── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Response {
    Compiled(CompileResponse),
    Ran(RunResult),
    /// The worker could not serve the request. Details are in its log.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    /// Encoded CST, present when there are no errors.
    #[serde(default)]
    pub cst: Option<Vec<u8>>,
    pub errors: Vec<CompileDiagnostic>,
}

impl CompileResponse {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.cst.is_some()
    }
}

// ─── Host replies ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostReply {
    Ok(serde_json::Value),
    /// The platform refused the call; the script sees a runtime error.
    Rejected(String),
    /// The adapter broke; the run ends with an unknown error.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_are_externally_tagged() {
        let env = Envelope::Request { id: 3, request: Request::Compile(CompileRequest { code: "reply 1".into() }) };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json, serde_json::json!({"request": {"id": 3, "request": {"compile": {"code": "reply 1"}}}}));
        assert_eq!(env.id(), 3);
    }

    #[test]
    fn run_requests_default_settings_and_cst() {
        let json = serde_json::json!({
            "run": {"id": "cmd-1", "code": "reply 1", "message": {"id": "1", "channelId": "2"}}
        });
        let Request::Run(run) = serde_json::from_value(json).unwrap() else { panic!() };
        assert!(run.cst.is_none());
        assert_eq!(run.settings.prefix, "!");
    }

    #[test]
    fn host_calls_carry_the_request_shape() {
        let env = Envelope::HostCall {
            id: 9,
            call: HostRequest::GuildGetRoles { guild_id: "1".into() },
            timeout_ms: Some(250),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["hostCall"]["call"]["method"], "guild.getRoles");
        assert_eq!(json["hostCall"]["timeoutMs"], 250);
    }
}
