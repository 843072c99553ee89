pub mod bridge;
pub mod error;
pub mod namespaces;
pub mod runtime;
pub mod syntax;
pub mod types;

pub use bridge::context::RunSettings;
pub use bridge::embed::{EmbedDescriptor, MessagePayload};
pub use bridge::snapshot::MessageSnapshot;
pub use bridge::{BridgeError, EntityRef, HostBridge, HostRequest, NoHost};
pub use error::{CompileDiagnostic, Error, ErrorCode, RuntimeError};
pub use runtime::value::Value;
pub use syntax::codec::{decode, encode, CodecError, FORMAT_VERSION};
pub use syntax::cst::Program;
pub use types::time::{Clock, FixedClock, SystemClock};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use runtime::interpreter::{Interpreter, RunOutcome, DEFAULT_CALL_TIMEOUT};
use runtime::scope::Scope;
use syntax::cst::Span;

// ─── Public API ───────────────────────────────────────────────────────────────

/// Lex and parse source text. The error carries an excerpt of the
/// offending line.
pub fn compile(source: &str) -> Result<Program, Error> {
    tracing::debug!(bytes = source.len(), "compiling");
    syntax::parser::parse(source).map_err(|e| e.with_source(source))
}

// ─── Run results ──────────────────────────────────────────────────────────────

/// What the dispatch layer receives from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunResult {
    Error { error: ErrorReport },
    Embed { embed: EmbedDescriptor },
    /// `None` when the script finished without replying.
    Content { content: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Compile,
    Runtime,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl ErrorReport {
    pub fn runtime(e: RuntimeError) -> Self {
        let located = e.line > 0;
        Self {
            kind: ErrorKind::Runtime,
            message: e.message,
            code: Some(e.code.as_str().to_string()),
            line: located.then_some(e.line),
            column: located.then_some(e.column),
            excerpt: e.excerpt,
        }
    }

    /// A run whose source never compiled.
    pub fn compile(e: &Error) -> Self {
        Self {
            kind: ErrorKind::Compile,
            message: e.message.clone(),
            code: Some(e.code.as_str().to_string()),
            line: Some(e.line),
            column: Some(e.column),
            excerpt: (!e.excerpt.is_empty()).then(|| e.excerpt.clone()),
        }
    }

    /// Details of internal faults go to the log, never to the user.
    pub fn unknown() -> Self {
        Self { kind: ErrorKind::Unknown, message: "Unknown Error".into(), code: None, line: None, column: None, excerpt: None }
    }
}

impl RunResult {
    pub fn unknown() -> Self {
        Self::Error { error: ErrorReport::unknown() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    fn from_outcome(outcome: RunOutcome, source: &str) -> Self {
        match outcome {
            RunOutcome::Reply(v) => Self::from_reply(&v)
                .unwrap_or_else(|e| Self::Error { error: ErrorReport::runtime(e.with_source(source)) }),
            RunOutcome::Fallthrough => Self::Content { content: None },
            RunOutcome::Error(e) => {
                tracing::debug!(code = e.code.as_str(), line = e.line, "script error");
                Self::Error { error: ErrorReport::runtime(e.with_source(source)) }
            }
            RunOutcome::Internal(detail) => {
                tracing::error!(%detail, "internal fault during run");
                Self::unknown()
            }
        }
    }

    fn from_reply(v: &Value) -> Result<Self, RuntimeError> {
        if matches!(v, Value::Null | Value::Function(_) | Value::NativeFunction(_)) {
            return Ok(Self::Content { content: None });
        }
        let payload = bridge::embed::payload(v, Span::default())?;
        Ok(match payload.embed {
            Some(embed) => Self::Embed { embed },
            None => Self::Content { content: payload.content },
        })
    }
}

// ─── Runtime ──────────────────────────────────────────────────────────────────

/// Runs compiled programs against a host. Cheap to clone; every run gets
/// its own interpreter and scope chain.
#[derive(Clone)]
pub struct Runtime {
    bridge: Arc<dyn HostBridge>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl Runtime {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self { bridge, clock: Arc::new(SystemClock), call_timeout: DEFAULT_CALL_TIMEOUT }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Default host-call timeout. Run settings may override it per run.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Execute `program` for one triggering message. `source` is only used
    /// for error excerpts.
    pub async fn run(
        &self,
        program: &Program,
        source: &str,
        message: &MessageSnapshot,
        settings: &RunSettings,
    ) -> RunResult {
        let globals = Scope::root();
        bridge::context::bind(&globals, message, settings);

        let timeout = settings.call_timeout_ms.map_or(self.call_timeout, Duration::from_millis);
        let mut interp = Interpreter::new(self.bridge.clone())
            .with_clock(self.clock.clone())
            .with_call_timeout(timeout)
            .with_context(message.guild_id.clone(), Some(message.channel_id.clone()));

        tracing::debug!(message = %message.id, command = %settings.command, "run started");
        let outcome = interp.run(program, globals).await;
        RunResult::from_outcome(outcome, source)
    }
}
