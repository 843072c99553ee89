//! The bot's end of the link. Requests go out with correlation ids; host
//! calls coming back are answered by a [`HostAdapter`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tagscript_lang::{HostRequest, RunResult};
use thiserror::Error as ThisError;
use tokio::sync::mpsc;

use crate::cache::{CommandCache, CompiledCommand};
use crate::correlate::Pending;
use crate::protocol::{CompileRequest, CompileResponse, Envelope, HostReply, Request, Response, RunRequest};
use crate::transport::Link;

/// Anything that went wrong between bot and worker. The dispatch layer
/// drops the command; details are logged where they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("worker unavailable")]
pub struct WorkerUnavailable;

/// Answers host calls against the chat platform.
pub trait HostAdapter: Send + Sync + 'static {
    fn handle(&self, request: HostRequest) -> BoxFuture<'_, HostReply>;
}

#[derive(Clone)]
pub struct WorkerClient {
    outbound: mpsc::UnboundedSender<Envelope>,
    pending: Arc<Pending<Response>>,
    request_timeout: Duration,
}

impl WorkerClient {
    /// Start routing envelopes from `link`. Host calls are served on their
    /// own tasks, each bounded by the timeout the worker attached.
    pub fn connect(link: Link, adapter: Arc<dyn HostAdapter>, request_timeout: Duration) -> Self {
        let Link { tx, mut rx } = link;
        let pending = Arc::new(Pending::<Response>::new());
        let client = Self { outbound: tx.clone(), pending: pending.clone(), request_timeout };

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Response { id, response } => {
                        if !pending.resolve(id, response) {
                            tracing::debug!(id, "late or unknown response dropped");
                        }
                    }
                    Envelope::HostCall { id, call, timeout_ms } => {
                        tokio::spawn(answer(adapter.clone(), tx.clone(), id, call, timeout_ms));
                    }
                    other => tracing::warn!(id = other.id(), "unexpected envelope from the worker"),
                }
            }
            pending.close_all();
            tracing::warn!("worker link closed");
        });

        client
    }

    async fn request(&self, request: Request) -> Result<Response, WorkerUnavailable> {
        let kind = request.kind();
        let (id, rx) = self.pending.register();
        if self.outbound.send(Envelope::Request { id, request }).is_err() {
            self.pending.cancel(id);
            tracing::warn!(id, kind, "worker link closed");
            return Err(WorkerUnavailable);
        }
        match self.pending.wait(id, rx, self.request_timeout).await {
            Ok(Response::Failed) => {
                tracing::warn!(id, kind, "worker failed the request");
                Err(WorkerUnavailable)
            }
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!(id, kind, error = %e, "no response from worker");
                Err(WorkerUnavailable)
            }
        }
    }

    pub async fn compile(&self, code: impl Into<String>) -> Result<CompileResponse, WorkerUnavailable> {
        match self.request(Request::Compile(CompileRequest { code: code.into() })).await? {
            Response::Compiled(compiled) => Ok(compiled),
            other => mismatched(other),
        }
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunResult, WorkerUnavailable> {
        match self.request(Request::Run(request)).await? {
            Response::Ran(result) => Ok(result),
            other => mismatched(other),
        }
    }

    /// Compile `source` into the cache under `name`. An unchanged, current
    /// record is returned without asking the worker.
    pub async fn compile_command(
        &self,
        cache: &CommandCache,
        name: &str,
        source: &str,
    ) -> Result<Arc<CompiledCommand>, WorkerUnavailable> {
        if let Some(existing) = cache.get(name).filter(|c| c.source == source && !c.is_stale()) {
            return Ok(existing);
        }
        let compiled = self.compile(source).await?;
        let mut command = CompiledCommand::new(name, source, compiled, Utc::now());
        if let Some(previous) = cache.get(name) {
            command.enabled = previous.enabled;
        }
        Ok(cache.insert(command))
    }
}

fn mismatched<T>(response: Response) -> Result<T, WorkerUnavailable> {
    tracing::error!(?response, "response does not match its request");
    Err(WorkerUnavailable)
}

async fn answer(
    adapter: Arc<dyn HostAdapter>,
    tx: mpsc::UnboundedSender<Envelope>,
    id: u64,
    call: HostRequest,
    timeout_ms: Option<u64>,
) {
    let method = call.method();
    let reply = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), adapter.handle(call)).await {
            Ok(reply) => reply,
            // The worker has given up on this call already.
            Err(_) => {
                tracing::debug!(id, method, "host call abandoned after its timeout");
                return;
            }
        },
        None => adapter.handle(call).await,
    };
    if tx.send(Envelope::HostReply { id, reply }).is_err() {
        tracing::debug!(id, method, "host reply dropped, worker gone");
    }
}
