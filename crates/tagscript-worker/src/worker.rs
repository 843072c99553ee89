//! The worker loop. Every request runs on its own task so a slow run never
//! holds up a compile or another run; host replies are routed back to the
//! waiting run by correlation id.

use std::sync::Arc;
use std::time::Duration;

use tagscript_lang::{compile, decode, encode, ErrorReport, Program, RunResult, Runtime};
use tokio::sync::mpsc;

use crate::bridge::ChannelBridge;
use crate::config::WorkerConfig;
use crate::correlate::Pending;
use crate::protocol::{CompileRequest, CompileResponse, CorrelationId, Envelope, HostReply, Request, Response, RunRequest};
use crate::transport::Link;

#[derive(Clone)]
struct Handler {
    runtime: Runtime,
}

/// Serve requests arriving on `link` until the peer goes away.
pub async fn serve(link: Link, config: &WorkerConfig) {
    let Link { tx, mut rx } = link;
    let pending = Arc::new(Pending::<HostReply>::new());
    let bridge = ChannelBridge::new(tx.clone(), pending.clone(), config.host_call_timeout());
    let handler = Handler { runtime: Runtime::new(Arc::new(bridge)).with_call_timeout(config.host_call_timeout()) };
    let request_timeout = config.request_timeout();

    tracing::info!("worker ready");
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Request { id, request } => {
                tokio::spawn(dispatch(handler.clone(), tx.clone(), id, request, request_timeout));
            }
            Envelope::HostReply { id, reply } => {
                if !pending.resolve(id, reply) {
                    tracing::debug!(id, "late or unknown host reply dropped");
                }
            }
            other => tracing::warn!(id = other.id(), "unexpected envelope from the bot"),
        }
    }
    pending.close_all();
    tracing::info!("peer gone, worker stopping");
}

/// Run one request under the request timeout. Panics and timeouts become
/// opaque failures; the details stay in the log. A timed-out job is aborted
/// and stops at its next yield point.
async fn dispatch(
    handler: Handler,
    tx: mpsc::UnboundedSender<Envelope>,
    id: CorrelationId,
    request: Request,
    timeout: Duration,
) {
    let kind = request.kind();
    let fallback = match &request {
        Request::Compile(_) => Response::Failed,
        Request::Run(_) => Response::Ran(RunResult::unknown()),
    };
    let mut job = tokio::spawn(async move { handler.respond(request).await });
    let response = match tokio::time::timeout(timeout, &mut job).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(id, kind, error = %e, "request task failed");
            fallback
        }
        Err(_) => {
            job.abort();
            tracing::warn!(id, kind, ?timeout, "request timed out, job aborted");
            fallback
        }
    };
    if tx.send(Envelope::Response { id, response }).is_err() {
        tracing::debug!(id, "response dropped, peer gone");
    }
}

impl Handler {
    async fn respond(&self, request: Request) -> Response {
        match request {
            Request::Compile(req) => compile_request(req),
            Request::Run(req) => Response::Ran(self.run(req).await),
        }
    }

    async fn run(&self, req: RunRequest) -> RunResult {
        let program = match load(&req) {
            Ok(program) => program,
            Err(e) => {
                tracing::debug!(command = %req.id, code = e.code.as_str(), "run of a command that does not compile");
                return RunResult::Error { error: ErrorReport::compile(&e) };
            }
        };
        let result = self.runtime.run(&program, &req.code, &req.message, &req.settings).await;
        tracing::debug!(command = %req.id, error = result.is_error(), "run finished");
        result
    }
}

fn compile_request(req: CompileRequest) -> Response {
    let program = match compile(&req.code) {
        Ok(program) => program,
        Err(e) => return Response::Compiled(CompileResponse { cst: None, errors: vec![e.to_diagnostic()] }),
    };
    match encode(&program) {
        Ok(cst) => Response::Compiled(CompileResponse { cst: Some(cst), errors: Vec::new() }),
        Err(e) => {
            tracing::error!(error = %e, "cannot encode compiled tree");
            Response::Failed
        }
    }
}

/// The program for a run: the shipped tree when it decodes, the source
/// otherwise.
fn load(req: &RunRequest) -> Result<Program, tagscript_lang::Error> {
    if let Some(bytes) = &req.cst {
        match decode(bytes) {
            Ok(program) => return Ok(program),
            Err(e) => tracing::warn!(command = %req.id, error = %e, "compiled tree unusable, recompiling"),
        }
    }
    compile(&req.code)
}
