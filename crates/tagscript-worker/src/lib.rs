//! Worker process for custom-command scripts, and the client the bot uses
//! to reach it.

pub mod bridge;
pub mod cache;
pub mod client;
pub mod config;
pub mod correlate;
pub mod protocol;
pub mod transport;
pub mod worker;

pub use cache::{CommandCache, CompiledCommand};
pub use client::{HostAdapter, WorkerClient, WorkerUnavailable};
pub use config::WorkerConfig;
pub use protocol::{CompileRequest, CompileResponse, Envelope, HostReply, Request, Response, RunRequest};
pub use transport::{Link, TransportError};
pub use worker::serve;
