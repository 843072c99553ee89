use clap::Parser;
use tagscript_worker::{serve, transport, WorkerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = WorkerConfig::parse();

    // stdout carries frames; logs go to stderr.
    let filter = EnvFilter::try_new(&config.log).unwrap_or_else(|e| {
        eprintln!("invalid log filter '{}': {e}, using 'info'", config.log);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    tracing::debug!(?config, "starting");
    serve(transport::stdio(config.max_frame_bytes), &config).await;
}
