use std::time::Duration;

use clap::Parser;

use crate::transport::DEFAULT_MAX_FRAME;

/// Worker settings, from flags or `TAGSCRIPT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "tagscript-worker", about = "Compiles and runs custom-command scripts over stdio")]
pub struct WorkerConfig {
    /// Default timeout for one host call, in milliseconds.
    #[arg(long, env = "TAGSCRIPT_HOST_CALL_TIMEOUT_MS", default_value_t = 5_000)]
    pub host_call_timeout_ms: u64,

    /// Upper bound for serving one compile or run request, in milliseconds.
    #[arg(long, env = "TAGSCRIPT_REQUEST_TIMEOUT_MS", default_value_t = 60_000)]
    pub request_timeout_ms: u64,

    /// Largest frame accepted or sent, in bytes.
    #[arg(long, env = "TAGSCRIPT_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME)]
    pub max_frame_bytes: usize,

    /// `tracing` filter directives. Logs go to stderr.
    #[arg(long, env = "TAGSCRIPT_LOG", default_value = "info")]
    pub log: String,
}

impl WorkerConfig {
    pub fn host_call_timeout(&self) -> Duration {
        Duration::from_millis(self.host_call_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host_call_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
            max_frame_bytes: DEFAULT_MAX_FRAME,
            log: "info".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = WorkerConfig::try_parse_from([
            "tagscript-worker",
            "--host-call-timeout-ms",
            "250",
            "--log",
            "tagscript=debug",
        ])
        .unwrap();
        assert_eq!(config.host_call_timeout(), Duration::from_millis(250));
        assert_eq!(config.log, "tagscript=debug");
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME);
    }

    #[test]
    fn rejects_non_numeric_timeouts() {
        assert!(WorkerConfig::try_parse_from(["tagscript-worker", "--request-timeout-ms", "soon"]).is_err());
    }
}
