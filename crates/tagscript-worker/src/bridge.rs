//! The worker's side of the host bridge: host calls leave as envelopes and
//! their replies come back through the shared correlation table.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tagscript_lang::{BridgeError, HostBridge, HostRequest};
use tokio::sync::mpsc;

use crate::correlate::{Pending, WaitError};
use crate::protocol::{Envelope, HostReply};

pub struct ChannelBridge {
    outbound: mpsc::UnboundedSender<Envelope>,
    pending: Arc<Pending<HostReply>>,
    default_timeout: Duration,
}

impl ChannelBridge {
    pub fn new(outbound: mpsc::UnboundedSender<Envelope>, pending: Arc<Pending<HostReply>>, default_timeout: Duration) -> Self {
        Self { outbound, pending, default_timeout }
    }
}

impl HostBridge for ChannelBridge {
    fn call(&self, request: HostRequest, timeout: Option<Duration>) -> BoxFuture<'_, Result<serde_json::Value, BridgeError>> {
        async move {
            let timeout = timeout.unwrap_or(self.default_timeout);
            let method = request.method();
            let (id, rx) = self.pending.register();
            let envelope = Envelope::HostCall { id, call: request, timeout_ms: Some(timeout.as_millis() as u64) };
            if self.outbound.send(envelope).is_err() {
                self.pending.cancel(id);
                return Err(BridgeError::Closed);
            }
            match self.pending.wait(id, rx, timeout).await {
                Ok(HostReply::Ok(value))      => Ok(value),
                Ok(HostReply::Rejected(msg))  => Err(BridgeError::Rejected(msg)),
                Ok(HostReply::Failed(msg))    => Err(BridgeError::Failed(msg)),
                Err(WaitError::Timeout(after)) => {
                    tracing::warn!(id, method, ?after, "host call timed out");
                    Err(BridgeError::Timeout(after))
                }
                Err(WaitError::Closed) => Err(BridgeError::Closed),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> (ChannelBridge, mpsc::UnboundedReceiver<Envelope>, Arc<Pending<HostReply>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Pending::new());
        (ChannelBridge::new(tx, pending.clone(), Duration::from_secs(5)), rx, pending)
    }

    #[tokio::test]
    async fn replies_resolve_the_call() {
        let (bridge, mut rx, pending) = bridge();
        let answer = tokio::spawn(async move {
            let Some(Envelope::HostCall { id, call, timeout_ms }) = rx.recv().await else { panic!() };
            assert_eq!(call, HostRequest::GuildGetEmojis { guild_id: "1".into() });
            assert_eq!(timeout_ms, Some(300));
            pending.resolve(id, HostReply::Ok(serde_json::json!([])));
        });
        let got = bridge.call(HostRequest::GuildGetEmojis { guild_id: "1".into() }, Some(Duration::from_millis(300))).await;
        answer.await.unwrap();
        assert_eq!(got, Ok(serde_json::json!([])));
    }

    #[tokio::test]
    async fn rejections_pass_through() {
        let (bridge, mut rx, pending) = bridge();
        tokio::spawn(async move {
            while let Some(env) = rx.recv().await {
                pending.resolve(env.id(), HostReply::Rejected("Unknown Role".into()));
            }
        });
        let got = bridge.call(HostRequest::GetRole { guild_id: "1".into(), role_id: "2".into() }, None).await;
        assert_eq!(got, Err(BridgeError::Rejected("Unknown Role".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let (bridge, _rx, pending) = bridge();
        let got = bridge.call(HostRequest::GuildGetRoles { guild_id: "1".into() }, Some(Duration::from_millis(20))).await;
        assert_eq!(got, Err(BridgeError::Timeout(Duration::from_millis(20))));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn a_dropped_link_is_closed() {
        let (bridge, rx, _) = bridge();
        drop(rx);
        let got = bridge.call(HostRequest::GuildGetRoles { guild_id: "1".into() }, None).await;
        assert_eq!(got, Err(BridgeError::Closed));
    }
}
