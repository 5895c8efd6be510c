//! Transport routing
//!
//! Concrete transport adapters (Telegram polling, ntfy HTTP) live outside the
//! core; they push onto `Hub`'s inbound queue and pull from their named
//! outbound queue. The piece that lives here is the `TransportProxy`: a single
//! long-running task that demultiplexes the generic outbound queue onto the
//! per-transport queues by the `channel` field.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::PicoError;
use crate::hub::Hub;

/// Demultiplexes `Hub`'s generic outbound queue to per-transport queues.
///
/// Unknown channels are logged and dropped. Full transport queues are logged
/// and dropped; routing never blocks on a slow transport. The proxy exits
/// when the shutdown signal fires or the outbound queue closes.
pub struct TransportProxy {
    hub: Arc<Hub>,
    shutdown: watch::Receiver<bool>,
}

impl TransportProxy {
    /// Create a proxy over the given hub, wired to the process shutdown signal.
    pub fn new(hub: Arc<Hub>, shutdown: watch::Receiver<bool>) -> Self {
        Self { hub, shutdown }
    }

    /// Run the routing loop until shutdown or queue closure.
    pub async fn run(mut self) {
        info!("Transport proxy started");
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Transport proxy received shutdown signal");
                        break;
                    }
                }
                msg = self.hub.consume_outbound() => {
                    let Some(msg) = msg else {
                        info!("Outbound queue closed, stopping transport proxy");
                        break;
                    };
                    let channel = msg.channel.clone();
                    let chat_id = msg.chat_id.clone();
                    match self.hub.try_route(msg) {
                        Ok(()) => {
                            debug!(channel = %channel, chat_id = %chat_id, "Forwarded outbound message");
                        }
                        Err(PicoError::NotFound(_)) => {
                            warn!(channel = %channel, "Unknown channel, dropping message");
                        }
                        Err(e) => {
                            warn!(channel = %channel, chat_id = %chat_id, error = %e, "Dropping outbound message");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::OutboundMessage;
    use std::time::Duration;

    fn spawn_proxy(hub: &Arc<Hub>) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        let proxy = TransportProxy::new(Arc::clone(hub), rx);
        tokio::spawn(proxy.run());
        tx
    }

    #[tokio::test]
    async fn test_proxy_routes_by_channel() {
        let hub = Arc::new(Hub::with_transports(8, &["telegram", "ntfy"]));
        let shutdown = spawn_proxy(&hub);

        hub.publish_outbound(OutboundMessage::new("telegram", "42", "tg reply"))
            .await
            .unwrap();
        hub.publish_outbound(OutboundMessage::new("ntfy", "7", "ntfy reply"))
            .await
            .unwrap();

        let tg = tokio::time::timeout(Duration::from_secs(1), hub.consume_transport("telegram"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tg.content, "tg reply");
        assert_eq!(tg.chat_id, "42");

        let nt = tokio::time::timeout(Duration::from_secs(1), hub.consume_transport("ntfy"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(nt.content, "ntfy reply");

        // Neither queue holds the other's message.
        assert!(hub.try_consume_transport("telegram").is_none());
        assert!(hub.try_consume_transport("ntfy").is_none());

        shutdown.send(true).ok();
    }

    #[tokio::test]
    async fn test_proxy_drops_unknown_channel() {
        let hub = Arc::new(Hub::with_transports(8, &["telegram"]));
        let shutdown = spawn_proxy(&hub);

        hub.publish_outbound(OutboundMessage::new("discord", "1", "lost"))
            .await
            .unwrap();
        hub.publish_outbound(OutboundMessage::new("telegram", "2", "kept"))
            .await
            .unwrap();

        // Only the telegram message arrives; the unknown one was dropped.
        let received =
            tokio::time::timeout(Duration::from_secs(1), hub.consume_transport("telegram"))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(received.content, "kept");

        shutdown.send(true).ok();
    }

    #[tokio::test]
    async fn test_proxy_exits_on_shutdown() {
        let hub = Arc::new(Hub::with_transports(8, &["telegram"]));
        let (tx, rx) = watch::channel(false);
        let proxy = TransportProxy::new(Arc::clone(&hub), rx);
        let handle = tokio::spawn(proxy.run());

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "proxy should exit promptly on shutdown");
    }

    #[tokio::test]
    async fn test_proxy_exits_on_closed_queue() {
        let hub = Arc::new(Hub::with_transports(8, &["telegram"]));
        // Close before the proxy starts consuming: the drained-and-closed
        // queue yields None and the proxy exits on its own.
        hub.close();

        let (_tx, rx) = watch::channel(false);
        let proxy = TransportProxy::new(Arc::clone(&hub), rx);
        let handle = tokio::spawn(proxy.run());

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "proxy should exit when the queue closes");
    }
}
