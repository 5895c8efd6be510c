//! Message hub
//!
//! The `Hub` is the in-process mailbox between transports and the agent loop.
//! It owns one inbound queue, one generic outbound queue, and one outbound
//! queue per registered transport. All queues are bounded FIFO; producers use
//! non-blocking sends and drop on full so transient transport slowness never
//! stalls the agent loop.
//!
//! ```text
//! Transport ──> Hub.in ──> Agent Loop ──> Hub.out ──> Proxy ──> Hub.transport(name) ──> Transport
//! ```

pub mod message;

pub use message::{InboundMessage, OutboundMessage};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::{PicoError, Result};

/// Default buffer size for hub queues.
const DEFAULT_BUFFER_SIZE: usize = 100;

struct TransportQueue {
    tx: mpsc::Sender<OutboundMessage>,
    rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
}

/// The central hub routing messages between transports and the agent loop.
///
/// Queues are multi-producer / single-consumer. The per-transport outbound
/// queues are keyed by transport name and fixed at construction; the proxy
/// selects one by the `channel` field of each outbound message.
pub struct Hub {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    transports: HashMap<String, TransportQueue>,
    closed: Arc<AtomicBool>,
}

impl Hub {
    /// Create a hub with default buffer size and the standard transports.
    pub fn new() -> Self {
        Self::with_transports(DEFAULT_BUFFER_SIZE, &["telegram", "ntfy"])
    }

    /// Create a hub with a custom buffer size and transport set.
    pub fn with_transports(buffer: usize, transports: &[&str]) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer);

        let transports = transports
            .iter()
            .map(|name| {
                let (tx, rx) = mpsc::channel(buffer);
                (
                    name.to_string(),
                    TransportQueue {
                        tx,
                        rx: Arc::new(Mutex::new(rx)),
                    },
                )
            })
            .collect();

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            transports,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Names of the registered transports.
    pub fn transport_names(&self) -> Vec<&str> {
        self.transports.keys().map(|s| s.as_str()).collect()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PicoError::HubClosed)
        } else {
            Ok(())
        }
    }

    /// Publish an inbound message, waiting for queue space.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.check_open()?;
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| PicoError::HubClosed)
    }

    /// Try to publish an inbound message without blocking.
    ///
    /// Returns `PicoError::Channel` when the queue is full; the caller is
    /// expected to log and drop.
    pub fn try_publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.check_open()?;
        self.inbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                PicoError::Channel("inbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => PicoError::HubClosed,
        })
    }

    /// Consume the next inbound message. `None` when the queue is closed.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Publish an outbound message, waiting for queue space.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.check_open()?;
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| PicoError::HubClosed)
    }

    /// Try to publish an outbound message without blocking; drop-on-full.
    pub fn try_publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.check_open()?;
        self.outbound_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                PicoError::Channel("outbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => PicoError::HubClosed,
        })
    }

    /// Consume the next generic outbound message (used by the proxy).
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Route an outbound message onto the queue for its transport without
    /// blocking.
    ///
    /// Returns `NotFound` for unknown transports and `Channel` when the
    /// transport queue is full.
    pub fn try_route(&self, msg: OutboundMessage) -> Result<()> {
        self.check_open()?;
        let queue = self
            .transports
            .get(&msg.channel)
            .ok_or_else(|| PicoError::NotFound(format!("unknown channel: {}", msg.channel)))?;
        queue.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => {
                PicoError::Channel(format!("{} queue full", m.channel))
            }
            mpsc::error::TrySendError::Closed(_) => PicoError::HubClosed,
        })
    }

    /// Consume the next message from a transport's outbound queue.
    ///
    /// `None` when the transport is unknown or its queue is closed.
    pub async fn consume_transport(&self, channel: &str) -> Option<OutboundMessage> {
        let queue = self.transports.get(channel)?;
        queue.rx.lock().await.recv().await
    }

    /// Try to consume from a transport queue without blocking (tests, drains).
    pub fn try_consume_transport(&self, channel: &str) -> Option<OutboundMessage> {
        let queue = self.transports.get(channel)?;
        queue.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Close all queues: further sends fail with `HubClosed`. Pending
    /// messages may still be drained by consumers.
    ///
    /// Receivers currently blocked in a recv are left to observe the
    /// process shutdown signal instead; their queues are closed lazily.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut rx) = self.inbound_rx.try_lock() {
            rx.close();
        }
        if let Ok(mut rx) = self.outbound_rx.try_lock() {
            rx.close();
        }
        for queue in self.transports.values() {
            if let Ok(mut rx) = queue.rx.try_lock() {
                rx.close();
            }
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Hub {
    /// Clones share the same underlying queues.
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
            transports: self
                .transports
                .iter()
                .map(|(name, q)| {
                    (
                        name.clone(),
                        TransportQueue {
                            tx: q.tx.clone(),
                            rx: Arc::clone(&q.rx),
                        },
                    )
                })
                .collect(),
            closed: Arc::clone(&self.closed),
        }
    }
}
