//! The message-bus seam.
//!
//! [`EventSource`] hands out [`Delivery`] values one at a time. A delivery is
//! settled by [`Delivery::ack`] or [`Delivery::reject`]; dropping it unsettled
//! leaves it with the broker for redelivery.
//!
//! [`memory_queue`] is an in-process broker with those semantics, fed by the
//! HTTP publish endpoint and used by the tests.

use super::event::Envelope;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum AckError {
    #[error("delivery channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error, PartialEq)]
pub enum PublishError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,
}

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acker: Send {
    /// Remove the delivery from the queue.
    async fn ack(self: Box<Self>) -> Result<(), AckError>;

    /// Refuse the delivery without requeueing it.
    async fn reject(self: Box<Self>) -> Result<(), AckError>;
}

/// A subscription delivering messages one at a time.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next delivery. None once the subscription is closed.
    async fn next_delivery(&mut self) -> Option<Delivery>;
}

/// A message handed out by an [`EventSource`], pending settlement.
pub struct Delivery {
    /// Broker-assigned tag, for logs
    pub tag: u64,
    pub envelope: Envelope,
    /// Whether this message was handed out before and not settled
    pub redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(tag: u64, envelope: Envelope, redelivered: bool, acker: impl Acker + 'static) -> Self {
        Self {
            tag,
            envelope,
            redelivered,
            acker: Box::new(acker),
        }
    }

    pub async fn ack(self) -> Result<(), AckError> {
        self.acker.ack().await
    }

    pub async fn reject(self) -> Result<(), AckError> {
        self.acker.reject().await
    }
}

/// Settlement counters for a memory queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    acked: AtomicU64,
    rejected: AtomicU64,
    redelivered: AtomicU64,
}

impl QueueStats {
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn redelivered(&self) -> u64 {
        self.redelivered.load(Ordering::Relaxed)
    }
}

/// Create a bounded in-process queue named `name`.
///
/// The queue closes once every publisher is dropped and all messages,
/// including pending redeliveries, have been handed out.
pub fn memory_queue(name: &str, capacity: usize) -> (MemoryPublisher, MemoryConsumer) {
    let queue: Arc<str> = Arc::from(name);
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (redeliver_tx, redeliver_rx) = mpsc::unbounded_channel();
    let stats = Arc::new(QueueStats::default());

    let publisher = MemoryPublisher {
        queue: queue.clone(),
        tx,
    };
    let consumer = MemoryConsumer {
        queue,
        rx,
        redeliver_tx,
        redeliver_rx,
        next_tag: 1,
        stats,
    };
    (publisher, consumer)
}

#[derive(Clone)]
pub struct MemoryPublisher {
    queue: Arc<str>,
    tx: mpsc::Sender<Envelope>,
}

impl MemoryPublisher {
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Enqueue without waiting; fails if the queue is at capacity.
    pub fn try_publish(&self, envelope: Envelope) -> Result<(), PublishError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::Full,
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }

    /// Enqueue, waiting for capacity.
    pub async fn publish(&self, envelope: Envelope) -> Result<(), PublishError> {
        self.tx.send(envelope).await.map_err(|_| PublishError::Closed)
    }
}

pub struct MemoryConsumer {
    queue: Arc<str>,
    rx: mpsc::Receiver<Envelope>,
    redeliver_tx: mpsc::UnboundedSender<Envelope>,
    redeliver_rx: mpsc::UnboundedReceiver<Envelope>,
    next_tag: u64,
    stats: Arc<QueueStats>,
}

impl MemoryConsumer {
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl EventSource for MemoryConsumer {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        // Redeliveries go first so a failed message is retried before newer ones
        let (envelope, redelivered) = match self.redeliver_rx.try_recv() {
            Ok(envelope) => (envelope, true),
            Err(_) => tokio::select! {
                biased;
                Some(envelope) = self.redeliver_rx.recv() => (envelope, true),
                envelope = self.rx.recv() => (envelope?, false),
            },
        };

        let tag = self.next_tag;
        self.next_tag += 1;

        let acker = MemoryAcker {
            tag,
            envelope: Some(envelope.clone()),
            redeliver: self.redeliver_tx.clone(),
            stats: self.stats.clone(),
        };
        Some(Delivery::new(tag, envelope, redelivered, acker))
    }
}

struct MemoryAcker {
    tag: u64,
    /// Taken once the delivery is settled
    envelope: Option<Envelope>,
    redeliver: mpsc::UnboundedSender<Envelope>,
    stats: Arc<QueueStats>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), AckError> {
        let mut this = self;
        this.envelope.take().ok_or(AckError::ChannelClosed)?;
        this.stats.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn reject(self: Box<Self>) -> Result<(), AckError> {
        let mut this = self;
        let envelope = this.envelope.take().ok_or(AckError::ChannelClosed)?;
        this.stats.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(tag = this.tag, type_tag = %envelope.type_tag, "dropped rejected message");
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if let Some(envelope) = self.envelope.take() {
            self.stats.redelivered.fetch_add(1, Ordering::Relaxed);
            if self.redeliver.send(envelope).is_err() {
                error!(tag = self.tag, "consumer gone, unsettled message lost");
            }
        }
    }
}
