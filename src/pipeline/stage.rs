//! Pipeline stage traits
//!
//! Defines the contracts for sources, operators and sinks, plus the context
//! every stage receives when it is started.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::health::PipelineHealth;
use super::types::Message;
use crate::config::DEFAULT_BUFFER_SIZE;

/// Runtime context handed to each stage when the pipeline starts it
#[derive(Clone)]
pub struct StageContext {
    cancel: CancellationToken,
    buffer_size: usize,
    health: Arc<PipelineHealth>,
}

impl StageContext {
    /// Create a context with the default buffer size and fresh health counters
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            buffer_size: DEFAULT_BUFFER_SIZE,
            health: Arc::new(PipelineHealth::new()),
        }
    }

    /// Capacity of the outgoing channel each stage creates (clamped to 1)
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Share an existing set of health counters
    pub fn with_health(mut self, health: Arc<PipelineHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /// Create a bounded edge sized for this pipeline
    pub fn channel<T>(&self) -> (mpsc::Sender<Message<T>>, mpsc::Receiver<Message<T>>) {
        mpsc::channel(self.buffer_size)
    }
}

/// Send `item` unless cancellation is observed first.
///
/// Cancellation is polled before the send, so once the token has fired no
/// further item is sent. Returns false when the item was not delivered
/// (cancelled or the receiver is gone), signalling the caller to stop.
pub async fn send_or_cancel<T>(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<T>,
    item: T,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        res = tx.send(item) => res.is_ok(),
    }
}

/// Producer of envelopes
#[async_trait]
pub trait Source<T: Send + 'static>: Send {
    /// Start producing.
    ///
    /// Invalid static configuration fails here without spawning anything.
    /// Otherwise exactly one producer task is spawned; it closes the returned
    /// channel when it stops, and stops promptly once the context's token fires.
    fn stream(&mut self, ctx: &StageContext) -> Result<mpsc::Receiver<Message<T>>>;

    /// Release held resources. Idempotent.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;
}

/// Single-input, single-output transformation stage
pub trait Operator<In, Out = In>: Send + Sync {
    /// Spawn one forwarding task reading `input` and return its output channel.
    ///
    /// The task ends, closing its output, when `input` is exhausted or the
    /// context's token fires.
    fn process(
        &self,
        ctx: &StageContext,
        input: mpsc::Receiver<Message<In>>,
    ) -> Result<mpsc::Receiver<Message<Out>>>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;
}

/// Terminal consumer of envelopes
///
/// `write` is called once per envelope, in arrival order, from a single task.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send {
    async fn write(&mut self, cancel: &CancellationToken, msg: Message<T>) -> Result<()>;

    /// Flush and release resources. Idempotent.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_or_cancel_delivers() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        assert!(send_or_cancel(&cancel, &tx, 5).await);
        assert_eq!(rx.recv().await, Some(5));
    }

    #[tokio::test]
    async fn test_send_or_cancel_stops_after_cancel() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);
        cancel.cancel();

        // Capacity is available, but the cancelled token wins
        assert!(!send_or_cancel(&cancel, &tx, 1).await);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_or_cancel_unblocks_full_channel() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        assert!(send_or_cancel(&cancel, &tx, 1).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert!(!send_or_cancel(&cancel, &tx, 2).await);
    }

    #[tokio::test]
    async fn test_send_or_cancel_closed_receiver() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(!send_or_cancel(&cancel, &tx, 1).await);
    }

    #[test]
    fn test_context_buffer_size_clamped() {
        let ctx = StageContext::new(CancellationToken::new()).with_buffer_size(0);
        assert_eq!(ctx.buffer_size(), 1);
        assert_eq!(
            StageContext::new(CancellationToken::new()).buffer_size(),
            DEFAULT_BUFFER_SIZE
        );
    }
}
