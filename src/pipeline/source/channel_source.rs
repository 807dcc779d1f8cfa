//! Channel-adapter source
//!
//! Re-wraps values from an existing in-memory feed into envelopes with an
//! empty key and empty metadata. Useful for tests and in-memory pipelines.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use log::info;
use tokio::sync::mpsc;

use crate::pipeline::stage::{Source, StageContext, send_or_cancel};
use crate::pipeline::types::Message;

/// Source draining a feed until it is exhausted or cancellation fires
///
/// The feed can be consumed by a single `stream` call.
pub struct ChannelSource<T> {
    feed: Option<BoxStream<'static, T>>,
}

impl<T: Send + 'static> ChannelSource<T> {
    /// Adapt a bounded channel receiver
    pub fn from_receiver(rx: mpsc::Receiver<T>) -> Self {
        let feed = stream::unfold(rx, |mut rx| async move {
            let value = rx.recv().await?;
            Some((value, rx))
        });
        Self::from_stream(feed)
    }

    /// Adapt any asynchronous stream of values
    pub fn from_stream(feed: impl futures_util::Stream<Item = T> + Send + 'static) -> Self {
        Self {
            feed: Some(feed.boxed()),
        }
    }

    /// Adapt a finite in-memory collection
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(values))
    }
}

#[async_trait]
impl<T: Send + 'static> Source<T> for ChannelSource<T> {
    fn stream(&mut self, ctx: &StageContext) -> Result<mpsc::Receiver<Message<T>>> {
        let mut feed = self
            .feed
            .take()
            .ok_or_else(|| anyhow!("ChannelSource: feed already consumed"))?;

        let (tx, rx) = ctx.channel();
        let cancel = ctx.cancel_token().clone();
        let health = ctx.health().clone();

        tokio::spawn(async move {
            let mut total = 0u64;

            loop {
                let value = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    value = feed.next() => match value {
                        Some(value) => value,
                        None => break,
                    },
                };

                if !send_or_cancel(&cancel, &tx, Message::new("", value)).await {
                    break;
                }
                health.record_emitted();
                total += 1;
            }

            info!("ChannelSource: finished ({} values)", total);
        });

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "ChannelSource"
    }
}
