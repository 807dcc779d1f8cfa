//! Filter operator: forwards envelopes whose value satisfies a predicate

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::pipeline::stage::{Operator, StageContext, send_or_cancel};
use crate::pipeline::types::Message;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Forwards matching envelopes unchanged, preserving their relative order
pub struct FilterStage<T> {
    predicate: Predicate<T>,
}

impl<T> FilterStage<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

impl<T: Send + 'static> Operator<T> for FilterStage<T> {
    fn process(
        &self,
        ctx: &StageContext,
        mut input: mpsc::Receiver<Message<T>>,
    ) -> Result<mpsc::Receiver<Message<T>>> {
        let (tx, rx) = ctx.channel();
        let cancel = ctx.cancel_token().clone();
        let health = ctx.health().clone();
        let predicate = self.predicate.clone();

        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    msg = input.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };

                if !predicate(&msg.value) {
                    health.record_filtered();
                    continue;
                }
                if !send_or_cancel(&cancel, &tx, msg).await {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "FilterStage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_filter_keeps_matching_in_order() {
        let (tx, rx) = mpsc::channel(8);
        for i in 1..=6 {
            tx.send(Message::at(format!("k{}", i), i, 0)).await.unwrap();
        }
        drop(tx);

        let ctx = StageContext::new(CancellationToken::new());
        let stage = FilterStage::new(|v: &i32| v % 3 != 0);
        let mut out = stage.process(&ctx, rx).unwrap();

        let mut kept = Vec::new();
        while let Some(msg) = out.recv().await {
            kept.push((msg.key, msg.value));
        }
        assert_eq!(
            kept,
            vec![
                ("k1".to_string(), 1),
                ("k2".to_string(), 2),
                ("k4".to_string(), 4),
                ("k5".to_string(), 5)
            ]
        );
        assert_eq!(ctx.health().messages_filtered(), 2);
    }

    #[tokio::test]
    async fn test_filter_rejecting_everything_closes_output() {
        let (tx, rx) = mpsc::channel(2);
        tx.send(Message::at("", 1u8, 0)).await.unwrap();
        drop(tx);

        let stage = FilterStage::new(|_: &u8| false);
        let mut out = stage
            .process(&StageContext::new(CancellationToken::new()), rx)
            .unwrap();
        assert!(out.recv().await.is_none());
    }
}
