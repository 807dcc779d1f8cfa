//! Map operator: replaces each envelope's value, 1:1

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::pipeline::stage::{Operator, StageContext, send_or_cancel};
use crate::pipeline::types::Message;

type MapFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Applies `f` to every value; key, timestamp and metadata pass through
pub struct MapStage<T> {
    f: MapFn<T>,
}

impl<T> MapStage<T> {
    pub fn new(f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<T: Send + 'static> Operator<T> for MapStage<T> {
    fn process(
        &self,
        ctx: &StageContext,
        mut input: mpsc::Receiver<Message<T>>,
    ) -> Result<mpsc::Receiver<Message<T>>> {
        let (tx, rx) = ctx.channel();
        let cancel = ctx.cancel_token().clone();
        let f = self.f.clone();

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

                let msg = msg.map_value(|v| f(v));
                if !send_or_cancel(&cancel, &tx, msg).await {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "MapStage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_map_preserves_envelope() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Message::at("a", 1, 10).with_metadata("m", "x"))
            .await
            .unwrap();
        tx.send(Message::at("b", 2, 11)).await.unwrap();
        drop(tx);

        let stage = MapStage::new(|v: i32| v * 10);
        let mut out = stage
            .process(&StageContext::new(CancellationToken::new()), rx)
            .unwrap();

        let first = out.recv().await.unwrap();
        assert_eq!(first.value, 10);
        assert_eq!(first.key, "a");
        assert_eq!(first.timestamp, 10);
        assert_eq!(first.metadata.get("m").map(String::as_str), Some("x"));

        let second = out.recv().await.unwrap();
        assert_eq!((second.key.as_str(), second.value), ("b", 20));
        assert!(out.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_map_stops_on_cancel() {
        let (_tx, rx) = mpsc::channel::<Message<i32>>(1);
        let cancel = CancellationToken::new();
        let stage = MapStage::new(|v: i32| v);
        let mut out = stage.process(&StageContext::new(cancel.clone()), rx).unwrap();

        cancel.cancel();
        assert!(out.recv().await.is_none());
    }
}
