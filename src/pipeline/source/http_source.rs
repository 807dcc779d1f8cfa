//! HTTP polling source
//!
//! Issues a GET immediately on start and then once per interval. A poll that
//! fails for any reason (transport, non-200 status, body read, parse) emits
//! nothing and is only counted in `PipelineHealth::polls_skipped`.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::HttpConfig;
use crate::pipeline::stage::{Source, StageContext, send_or_cancel};
use crate::pipeline::types::Message;

/// Body decoder turning a response into a payload
pub type Parser<T> = Arc<dyn Fn(&[u8]) -> Result<T> + Send + Sync>;

/// Default parser: JSON into `T`
pub fn json_parser<T: DeserializeOwned>() -> Parser<T> {
    Arc::new(|body: &[u8]| Ok(serde_json::from_slice(body)?))
}

/// Pull-based source polling a fixed URL
pub struct HttpSource<T> {
    url: String,
    interval: Duration,
    config: HttpConfig,
    client: Option<Client>,
    parser: Parser<T>,
}

impl<T: DeserializeOwned> HttpSource<T> {
    /// Poll `url` every `interval`, decoding bodies as JSON
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self::with_parser(url, interval, json_parser())
    }
}

impl<T> HttpSource<T> {
    /// Poll `url` every `interval` with a custom body parser
    pub fn with_parser(url: impl Into<String>, interval: Duration, parser: Parser<T>) -> Self {
        Self {
            url: url.into(),
            interval,
            config: HttpConfig::default(),
            client: None,
            parser,
        }
    }

    /// Timeout and headers used when building the client
    pub fn with_config(mut self, config: HttpConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a prebuilt client; its own timeout applies
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Everything one poll needs, cloned into the producer task
struct Poller<T> {
    url: String,
    client: Client,
    headers: Vec<(String, String)>,
    parser: Parser<T>,
}

impl<T> Poller<T> {
    async fn poll(&self) -> Result<Message<T>> {
        let mut request = self.client.get(&self.url);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let resp = request.send().await.context("send request")?;
        let status = resp.status();
        if status != StatusCode::OK {
            bail!("unexpected status code: {}", status.as_u16());
        }

        let body = resp.bytes().await.context("read body")?;
        let value = (self.parser)(&body).context("parse body")?;

        Ok(Message::new(self.url.clone(), value)
            .with_metadata("source", "http")
            .with_metadata("url", self.url.clone())
            .with_metadata("status", status.as_u16().to_string()))
    }
}

#[async_trait]
impl<T: Send + 'static> Source<T> for HttpSource<T> {
    fn stream(&mut self, ctx: &StageContext) -> Result<mpsc::Receiver<Message<T>>> {
        if self.interval.is_zero() {
            bail!("HttpSource: interval must be positive");
        }
        if self.url.is_empty() {
            return Err(anyhow!("HttpSource: url is required"));
        }

        let client = match &self.client {
            Some(client) => client.clone(),
            None => {
                let client = self.config.build_client()?;
                self.client = Some(client.clone());
                client
            }
        };

        let poller = Poller {
            url: self.url.clone(),
            client,
            headers: self.config.headers.clone(),
            parser: self.parser.clone(),
        };

        let (tx, rx) = ctx.channel();
        let cancel = ctx.cancel_token().clone();
        let health = ctx.health().clone();
        let period = self.interval;

        tokio::spawn(async move {
            // First tick completes immediately: poll on start, then on interval
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    outcome = poller.poll() => outcome,
                };

                match outcome {
                    Ok(msg) => {
                        if !send_or_cancel(&cancel, &tx, msg).await {
                            break;
                        }
                        health.record_emitted();
                    }
                    Err(e) => {
                        health.record_poll_skipped();
                        debug!("HttpSource: skipped poll of {}: {:#}", poller.url, e);
                    }
                }
            }

            info!("HttpSource: stopped polling {}", poller.url);
        });

        info!("HttpSource: polling {} every {:?}", self.url, period);
        Ok(rx)
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping our handle releases the idle connection pool once the
        // producer task has exited as well
        self.client = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HttpSource"
    }
}
