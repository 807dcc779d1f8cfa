//! HTTP forwarding sink
//!
//! Marshals each value (JSON by default) and sends it to a fixed URL with a
//! configurable method (POST by default) and headers. Any transport failure
//! or a status outside 2xx fails the write.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::{Client, Method};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::HttpConfig;
use crate::pipeline::stage::Sink;
use crate::pipeline::types::Message;

/// Value encoder producing a request body
pub type Marshaler<T> = Arc<dyn Fn(&T) -> Result<Bytes> + Send + Sync>;

/// Default marshaler: `T` as JSON
pub fn json_marshaler<T: Serialize>() -> Marshaler<T> {
    Arc::new(|value: &T| Ok(Bytes::from(serde_json::to_vec(value)?)))
}

pub struct HttpSink<T> {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    config: HttpConfig,
    client: Option<Client>,
    marshaler: Marshaler<T>,
}

impl<T: Serialize> HttpSink<T> {
    /// POST JSON-encoded values to `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            config: HttpConfig::default(),
            client: None,
            marshaler: json_marshaler(),
        }
    }
}

impl<T> HttpSink<T> {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a header, replacing any previous value with the same name
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.headers.push((key, value.into()));
        self
    }

    pub fn with_marshaler(mut self, marshaler: Marshaler<T>) -> Self {
        self.marshaler = marshaler;
        self
    }

    /// Timeout and extra headers; headers merge into the sink's own
    pub fn with_config(mut self, config: HttpConfig) -> Self {
        for (key, value) in &config.headers {
            self = self.with_header(key.clone(), value.clone());
        }
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

    fn client(&mut self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = self.config.build_client()?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for HttpSink<T> {
    async fn write(&mut self, cancel: &CancellationToken, msg: Message<T>) -> Result<()> {
        let body = (self.marshaler)(&msg.value).context("marshal message")?;
        let client = self.client()?;

        let mut request = client.request(self.method.clone(), &self.url).body(body);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("send request: cancelled"),
            resp = request.send() => resp.context("send request")?,
        };

        let status = resp.status();
        if !status.is_success() {
            bail!("unexpected status code: {}", status.as_u16());
        }

        debug!("HttpSink: {} {} -> {} (key {:?})", self.method, self.url, status, msg.key);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HttpSink"
    }
}
