//! Console sink writing each envelope as JSON

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

use crate::pipeline::stage::Sink;
use crate::pipeline::types::Message;

/// Fixed tag opening every line
pub const LOG_PREFIX: &str = "[PIPELINE] ";

/// Writes `[PIPELINE] <date> <time> <json>` per envelope, stdout by default
pub struct LogSink<T> {
    writer: Box<dyn Write + Send>,
    pretty: bool,
    _marker: PhantomData<fn(T)>,
}

impl<T> LogSink<T> {
    pub fn new(pretty: bool) -> Self {
        Self::with_writer(pretty, std::io::stdout())
    }

    pub fn with_writer(pretty: bool, writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            pretty,
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize> LogSink<T> {
    fn render(&self, msg: &Message<T>) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(msg)
        } else {
            serde_json::to_string(msg)
        };
        json.context("marshal message")
    }
}

#[async_trait]
impl<T: Serialize + Send + 'static> Sink<T> for LogSink<T> {
    async fn write(&mut self, _cancel: &CancellationToken, msg: Message<T>) -> Result<()> {
        let json = self.render(&msg)?;
        let stamp = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
        writeln!(self.writer, "{}{} {}", LOG_PREFIX, stamp, json).context("write log line")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().context("flush log sink")
    }

    fn name(&self) -> &'static str {
        "LogSink"
    }
}
