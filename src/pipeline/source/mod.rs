//! Pipeline sources
//!
//! - CronSource: timer-driven generator
//! - HttpSource: HTTP long-poller
//! - ChannelSource: adapter over an in-memory feed

pub mod channel_source;
pub mod cron_source;
pub mod http_source;

pub use channel_source::ChannelSource;
pub use cron_source::CronSource;
pub use http_source::{HttpSource, Parser, json_parser};
