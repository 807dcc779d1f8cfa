//! flowline: an in-process streaming pipeline engine
//!
//! ```no_run
//! use std::time::Duration;
//! use flowline::pipeline::{Pipeline, sink::LogSink, source::CronSource};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), flowline::pipeline::PipelineError> {
//! let source = CronSource::new(Duration::from_secs(1), || 21u32);
//! Pipeline::new("numbers", source)
//!     .filter(|n| n % 2 == 1)
//!     .map(|n| n * 2)
//!     .to(LogSink::new(false))
//!     .run(CancellationToken::new())
//!     .await
//! # }
//! ```

pub mod config;
pub mod pipeline;
