//! Pipeline sinks
//!
//! - LogSink: JSON lines on standard output
//! - HttpSink: forwards each value over HTTP

pub mod http_sink;
pub mod log_sink;

pub use http_sink::{HttpSink, Marshaler, json_marshaler};
pub use log_sink::{LOG_PREFIX, LogSink};
