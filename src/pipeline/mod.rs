//! Streaming pipeline engine
//!
//! A pipeline wires one source, zero or more operators and one sink into a
//! running execution:
//!
//! ```text
//! Source → Operator₁ → … → Operatorₙ → Sink
//! ```
//!
//! # Architecture
//!
//! - Each stage runs in its own task; edges are bounded, ordered
//!   single-producer/single-consumer channels, so a full buffer blocks its
//!   producer (backpressure)
//! - A single cancellation token reaches every stage, and every blocking
//!   send or receive races against it
//! - The coordinator races completion, cancellation and the first sink
//!   error, then releases sink and source
//! - Health counters are shared by all stages of a run

pub mod coordinator;
pub mod error;
pub mod health;
pub mod operator;
pub mod sink;
pub mod source;
pub mod stage;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_server;

pub use coordinator::Pipeline;
pub use error::PipelineError;
pub use health::{HealthSummary, PipelineHealth};
pub use stage::{Operator, Sink, Source, StageContext, send_or_cancel};
pub use state::PipelineState;
pub use types::{Message, Metadata};
