//! Pipeline operators
//!
//! Each operator spawns one forwarding task per `process` call.

pub mod filter_stage;
pub mod map_stage;

pub use filter_stage::FilterStage;
pub use map_stage::MapStage;
