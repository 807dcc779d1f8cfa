//! Errors returned by the pipeline driver

use thiserror::Error;

/// Outcome of a run that did not complete successfully
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Static configuration is unusable; no stage was started
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("start source: {0:#}")]
    SourceStart(#[source] anyhow::Error),

    #[error("start operator '{stage}': {source:#}")]
    OperatorStart {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The caller's cancellation token fired before the run completed
    #[error("pipeline cancelled")]
    Cancelled,

    #[error("sink write: {0:#}")]
    SinkWrite(#[source] anyhow::Error),

    #[error("close sink: {0:#}")]
    SinkClose(#[source] anyhow::Error),

    #[error("close source: {0:#}")]
    SourceClose(#[source] anyhow::Error),

    /// The sink consumer task panicked
    #[error("pipeline task panicked: {0}")]
    TaskPanicked(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// True when the run ended because the caller cancelled it
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
