//! Pipeline coordinator
//!
//! Chains source → operators → sink over bounded channels and owns the
//! run's cancellation, error and cleanup contract.

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::operator::{FilterStage, MapStage};
use crate::pipeline::stage::{Operator, Sink, Source, StageContext, send_or_cancel};
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::Message;

type BoxedSink<T> = Box<dyn Sink<T>>;

/// First terminal signal observed by the driver
enum Outcome<T: Send + 'static> {
    /// Consumer drained the terminal channel and handed the sink back
    Completed(Result<BoxedSink<T>, JoinError>),
    Cancelled,
    Failed(PipelineError),
}

/// A streaming pipeline: one source, zero or more operators, one sink
///
/// Built with the fluent `with_*`/`map`/`filter`/`via`/`to` steps, then
/// consumed by `run`. Grab `health()` and `subscribe_state()` handles before
/// running to observe the run.
pub struct Pipeline<T: Send + 'static> {
    name: String,
    source: Box<dyn Source<T>>,
    operators: Vec<Box<dyn Operator<T>>>,
    sink: Option<BoxedSink<T>>,
    config: PipelineConfig,
    health: Arc<PipelineHealth>,
    state: watch::Sender<PipelineState>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create a new pipeline reading from `source`
    pub fn new(name: impl Into<String>, source: impl Source<T> + 'static) -> Self {
        let (state, _) = watch::channel(PipelineState::Configuring);
        Self {
            name: name.into(),
            source: Box::new(source),
            operators: Vec::new(),
            sink: None,
            config: PipelineConfig::default(),
            health: Arc::new(PipelineHealth::new()),
            state,
        }
    }

    /// Capacity of every inter-stage channel
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Capacity of the sink error side-channel
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.config.error_capacity = capacity;
        self
    }

    /// Log a health summary at this period while running
    pub fn with_health_log_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.health_log_interval = Some(interval);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace each value with `f(value)`
    pub fn map(self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.via(MapStage::new(f))
    }

    /// Drop envelopes whose value does not satisfy `predicate`
    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.via(FilterStage::new(predicate))
    }

    /// Append any operator to the chain
    pub fn via(mut self, operator: impl Operator<T> + 'static) -> Self {
        self.operators.push(Box::new(operator));
        self
    }

    /// Set the sink, replacing any previous one
    pub fn to(mut self, sink: impl Sink<T> + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Counters shared by every stage of the run
    pub fn health(&self) -> Arc<PipelineHealth> {
        self.health.clone()
    }

    /// Observe state transitions, including after `run` consumed the pipeline
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn transition(&self, next: PipelineState) {
        let current = self.state();
        if !current.can_transition_to(&next) {
            if current.is_terminal() {
                warn!("Pipeline '{}': already {}, ignoring {}", self.name, current, next);
                return;
            }
            warn!(
                "Pipeline '{}': ignoring invalid transition {} -> {}",
                self.name, current, next
            );
            return;
        }
        self.state.send_replace(next);
    }

    fn reject(&self, reason: impl Into<String>) -> Result<(), PipelineError> {
        let reason = reason.into();
        error!("Pipeline '{}': {}", self.name, reason);
        self.transition(PipelineState::Failed);
        Err(PipelineError::InvalidConfig(reason))
    }

    /// Execute until the source is drained, `cancel` fires or the sink fails.
    ///
    /// Returns `Ok(())` on completion, `PipelineError::Cancelled` when the
    /// caller's token fired first, or the first stage error. The sink and
    /// then the source are closed only on completion; a close error is then
    /// returned. Cancellation and failure return at once, without waiting for
    /// an in-flight sink write and without closing either end.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let Some(sink) = self.sink.take() else {
            return self.reject("sink is required");
        };
        if let Err(reason) = self.config.validate() {
            return self.reject(reason);
        }

        // Stages get a child token: the driver can stop them without
        // cancelling the caller, and the guard stops them on any exit
        let run_token = cancel.child_token();
        let _stop_stages = run_token.clone().drop_guard();
        let ctx = StageContext::new(run_token.clone())
            .with_buffer_size(self.config.buffer_size)
            .with_health(self.health.clone());

        self.transition(PipelineState::Running {
            started_at: Instant::now(),
        });
        info!(
            "Pipeline '{}': starting {} -> {} operator(s) -> {} (buffer {})",
            self.name,
            self.source.name(),
            self.operators.len(),
            sink.name(),
            self.config.buffer_size
        );

        let terminal = self
            .source
            .stream(&ctx)
            .map_err(PipelineError::SourceStart)
            .and_then(|rx| {
                self.operators.iter().try_fold(rx, |rx, op| {
                    op.process(&ctx, rx)
                        .map_err(|source| PipelineError::OperatorStart {
                            stage: op.name(),
                            source,
                        })
                })
            });

        let outcome = match terminal {
            Ok(terminal) => self.drive(sink, terminal, &cancel, &run_token).await,
            Err(e) => {
                run_token.cancel();
                Outcome::Failed(e)
            }
        };

        self.conclude(outcome).await
    }

    /// Spawn the sink consumer and race completion, cancellation and errors
    async fn drive(
        &mut self,
        sink: BoxedSink<T>,
        terminal: mpsc::Receiver<Message<T>>,
        cancel: &CancellationToken,
        run_token: &CancellationToken,
    ) -> Outcome<T> {
        let (errors_tx, mut errors_rx) = mpsc::channel(self.config.error_capacity);
        let mut consumer = tokio::spawn(consume(
            sink,
            terminal,
            run_token.clone(),
            errors_tx,
            self.health.clone(),
        ));

        if let Some(period) = self.config.health_log_interval {
            spawn_health_log(
                self.name.clone(),
                self.health.clone(),
                run_token.clone(),
                period,
            );
        }

        // An error already queued when the consumer finished still wins
        let outcome = tokio::select! {
            biased;
            Some(err) = errors_rx.recv() => Outcome::Failed(err),
            _ = cancel.cancelled() => Outcome::Cancelled,
            joined = &mut consumer => Outcome::Completed(joined),
        };

        if !matches!(outcome, Outcome::Completed(_)) {
            // A sink write may ignore the token; do not wait for it
            run_token.cancel();
            consumer.abort();
        }
        outcome
    }

    /// Release both ends after a completed run, publish the terminal state
    /// and pick the result
    async fn conclude(&mut self, outcome: Outcome<T>) -> Result<(), PipelineError> {
        let (state, result) = match outcome {
            Outcome::Completed(Ok(mut sink)) => {
                (PipelineState::Completed, self.release(&mut sink).await)
            }
            Outcome::Completed(Err(join_error)) => {
                error!("Pipeline '{}': sink task failed: {}", self.name, join_error);
                (PipelineState::Failed, Err(PipelineError::TaskPanicked(join_error)))
            }
            Outcome::Cancelled => (PipelineState::Cancelled, Err(PipelineError::Cancelled)),
            Outcome::Failed(e) => (PipelineState::Failed, Err(e)),
        };

        let ran = self.state().running_duration().unwrap_or_default();
        self.transition(state);
        info!(
            "Pipeline '{}': {} after {:.1?} ({})",
            self.name,
            state,
            ran,
            self.health.summary()
        );
        result
    }

    /// Close the sink, then the source; both are attempted
    async fn release(&mut self, sink: &mut BoxedSink<T>) -> Result<(), PipelineError> {
        let mut first = None;
        if let Err(e) = sink.close().await {
            first = Some(PipelineError::SinkClose(e));
        }
        if let Err(e) = self.source.close().await {
            let e = PipelineError::SourceClose(e);
            if first.is_some() {
                warn!("Pipeline '{}': {}", self.name, e);
            } else {
                first = Some(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Sink consumer task: writes envelopes in arrival order, forwards failures
async fn consume<T: Send + 'static>(
    mut sink: BoxedSink<T>,
    mut input: mpsc::Receiver<Message<T>>,
    cancel: CancellationToken,
    errors: mpsc::Sender<PipelineError>,
    health: Arc<PipelineHealth>,
) -> BoxedSink<T> {
    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = input.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match sink.write(&cancel, msg).await {
            Ok(()) => health.record_written(),
            Err(e) => {
                health.record_sink_failure();
                error!("{}: write failed: {:#}", sink.name(), e);
                if !send_or_cancel(&cancel, &errors, PipelineError::SinkWrite(e)).await {
                    break;
                }
            }
        }
    }
    sink
}

fn spawn_health_log(
    name: String,
    health: Arc<PipelineHealth>,
    cancel: CancellationToken,
    period: std::time::Duration,
) {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => info!(
                    "Pipeline '{}': {} (idle {:?})",
                    name,
                    health.summary(),
                    health.idle_for()
                ),
            }
        }
    });
}
