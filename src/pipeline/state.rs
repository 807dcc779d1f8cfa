//! Pipeline state management

use std::time::Instant;

/// Pipeline state machine
///
/// `Configuring → Running → {Completed, Cancelled, Failed}`. Terminal states
/// are mutually exclusive and never left. A configuration error fails the
/// pipeline straight from `Configuring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pipeline is being built and has not started any stage
    Configuring,

    /// Stages are running
    Running {
        /// When the pipeline started running
        started_at: Instant,
    },

    /// Source finished and every stage drained into the sink
    Completed,

    /// The caller's cancellation token fired first
    Cancelled,

    /// A configuration or sink error ended the run
    Failed,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Configuring, Running { .. }) => true,
            (Configuring, Failed) => true,

            (Running { .. }, Completed) => true,
            (Running { .. }, Cancelled) => true,
            (Running { .. }, Failed) => true,

            // No re-entry once an outcome is committed
            (Completed | Cancelled | Failed, _) => false,

            _ => false,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PipelineState::Configuring => "Configuring",
            PipelineState::Running { .. } => "Running",
            PipelineState::Completed => "Completed",
            PipelineState::Cancelled => "Cancelled",
            PipelineState::Failed => "Failed",
        }
    }

    /// Check if an outcome has been committed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Cancelled | PipelineState::Failed
        )
    }

    /// Get the duration since the pipeline started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let configuring = PipelineState::Configuring;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };

        assert!(configuring.can_transition_to(&running));
        assert!(configuring.can_transition_to(&PipelineState::Failed));
        assert!(running.can_transition_to(&PipelineState::Completed));
        assert!(running.can_transition_to(&PipelineState::Cancelled));
        assert!(running.can_transition_to(&PipelineState::Failed));
    }

    #[test]
    fn test_invalid_transitions() {
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };

        assert!(!PipelineState::Configuring.can_transition_to(&PipelineState::Completed));
        assert!(!PipelineState::Configuring.can_transition_to(&PipelineState::Cancelled));
        assert!(!PipelineState::Completed.can_transition_to(&running));
        assert!(!PipelineState::Completed.can_transition_to(&PipelineState::Failed));
        assert!(!PipelineState::Cancelled.can_transition_to(&PipelineState::Completed));
        assert!(!PipelineState::Failed.can_transition_to(&PipelineState::Failed));
        assert!(!running.can_transition_to(&PipelineState::Configuring));
        assert!(!running.can_transition_to(&running));
        assert!(!PipelineState::Configuring.can_transition_to(&PipelineState::Configuring));
    }

    #[test]
    fn test_state_checks() {
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };

        assert!(!running.is_terminal());
        assert!(running.running_duration().is_some());

        assert!(!PipelineState::Configuring.is_terminal());
        assert!(PipelineState::Completed.is_terminal());
        assert!(PipelineState::Cancelled.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert_eq!(PipelineState::Failed.running_duration(), None);
        assert_eq!(PipelineState::Cancelled.to_string(), "Cancelled");
    }
}
