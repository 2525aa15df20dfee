//! Per-project deployment state machine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RunnerError, RunnerResult};

/// Lifecycle of one start or deploy attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployState {
    #[default]
    Idle,
    Installing,
    Starting,
    Building,
    Ready,
    Failed,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Installing => "installing",
            Self::Starting => "starting",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Allowed moves. Terminal states have none; retries are new attempts.
    pub fn can_transition_to(&self, next: DeployState) -> bool {
        use DeployState::*;
        match (self, next) {
            (Idle, Installing) => true,
            (Installing, Starting | Building) => true,
            (Starting | Building, Ready) => true,
            (Idle | Installing | Starting | Building, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Callback receiving `(project_id, new_state)` on every transition.
pub type StateObserver = Arc<dyn Fn(&str, DeployState) + Send + Sync>;

/// Tracks one attempt and notifies the observer.
pub struct DeployTracker {
    project_id: String,
    state: DeployState,
    observer: Option<StateObserver>,
}

impl DeployTracker {
    pub fn new(project_id: impl Into<String>, observer: Option<StateObserver>) -> Self {
        Self {
            project_id: project_id.into(),
            state: DeployState::Idle,
            observer,
        }
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    pub fn advance(&mut self, next: DeployState) -> RunnerResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RunnerError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("{}: {} -> {}", self.project_id, self.state, next);
        self.state = next;
        if let Some(observer) = &self.observer {
            observer(&self.project_id, next);
        }
        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.advance(DeployState::Failed);
        }
    }
}
