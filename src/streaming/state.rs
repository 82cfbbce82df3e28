//! Relay lifecycle
//!
//! `Idle → Requesting → Streaming → {Completed | Errored}`. `Errored` is
//! reachable from every non-terminal state; nothing leaves a terminal state.

use std::fmt;

/// Lifecycle state of one relay instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Completed,
    Errored,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-use state holder. Illegal transitions are ignored and reported.
#[derive(Debug, Default, Clone)]
pub struct StateTracker {
    state: RelayState,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Call start.
    pub fn begin_request(&mut self) -> bool {
        self.transition(RelayState::Requesting)
    }

    /// First decoded line. Later calls while streaming are no-ops.
    pub fn line_received(&mut self) -> bool {
        match self.state {
            RelayState::Streaming => true,
            RelayState::Idle => {
                // Relays fed directly from a line source skip the request step.
                self.state = RelayState::Requesting;
                self.transition(RelayState::Streaming)
            }
            _ => self.transition(RelayState::Streaming),
        }
    }

    pub fn complete(&mut self) -> bool {
        self.transition(RelayState::Completed)
    }

    pub fn fail(&mut self) -> bool {
        self.transition(RelayState::Errored)
    }

    fn transition(&mut self, next: RelayState) -> bool {
        let allowed = match (self.state, next) {
            (from, _) if from.is_terminal() => false,
            (_, RelayState::Errored) => true,
            (RelayState::Idle, RelayState::Requesting) => true,
            (RelayState::Requesting, RelayState::Streaming) => true,
            (RelayState::Requesting | RelayState::Streaming, RelayState::Completed) => true,
            _ => false,
        };
        if allowed {
            tracing::trace!(from = %self.state, to = %next, "relay state");
            self.state = next;
        } else {
            tracing::debug!(from = %self.state, to = %next, "ignored relay transition");
        }
        allowed
    }
}
