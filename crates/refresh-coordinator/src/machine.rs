//! Refresh state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The coordinator executes the I/O implied by each action (sleeping,
//! issuing the refresh call, replaying, terminating the session).
//!
//! One machine runs per logical request that entered the refresh path:
//!
//! ```text
//! Idle --Unauthorized(cooldown>0)--> CoolingDown --CooldownElapsed--> Refreshing
//! Idle --Unauthorized(cooldown=0)--> Refreshing
//! Refreshing --RefreshSucceeded--> Replaying                     (terminal)
//! Refreshing --RefreshCredentialMissing--> Aborted               (terminal)
//! Refreshing --RefreshFailed(n >= max)--> Aborted                (terminal)
//! Refreshing --RefreshFailed(n < max)--> Idle (after inter-retry delay)
//! ```

use std::time::Duration;

use crate::policy::RetryPolicy;
use crate::terminator::SessionEndReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    CoolingDown,
    Refreshing,
    Replaying,
    Aborted,
}

impl RefreshState {
    /// State label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::CoolingDown => "cooling_down",
            RefreshState::Refreshing => "refreshing",
            RefreshState::Replaying => "replaying",
            RefreshState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshState::Replaying | RefreshState::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// Request classified unauthorized; carries how much of the cooldown
    /// window is left (zero when a refresh can be joined or reused)
    Unauthorized { cooldown_remaining: Duration },
    /// Cooldown wait finished
    CooldownElapsed,
    /// Store holds no refresh credential
    RefreshCredentialMissing,
    /// A new pair is stored, whether this request issued the refresh,
    /// joined one in flight, or found it already rotated
    RefreshSucceeded,
    /// Refresh call failed; `retry_count` is the request's attempt number
    RefreshFailed { retry_count: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshAction {
    /// Sleep for the remainder of the cooldown window
    WaitCooldown(Duration),
    /// Issue (or join) the refresh call
    IssueRefresh,
    /// Wait, then hand the request back to the dispatcher
    Replay { delay: Duration },
    /// Wait, then start another attempt
    RetryAfter(Duration),
    /// Clear the session and surface the error
    Abort(SessionEndReason),
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(
    state: RefreshState,
    event: RefreshEvent,
    policy: &RetryPolicy,
) -> (RefreshState, RefreshAction) {
    match (state, event) {
        // --- Idle ---
        (RefreshState::Idle, RefreshEvent::Unauthorized { cooldown_remaining })
            if !cooldown_remaining.is_zero() =>
        {
            (
                RefreshState::CoolingDown,
                RefreshAction::WaitCooldown(cooldown_remaining),
            )
        }

        (RefreshState::Idle, RefreshEvent::Unauthorized { .. }) => {
            (RefreshState::Refreshing, RefreshAction::IssueRefresh)
        }

        // --- CoolingDown ---
        (RefreshState::CoolingDown, RefreshEvent::CooldownElapsed) => {
            (RefreshState::Refreshing, RefreshAction::IssueRefresh)
        }

        // --- Refreshing ---
        (RefreshState::Refreshing, RefreshEvent::RefreshCredentialMissing) => (
            RefreshState::Aborted,
            RefreshAction::Abort(SessionEndReason::NoRefreshToken),
        ),

        (RefreshState::Refreshing, RefreshEvent::RefreshSucceeded) => (
            RefreshState::Replaying,
            RefreshAction::Replay {
                delay: policy.inter_retry_delay(),
            },
        ),

        (RefreshState::Refreshing, RefreshEvent::RefreshFailed { retry_count, error })
            if retry_count >= policy.max_attempts =>
        {
            (
                RefreshState::Aborted,
                RefreshAction::Abort(SessionEndReason::AttemptsExhausted {
                    attempts: retry_count,
                    last_error: error,
                }),
            )
        }

        (RefreshState::Refreshing, RefreshEvent::RefreshFailed { .. }) => (
            RefreshState::Idle,
            RefreshAction::RetryAfter(policy.inter_retry_delay()),
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, RefreshAction::None),
    }
}
