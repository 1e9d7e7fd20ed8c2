//! User initialization state machine using rust-fsm.
//!
//! ```text
//!            DataVerified
//!   ┌──────────────────────────────────────────┐
//!   │                                          ▼
//! Unknown ── StartAttempt ──► InProgress ── AttemptSucceeded ──► Success
//!   ▲                            │
//!   │ Reset (any state)          ├── AttemptFailed ──► Failed
//!   │                            └── WentOffline ───► RequiresRetry
//! ```
//!
//! `Failed` and `RequiresRetry` re-enter `InProgress` on a new attempt.
//! `AttemptSucceeded` is only accepted from `InProgress`, so a finished
//! attempt cannot report success twice.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub init_machine(Unknown)

    Unknown => {
        StartAttempt => InProgress,
        DataVerified => Success,
        AttemptFailed => Failed,
        WentOffline => RequiresRetry,
        Reset => Unknown
    },
    InProgress => {
        // A newer attempt supersedes the running one
        StartAttempt => InProgress,
        DataVerified => Success,
        AttemptSucceeded => Success,
        AttemptFailed => Failed,
        WentOffline => RequiresRetry,
        Reset => Unknown
    },
    Success => {
        StartAttempt => InProgress,
        DataVerified => Success,
        AttemptFailed => Failed,
        WentOffline => RequiresRetry,
        Reset => Unknown
    },
    Failed => {
        StartAttempt => InProgress,
        DataVerified => Success,
        AttemptFailed => Failed,
        WentOffline => RequiresRetry,
        Reset => Unknown
    },
    RequiresRetry => {
        StartAttempt => InProgress,
        DataVerified => Success,
        AttemptFailed => Failed,
        WentOffline => RequiresRetry,
        Reset => Unknown
    }
}

pub use init_machine::Input as InitMachineInput;
pub use init_machine::State as InitMachineState;
pub use init_machine::StateMachine as InitMachine;

/// Initialization status exposed to the UI and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationStatus {
    Unknown,
    InProgress,
    Success,
    Failed,
    RequiresRetry,
}

impl InitializationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitializationStatus::Unknown => "unknown",
            InitializationStatus::InProgress => "in_progress",
            InitializationStatus::Success => "success",
            InitializationStatus::Failed => "failed",
            InitializationStatus::RequiresRetry => "requires_retry",
        }
    }
}

impl std::fmt::Display for InitializationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&InitMachineState> for InitializationStatus {
    fn from(state: &InitMachineState) -> Self {
        match state {
            InitMachineState::Unknown => InitializationStatus::Unknown,
            InitMachineState::InProgress => InitializationStatus::InProgress,
            InitMachineState::Success => InitializationStatus::Success,
            InitMachineState::Failed => InitializationStatus::Failed,
            InitMachineState::RequiresRetry => InitializationStatus::RequiresRetry,
        }
    }
}

impl From<InitializationStatus> for InitMachineState {
    fn from(status: InitializationStatus) -> Self {
        match status {
            InitializationStatus::Unknown => InitMachineState::Unknown,
            InitializationStatus::InProgress => InitMachineState::InProgress,
            InitializationStatus::Success => InitMachineState::Success,
            InitializationStatus::Failed => InitMachineState::Failed,
            InitializationStatus::RequiresRetry => InitMachineState::RequiresRetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_unknown() {
        let machine = InitMachine::new();
        assert_eq!(*machine.state(), InitMachineState::Unknown);
    }

    #[test]
    fn test_initialize_flow() {
        let mut machine = InitMachine::new();

        machine.consume(&InitMachineInput::StartAttempt).unwrap();
        assert_eq!(*machine.state(), InitMachineState::InProgress);

        machine.consume(&InitMachineInput::AttemptSucceeded).unwrap();
        assert_eq!(*machine.state(), InitMachineState::Success);
    }

    #[test]
    fn test_success_cannot_be_reported_outside_an_attempt() {
        let mut machine = InitMachine::new();
        assert!(machine.consume(&InitMachineInput::AttemptSucceeded).is_err());

        machine.consume(&InitMachineInput::DataVerified).unwrap();
        assert!(machine.consume(&InitMachineInput::AttemptSucceeded).is_err());
        assert_eq!(*machine.state(), InitMachineState::Success);
    }

    #[test]
    fn test_failed_and_requires_retry_reenter_in_progress() {
        let mut machine = InitMachine::new();
        machine.consume(&InitMachineInput::AttemptFailed).unwrap();
        machine.consume(&InitMachineInput::StartAttempt).unwrap();
        assert_eq!(*machine.state(), InitMachineState::InProgress);

        machine.consume(&InitMachineInput::WentOffline).unwrap();
        assert_eq!(*machine.state(), InitMachineState::RequiresRetry);
        machine.consume(&InitMachineInput::StartAttempt).unwrap();
        assert_eq!(*machine.state(), InitMachineState::InProgress);
    }

    #[test]
    fn test_reset_from_any_state() {
        for status in [
            InitializationStatus::InProgress,
            InitializationStatus::Success,
            InitializationStatus::Failed,
            InitializationStatus::RequiresRetry,
        ] {
            let mut machine = InitMachine::from_state(status.into());
            machine.consume(&InitMachineInput::Reset).unwrap();
            assert_eq!(*machine.state(), InitMachineState::Unknown);
        }
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&InitializationStatus::RequiresRetry).unwrap(),
            "\"requires_retry\""
        );
        assert_eq!(
            InitializationStatus::from(&InitMachineState::InProgress).to_string(),
            "in_progress"
        );
    }
}
