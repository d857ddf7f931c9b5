//! Session state machine using rust-fsm.
//!
//! This module defines an explicit finite state machine for the session
//! lifecycle. All state changes flow through its transition table, which is
//! the single place where out-of-order operations (logging in while already
//! authenticated, refreshing with no session) are rejected.
//!
//! ## State Diagram
//!
//! ```text
//!            ┌──────────────────┐
//!            │ LoadingPersisted │ (initial)
//!            └────────┬─────────┘
//!     RestoredSession │ NothingPersisted
//!          ┌──────────┘└──────────┐
//!          ▼                      ▼
//! ┌───────────────┐      ┌─────────────────┐
//! │ Authenticated │      │ Unauthenticated │
//! └───────┬───────┘      └────────┬────────┘
//!         │ RefreshStarted        │ LoginStarted / SignupStarted
//!         ▼                       ▼
//! ┌───────────────┐      ┌─────────────────────────────┐
//! │  Refreshing   │      │ Authenticating / SigningUp  │
//! └───────┬───────┘      └────────┬────────────────────┘
//!         │                       │
//!         │ RefreshSucceeded      │ LoginSucceeded / SignupSucceeded
//!         │   ──► Authenticated   │   ──► Authenticated
//!         │ RefreshFailed         │ LoginFailed / SignupFailed
//!         │   ──► Unauthenticated │   ──► Unauthenticated
//!         ▼                       ▼
//!
//! Authenticated ── LogoutRequested ──► Unauthenticated
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Define the FSM using rust-fsm's declarative macro.
// This generates a module `session_machine` with:
// - session_machine::State (enum)
// - session_machine::Input (enum)
// - session_machine::StateMachine (type alias)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(LoadingPersisted)

    LoadingPersisted => {
        // Complete triplet found in storage
        RestoredSession => Authenticated,
        // Storage empty, incomplete, or unreadable
        NothingPersisted => Unauthenticated
    },
    Unauthenticated => {
        LoginStarted => Authenticating,
        SignupStarted => SigningUp
    },
    Authenticating => {
        LoginSucceeded => Authenticated,
        LoginFailed => Unauthenticated
    },
    SigningUp => {
        SignupSucceeded => Authenticated,
        SignupFailed => Unauthenticated
    },
    Authenticated => {
        RefreshStarted => Refreshing,
        LogoutRequested => Unauthenticated
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        RefreshFailed => Unauthenticated
    }
}

// Re-export the generated types with clearer names
pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Simplified session phase for external consumption.
///
/// This is the machine state as observers see it in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Reading the persisted session at startup.
    LoadingPersisted,
    /// No session.
    Unauthenticated,
    /// Login request in flight.
    Authenticating,
    /// Signup request in flight.
    SigningUp,
    /// Live session with a user and token pair.
    Authenticated,
    /// Token refresh in flight; the session stays usable meanwhile.
    Refreshing,
}

impl SessionPhase {
    /// Returns true if a live session exists (user and tokens are present).
    ///
    /// Refreshing counts: token rotation is transparent and must not log the
    /// observer out.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionPhase::Authenticated | SessionPhase::Refreshing)
    }

    /// Returns true while an operation the user is waiting on is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionPhase::LoadingPersisted | SessionPhase::Authenticating | SessionPhase::SigningUp
        )
    }

    /// Returns true for any state that always resolves to a steady state
    /// (`Authenticated` or `Unauthenticated`).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionPhase::LoadingPersisted
                | SessionPhase::Authenticating
                | SessionPhase::SigningUp
                | SessionPhase::Refreshing
        )
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::LoadingPersisted => SessionPhase::LoadingPersisted,
            SessionMachineState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionMachineState::Authenticating => SessionPhase::Authenticating,
            SessionMachineState::SigningUp => SessionPhase::SigningUp,
            SessionMachineState::Authenticated => SessionPhase::Authenticated,
            SessionMachineState::Refreshing => SessionPhase::Refreshing,
        }
    }
}
