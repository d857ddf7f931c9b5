//! Client authentication session core for ezi.
//!
//! This crate provides:
//! - Session management with persist-then-flip commit ordering
//! - Explicit FSM-based session state tracking
//! - Liveness checking with transparent single-flight token refresh
//! - Integration with credential storage for session persistence
//! - HTTP client for the identity backend

mod backend;
mod error;
mod session;
mod session_fsm;

pub use backend::{AuthBackend, Liveness, RefreshedTokens, SessionGrant};
pub use error::{AuthError, AuthResult};
pub use session::{SessionCallback, SessionManager, SessionSnapshot};
pub use session_fsm::session_machine;
pub use session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionPhase};
