//! Session lifecycle management on top of the session state machine.
//!
//! `SessionManager` owns the in-memory session, the credential store, and the
//! backend client. All mutation goes through its named operations; every
//! commit persists durable state before the in-memory phase flips, and
//! teardown always completes locally regardless of what the network does.

use crate::backend::{AuthBackend, Liveness, SessionGrant};
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionPhase};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use ezi_storage::{CredentialStore, TokenPair, User, UserUpdate};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Point-in-time view of the session handed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current phase of the session machine.
    pub phase: SessionPhase,
    /// True when a live session exists.
    pub is_authenticated: bool,
    /// True while an operation the user is waiting on is in flight.
    pub is_loading: bool,
    /// Current user, present exactly when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Human-readable message from the last failed operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the current session was established by an explicit login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// Callback type for session change notifications.
pub type SessionCallback = Box<dyn Fn(SessionSnapshot) + Send + Sync>;

/// Everything guarded by the session lock.
///
/// The machine and the data fields live under one mutex so the phase and the
/// user/token fields can never be observed out of step.
struct SessionState {
    machine: SessionMachine,
    user: Option<User>,
    tokens: Option<TokenPair>,
    error: Option<String>,
    last_login: Option<DateTime<Utc>>,
    /// Bumped on every teardown. In-flight results are applied only if the
    /// epoch they started under is still current; a late success must not
    /// resurrect a session after logout.
    epoch: u64,
}

/// Session manager for the client auth lifecycle.
///
/// One instance per process, shared by `Arc`. Login, signup, logout, refresh,
/// and bootstrap are the only paths that mutate session state; observers read
/// consistent snapshots or subscribe via [`SessionManager::set_on_change`].
pub struct SessionManager {
    backend: AuthBackend,
    store: CredentialStore,
    state: Mutex<SessionState>,
    /// Serializes refresh attempts so exactly one network refresh is issued
    /// no matter how many callers notice the stale token at once.
    refresh_gate: tokio::sync::Mutex<()>,
    /// Optional observer notified with a snapshot after every committed change.
    on_change: Mutex<Option<SessionCallback>>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(store: CredentialStore, backend: AuthBackend) -> Self {
        Self {
            backend,
            store,
            state: Mutex::new(SessionState {
                machine: SessionMachine::new(),
                user: None,
                tokens: None,
                error: None,
                last_login: None,
                epoch: 0,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            on_change: Mutex::new(None),
        }
    }

    /// Set a callback to be notified of session changes.
    pub fn set_on_change(&self, callback: SessionCallback) {
        let mut cb = self.on_change.lock().unwrap();
        *cb = Some(callback);
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().unwrap();
        Self::project(&state)
    }

    /// Current phase of the session machine.
    pub fn phase(&self) -> SessionPhase {
        let state = self.state.lock().unwrap();
        SessionPhase::from(state.machine.state())
    }

    /// True when a live session exists.
    pub fn is_authenticated(&self) -> bool {
        self.phase().is_authenticated()
    }

    /// Seed the session from storage. Runs once at startup, before any other
    /// operation; never touches the network.
    ///
    /// A complete persisted triplet yields a provisional `Authenticated`
    /// session; staleness is resolved by the first `ensure_valid_session`
    /// call. Anything less (missing keys, undecodable user, storage failure)
    /// starts the session `Unauthenticated`.
    pub async fn bootstrap(&self) -> AuthResult<SessionSnapshot> {
        let restored = match self.store.load_session() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not read persisted session, starting unauthenticated");
                None
            }
        };

        let mut state = self.state.lock().unwrap();
        match restored {
            Some(persisted) => {
                Self::apply_input(&mut state, &SessionMachineInput::RestoredSession)?;
                info!(user_id = %persisted.user.id, "Restored persisted session");
                state.user = Some(persisted.user);
                state.tokens = Some(persisted.tokens);
            }
            None => {
                Self::apply_input(&mut state, &SessionMachineInput::NothingPersisted)?;
                debug!("No persisted session found");
            }
        }
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Log in with email and password.
    ///
    /// On success the new triplet is persisted before the session flips to
    /// `Authenticated`. On failure the session returns to `Unauthenticated`
    /// with the failure message recorded for observers.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<()> {
        let epoch = self.begin(&SessionMachineInput::LoginStarted)?;

        match self.backend.login(email, password).await {
            Ok(grant) => {
                let user_id = grant.user.id.clone();
                self.commit_grant(epoch, &SessionMachineInput::LoginSucceeded, grant, true)?;
                info!(user_id = %user_id, "Login successful");
                Ok(())
            }
            Err(e) => self.fail_pending(epoch, &SessionMachineInput::LoginFailed, e),
        }
    }

    /// Register a new account and start a session from the result.
    ///
    /// Field validation runs before any transition or network call: a
    /// violation fails fast with `Validation` and the phase never leaves
    /// `Unauthenticated`.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> AuthResult<()> {
        if name.is_empty() || email.is_empty() || password.is_empty() || confirm_password.is_empty()
        {
            return self.fail_validation("Please fill all required fields");
        }
        if password != confirm_password {
            return self.fail_validation("Passwords do not match");
        }

        let epoch = self.begin(&SessionMachineInput::SignupStarted)?;

        match self.backend.signup(name, email, password).await {
            Ok(grant) => {
                let user_id = grant.user.id.clone();
                self.commit_grant(epoch, &SessionMachineInput::SignupSucceeded, grant, false)?;
                info!(user_id = %user_id, "Signup successful");
                Ok(())
            }
            Err(e) => self.fail_pending(epoch, &SessionMachineInput::SignupFailed, e),
        }
    }

    /// Log out.
    ///
    /// Local teardown happens first and unconditionally: storage is cleared
    /// and the session reset before the server hears about it. The remote
    /// call is best-effort and its failure is only logged.
    pub async fn logout(&self) -> AuthResult<()> {
        let (access_token, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let token = state.tokens.as_ref().map(|t| t.access_token.clone());
            self.teardown_locked(&mut state);
            (token, Self::project(&state))
        };
        self.notify(&snapshot);
        info!("Logged out locally");

        if let Some(token) = access_token {
            if let Err(e) = self.backend.logout(&token).await {
                warn!(error = %e, "Server-side logout failed, local session already cleared");
            }
        }
        Ok(())
    }

    /// Validate the current access token against the backend, refreshing it
    /// transparently when it has gone stale.
    ///
    /// Returns `NoSession` when nothing is logged in. Returns
    /// `SessionExpired` after a failed refresh: storage is cleared and the
    /// session is `Unauthenticated`, exactly as if the user had logged out.
    /// Concurrent callers coalesce onto a single refresh request.
    pub async fn ensure_valid_session(&self) -> AuthResult<()> {
        let access_token = {
            let state = self.state.lock().unwrap();
            state.tokens.as_ref().map(|t| t.access_token.clone())
        };
        let Some(access_token) = access_token else {
            return Err(AuthError::NoSession);
        };

        match self.backend.ping(&access_token).await {
            Ok(Liveness::Alive) => {
                debug!("Access token still valid");
                return Ok(());
            }
            Ok(Liveness::Expired) => {
                info!("Access token expired, attempting refresh");
            }
            Err(e) => {
                // An unreachable server is handled like an expired token.
                warn!(error = %e, "Liveness check failed, attempting refresh");
            }
        }

        self.refresh_session(&access_token).await
    }

    /// Merge a partial profile update into the current user.
    ///
    /// The merged record is re-persisted under the user key before the
    /// in-memory user is replaced. Tokens and phase are untouched.
    pub fn update_profile(&self, update: UserUpdate) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        let mut user = match state.user.clone() {
            Some(user) => user,
            None => return Err(AuthError::NoSession),
        };
        user.apply(update);

        if let Err(e) = self.store.set_user(&user) {
            warn!(error = %e, "Could not persist profile update");
        }
        state.user = Some(user);
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
        Ok(())
    }

    /// Reset the error field. Observers are notified only when it was set.
    pub fn clear_error(&self) {
        let mut state = self.state.lock().unwrap();
        if state.error.is_none() {
            return;
        }
        state.error = None;
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
    }

    /// Single-flight refresh. The first caller through the gate issues the
    /// network request; callers that arrive while it is in flight wait, then
    /// observe the already-rotated tokens and return without a second call.
    async fn refresh_session(&self, stale_access_token: &str) -> AuthResult<()> {
        let _flight = self.refresh_gate.lock().await;

        // Re-check under the gate: the winning caller may have already
        // rotated the tokens, or torn the session down.
        let (refresh_token, epoch, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let tokens = match &state.tokens {
                Some(tokens) => tokens.clone(),
                None => return Err(AuthError::SessionExpired),
            };
            if tokens.access_token != stale_access_token {
                debug!("Tokens already refreshed by a concurrent caller");
                return Ok(());
            }
            Self::apply_input(&mut state, &SessionMachineInput::RefreshStarted)?;
            (tokens.refresh_token, state.epoch, Self::project(&state))
        };
        self.notify(&snapshot);

        match self.backend.refresh(&refresh_token).await {
            Ok(refreshed) => {
                // Keep the current refresh token when the server rotates
                // only the access token; a pair is always stored whole.
                let pair = TokenPair::new(
                    refreshed.access_token,
                    refreshed.refresh_token.unwrap_or(refresh_token),
                );

                let mut state = self.state.lock().unwrap();
                if state.epoch != epoch {
                    info!("Discarding refreshed tokens, session was torn down mid-flight");
                    return Err(AuthError::Superseded);
                }
                if let Err(e) = self.store.set_tokens(&pair) {
                    warn!(error = %e, "Could not persist refreshed tokens");
                }
                Self::apply_input(&mut state, &SessionMachineInput::RefreshSucceeded)?;
                state.tokens = Some(pair);
                state.error = None;
                let snapshot = Self::project(&state);
                drop(state);

                self.notify(&snapshot);
                info!("Session refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, tearing down session");
                let mut state = self.state.lock().unwrap();
                if state.epoch == epoch {
                    self.teardown_locked(&mut state);
                    let snapshot = Self::project(&state);
                    drop(state);
                    self.notify(&snapshot);
                }
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Start a pending operation: transition the machine, clear the previous
    /// error, and capture the epoch the result must be applied under.
    fn begin(&self, input: &SessionMachineInput) -> AuthResult<u64> {
        let mut state = self.state.lock().unwrap();
        Self::apply_input(&mut state, input)?;
        state.error = None;
        let epoch = state.epoch;
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
        Ok(epoch)
    }

    /// Commit a successful grant under one lock acquisition: persist the
    /// triplet, then flip the machine and swap the in-memory session.
    ///
    /// Storage is written before the flip so a crash between the two cannot
    /// leave an authenticated session with nothing on disk. A stale grant
    /// (epoch changed while the request was in flight) is discarded without
    /// touching storage.
    fn commit_grant(
        &self,
        started_epoch: u64,
        input: &SessionMachineInput,
        grant: SessionGrant,
        record_login: bool,
    ) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.epoch != started_epoch {
            info!("Discarding session grant, session was torn down mid-flight");
            return Err(AuthError::Superseded);
        }

        if let Err(e) = self.store.set_session(&grant.user, &grant.tokens) {
            // Persistence is best-effort; the in-memory session still stands.
            warn!(error = %e, "Could not persist session");
        }
        Self::apply_input(&mut state, input)?;
        state.user = Some(grant.user);
        state.tokens = Some(grant.tokens);
        state.error = None;
        if record_login {
            state.last_login = Some(Utc::now());
        }
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
        Ok(())
    }

    /// Resolve a failed pending operation: return to `Unauthenticated` and
    /// record the failure message for observers. Propagates the original
    /// error.
    fn fail_pending(
        &self,
        started_epoch: u64,
        input: &SessionMachineInput,
        err: AuthError,
    ) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.epoch != started_epoch {
            debug!(error = %err, "Discarding stale failure, session was torn down mid-flight");
            return Err(AuthError::Superseded);
        }
        Self::apply_input(&mut state, input)?;
        state.error = Some(err.to_string());
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
        Err(err)
    }

    /// Record a client-side validation failure. No transition, no network.
    fn fail_validation(&self, message: &str) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        state.error = Some(message.to_string());
        let snapshot = Self::project(&state);
        drop(state);

        self.notify(&snapshot);
        Err(AuthError::Validation(message.to_string()))
    }

    /// Clear everything: storage keys, machine, session fields. Bumps the
    /// epoch so results from before the teardown are discarded when they
    /// land.
    fn teardown_locked(&self, state: &mut SessionState) {
        self.store.clear_session();
        state.machine = SessionMachine::from_state(SessionMachineState::Unauthenticated);
        state.user = None;
        state.tokens = None;
        state.error = None;
        state.last_login = None;
        state.epoch += 1;
    }

    /// Apply a transition input, mapping rejection to a typed error. The
    /// machine state is unchanged when the input is rejected.
    fn apply_input(state: &mut SessionState, input: &SessionMachineInput) -> AuthResult<()> {
        state.machine.consume(input).map_err(|_| {
            AuthError::InvalidTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                state.machine.state()
            ))
        })?;
        Ok(())
    }

    fn project(state: &SessionState) -> SessionSnapshot {
        let phase = SessionPhase::from(state.machine.state());
        SessionSnapshot {
            is_authenticated: phase.is_authenticated(),
            is_loading: phase.is_loading(),
            user: state.user.clone(),
            error: state.error.clone(),
            last_login: state.last_login,
            phase,
        }
    }

    /// Notify the observer, if any, with a fresh snapshot.
    fn notify(&self, snapshot: &SessionSnapshot) {
        let cb = self.on_change.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            callback(snapshot.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezi_storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_user() -> User {
        User {
            id: "user-1".to_string(),
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            avatar: None,
            role: None,
            company_name: None,
            phone: None,
            created_at: None,
        }
    }

    fn create_test_manager() -> SessionManager {
        let store = CredentialStore::new(Box::new(MemoryStorage::new()));
        // Nothing listens on this port; a test that reaches the network
        // fails instead of hanging.
        SessionManager::new(store, AuthBackend::new("http://127.0.0.1:9"))
    }

    fn seed_session(manager: &SessionManager) {
        manager
            .store
            .set_session(&test_user(), &TokenPair::new("AT1", "RT1"))
            .unwrap();
    }

    #[test]
    fn test_initial_phase_is_loading_persisted() {
        let manager = create_test_manager();
        assert_eq!(manager.phase(), SessionPhase::LoadingPersisted);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_bootstrap_without_persisted_session() {
        let manager = create_test_manager();

        let snapshot = manager.bootstrap().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
        assert!(!snapshot.is_authenticated);
        assert!(!snapshot.is_loading);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_restores_persisted_session() {
        let manager = create_test_manager();
        seed_session(&manager);

        let snapshot = manager.bootstrap().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.user.unwrap().id, "user-1");
        assert!(snapshot.last_login.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_runs_only_once() {
        let manager = create_test_manager();
        manager.bootstrap().await.unwrap();

        let result = manager.bootstrap().await;
        assert!(matches!(result, Err(AuthError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_with_partial_triplet_is_unauthenticated() {
        let manager = create_test_manager();
        manager.store.set_user(&test_user()).unwrap();

        let snapshot = manager.bootstrap().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_signup_validation_requires_all_fields() {
        let manager = create_test_manager();
        manager.bootstrap().await.unwrap();

        let result = manager.signup("", "a@b.com", "pw", "pw").await;
        assert!(matches!(result, Err(AuthError::Validation(_))));

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Please fill all required fields")
        );
    }

    #[tokio::test]
    async fn test_signup_validation_rejects_password_mismatch() {
        let manager = create_test_manager();
        manager.bootstrap().await.unwrap();

        let result = manager.signup("Ann", "a@b.com", "pw", "other").await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
        assert_eq!(
            manager.snapshot().error.as_deref(),
            Some("Passwords do not match")
        );
    }

    #[tokio::test]
    async fn test_ensure_valid_session_without_session() {
        let manager = create_test_manager();
        manager.bootstrap().await.unwrap();

        let result = manager.ensure_valid_session().await;
        assert!(matches!(result, Err(AuthError::NoSession)));
    }

    #[tokio::test]
    async fn test_logout_clears_storage_and_session() {
        let manager = create_test_manager();
        seed_session(&manager);
        manager.bootstrap().await.unwrap();
        assert!(manager.is_authenticated());

        // The remote call cannot reach a server here; teardown must still
        // complete.
        manager.logout().await.unwrap();

        assert_eq!(manager.phase(), SessionPhase::Unauthenticated);
        assert!(!manager.store.has_session().unwrap());
        assert!(manager.snapshot().user.is_none());
    }

    #[tokio::test]
    async fn test_login_while_authenticated_is_rejected() {
        let manager = create_test_manager();
        seed_session(&manager);
        manager.bootstrap().await.unwrap();

        let result = manager.login("a@b.com", "pw").await;
        assert!(matches!(result, Err(AuthError::InvalidTransition(_))));
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_update_profile_requires_session() {
        let manager = create_test_manager();
        manager.bootstrap().await.unwrap();

        let result = manager.update_profile(UserUpdate {
            first_name: Some("New".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AuthError::NoSession)));
    }

    #[tokio::test]
    async fn test_update_profile_merges_and_persists() {
        let manager = create_test_manager();
        seed_session(&manager);
        manager.bootstrap().await.unwrap();

        manager
            .update_profile(UserUpdate {
                first_name: Some("Renamed".to_string()),
                phone: Some("555-0100".to_string()),
                ..Default::default()
            })
            .unwrap();

        let snapshot = manager.snapshot();
        let user = snapshot.user.unwrap();
        assert_eq!(user.first_name, "Renamed");
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert_eq!(user.last_name, "User");

        let persisted = manager.store.get_user().unwrap().unwrap();
        assert_eq!(persisted.first_name, "Renamed");
        assert_eq!(
            manager.store.get_access_token().unwrap().as_deref(),
            Some("AT1")
        );
    }

    #[tokio::test]
    async fn test_clear_error() {
        let manager = create_test_manager();
        manager.bootstrap().await.unwrap();

        let _ = manager.signup("", "", "", "").await;
        assert!(manager.snapshot().error.is_some());

        manager.clear_error();
        assert!(manager.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_callback_invoked_on_committed_changes() {
        let manager = create_test_manager();
        let callback_count = Arc::new(AtomicUsize::new(0));
        let callback_count_clone = callback_count.clone();

        manager.set_on_change(Box::new(move |_snapshot| {
            callback_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        // Bootstrap resolution, validation failure, clear_error: one each.
        manager.bootstrap().await.unwrap();
        let _ = manager.signup("", "", "", "").await;
        manager.clear_error();

        assert_eq!(callback_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_callback_sees_authenticated_snapshot_on_restore() {
        let manager = create_test_manager();
        seed_session(&manager);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        manager.set_on_change(Box::new(move |snapshot| {
            seen_clone.lock().unwrap().push(snapshot.phase.clone());
        }));

        manager.bootstrap().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![SessionPhase::Authenticated]);
    }
}
