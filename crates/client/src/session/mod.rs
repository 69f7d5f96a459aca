//! Session manager.
//!
//! Owns the current user's identity and the auth flags, mediates every auth
//! mutation, and reconciles with the backend's session-change notifications.
//!
//! Calls only *request* a transition. The sign-in that actually authenticates
//! the user lands through the notification stream, so `is_authenticated` is
//! eventually consistent with the call that caused it. Use
//! [`SessionManager::settled`] to wait for the outcome.

mod machine;

pub use machine::AuthPhase;

use std::sync::{Arc, Mutex, PoisonError, Weak};

use pocket_catalog_core::{Credentials, UserId};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{
    self, SessionError, add_breadcrumb, clear_sentry_user, report, set_sentry_user,
};
use crate::gateway::{AuthEvent, AuthEventKind, AuthGateway, AuthUser};
use crate::loading::{InFlight, LoadingGuard};

use machine::{AuthInput, AuthMachine};

/// Observable auth state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    user: Option<AuthUser>,
    phase: AuthPhase,
    in_flight: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            phase: AuthPhase::SignedOut,
            in_flight: 0,
        }
    }
}

impl Session {
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|user| &user.id)
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.email.as_deref())
    }

    #[must_use]
    pub const fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    /// Signed in: a user id is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// An auth call is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    #[must_use]
    pub const fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// No call in flight and no transition waiting on the backend.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.in_flight == 0 && !self.phase.is_pending()
    }
}

impl InFlight for Session {
    fn in_flight_mut(&mut self) -> &mut usize {
        &mut self.in_flight
    }
}

/// Mediates authentication against an [`AuthGateway`].
pub struct SessionManager {
    gateway: Arc<dyn AuthGateway>,
    machine: Mutex<AuthMachine>,
    state: watch::Sender<Session>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create the manager and subscribe to session-change notifications.
    ///
    /// The subscription is made here, once, and lives as long as the manager.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(gateway: Arc<dyn AuthGateway>) -> Arc<Self> {
        let events = gateway.subscribe();
        let (state, _) = watch::channel(Session::default());

        let manager = Arc::new(Self {
            gateway,
            machine: Mutex::new(AuthMachine::new()),
            state,
            listener: Mutex::new(None),
        });

        let handle = tokio::spawn(listen(Arc::downgrade(&manager), events));
        *manager
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        manager
    }

    /// Restore an existing session, if the backend has one.
    ///
    /// "No session" is not an error. A failure is reported and returned, but
    /// leaves the manager usable and signed out.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure unchanged.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), SessionError> {
        let _loading = LoadingGuard::new(&self.state);

        match self.gateway.get_session().await {
            Ok(Some(session)) => {
                info!(user_id = %session.user.id, "Restored session");
                self.session_issued(session.user);
                Ok(())
            }
            Ok(None) => {
                debug!("No session to restore");
                Ok(())
            }
            Err(err) => {
                report(&err, error::is_server_error(&err), "Failed to restore session");
                Err(err.into())
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// On success the user is *not* yet authenticated; that happens when the
    /// signed-in notification arrives.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure unchanged (e.g. invalid credentials).
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let _loading = LoadingGuard::new(&self.state);
        self.apply(&AuthInput::SignInRequested, None);
        add_breadcrumb("auth", "Sign in requested", None);

        match self.gateway.sign_in_with_password(credentials).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.apply(&AuthInput::RequestFailed, None);
                report(&err, error::is_server_error(&err), "Sign in failed");
                Err(err.into())
            }
        }
    }

    /// Create an account.
    ///
    /// When the backend requires email confirmation no session is issued and
    /// the manager settles signed out.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure unchanged (e.g. account already exists).
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn signup(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let _loading = LoadingGuard::new(&self.state);
        self.apply(&AuthInput::SignInRequested, None);
        add_breadcrumb("auth", "Sign up requested", None);

        match self.gateway.sign_up(credentials).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                info!("Account created; confirmation required before signing in");
                self.apply(&AuthInput::NoSessionIssued, None);
                Ok(())
            }
            Err(err) => {
                self.apply(&AuthInput::RequestFailed, None);
                report(&err, error::is_server_error(&err), "Sign up failed");
                Err(err.into())
            }
        }
    }

    /// End the session. The signed-out notification completes the transition.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure unchanged.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _loading = LoadingGuard::new(&self.state);
        self.apply(&AuthInput::SignOutRequested, None);
        add_breadcrumb("auth", "Sign out requested", None);

        match self.gateway.sign_out().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.apply(&AuthInput::RequestFailed, None);
                report(&err, error::is_server_error(&err), "Sign out failed");
                Err(err.into())
            }
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Wait until no auth transition is pending, then return the state.
    pub async fn settled(&self) -> Session {
        let mut rx = self.state.subscribe();
        match rx.wait_for(Session::is_settled).await {
            Ok(session) => session.clone(),
            Err(_) => self.current(),
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    fn handle_event(&self, event: AuthEvent) {
        match (event.kind, event.user) {
            (kind @ (AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed), Some(user)) => {
                debug!(?kind, user_id = %user.id, "Session issued");
                self.session_issued(user);
            }
            (kind, _) => {
                debug!(?kind, "Session ended");
                self.session_ended();
            }
        }
    }

    fn session_issued(&self, user: AuthUser) {
        set_sentry_user(&user.id, user.email.as_deref());
        add_breadcrumb("auth", "Signed in", Some(&[("user_id", user.id.as_str())]));
        self.apply(&AuthInput::SessionIssued, Some(user));
    }

    fn session_ended(&self) {
        clear_sentry_user();
        add_breadcrumb("auth", "Signed out", None);
        self.apply(&AuthInput::SessionEnded, None);
    }

    /// Notifications were dropped; ask the backend where things stand.
    async fn resync(&self) {
        match self.gateway.get_session().await {
            Ok(Some(session)) => self.session_issued(session.user),
            Ok(None) => self.session_ended(),
            Err(err) => report(
                &err,
                error::is_server_error(&err),
                "Failed to resync session after missed notifications",
            ),
        }
    }

    /// Feed one input to the machine and publish the resulting state.
    fn apply(&self, input: &AuthInput, user: Option<AuthUser>) {
        let mut machine = self.machine.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(err) = machine.consume(input) {
            warn!(?input, error = ?err, "Auth input ignored");
            return;
        }
        let phase = AuthPhase::from(machine.state());

        self.state.send_modify(|session| {
            session.phase = phase;
            if !phase.has_user() {
                session.user = None;
            } else if user.is_some() {
                session.user = user;
            }
        });
        debug!(?input, ?phase, "Auth phase changed");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

async fn listen(manager: Weak<SessionManager>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let received = events.recv().await;
        let Some(manager) = manager.upgrade() else {
            return;
        };

        match received {
            Ok(event) => manager.handle_event(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Missed session notifications, resyncing");
                // The backlog predates the resync; only newer notifications count.
                events = events.resubscribe();
                manager.resync().await;
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Session notifications closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> AuthUser {
        AuthUser {
            id: UserId::new(id),
            email: Some(format!("{id}@example.com")),
        }
    }

    #[test]
    fn test_default_session_is_settled_and_signed_out() {
        let session = Session::default();
        assert!(!session.is_authenticated());
        assert!(!session.is_loading());
        assert!(session.is_settled());
        assert_eq!(session.phase(), AuthPhase::SignedOut);
    }

    #[test]
    fn test_session_accessors() {
        let session = Session {
            user: Some(user("u1")),
            phase: AuthPhase::SignedIn,
            in_flight: 1,
        };
        assert_eq!(session.user_id(), Some(&UserId::new("u1")));
        assert_eq!(session.email(), Some("u1@example.com"));
        assert!(session.is_authenticated());
        assert!(session.is_loading());
        assert!(!session.is_settled());
    }
}
