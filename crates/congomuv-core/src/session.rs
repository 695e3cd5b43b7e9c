//! Session, profile and the auth collaborator contract.
//!
//! The hosted auth backend owns sessions and profiles. This module only
//! describes what the gate needs from it ([`AuthProvider`]), the local
//! presence markers ([`MarkerStore`]), and the in-memory snapshot the gate
//! reads on every evaluation ([`SessionSnapshot`]).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::role::{normalize_role, Role};

/// Errors reported by an [`AuthProvider`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session token is unknown, expired or revoked.
    #[error("Session is invalid or has been signed out")]
    InvalidSession,

    /// The session is valid but no profile row exists for it.
    #[error("No profile found for user {user_id}")]
    ProfileNotFound {
        /// User the lookup was made for.
        user_id: String,
    },

    /// The backend could not be reached or answered with an error.
    #[error("Auth backend error: {message}")]
    Backend {
        /// Backend-provided description.
        message: String,
    },
}

/// An authenticated session. Only its presence matters to the gate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Session {
    token: String,
}

impl Session {
    /// Wraps a session token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

/// A user profile as stored by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "7f1c0e42-1b1e-4c38-9d55-3a0c4fbc2a10",
    "role": "operator",
    "name": "Transco Kinshasa",
    "phone": "+243810000000",
    "organization_id": "0b6c3d2e-4d0f-4d9c-8f55-6a7e1c2b3d4f",
    "organization_name": "TRANSCO"
}))]
pub struct Profile {
    /// User identifier.
    pub id: Uuid,

    /// Free-form role string. Normalized before any comparison.
    #[schema(example = "operator")]
    pub role: String,

    /// Display name.
    pub name: String,

    /// Contact phone number.
    #[serde(default)]
    pub phone: Option<String>,

    /// Transport organization the user belongs to.
    #[serde(default)]
    pub organization_id: Option<Uuid>,

    /// Display name of that organization.
    #[serde(default)]
    pub organization_name: Option<String>,
}

impl Profile {
    /// The classified role, or `None` if the role string is empty.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

/// The auth/profile backend, seen from the gate.
///
/// Implementations must be cheap to call repeatedly: the shell refreshes the
/// profile every time the tab becomes visible again.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Fetches the profile belonging to `session`.
    async fn fetch_profile(&self, session: &Session) -> Result<Profile, SessionError>;

    /// Ends `session` on the backend.
    async fn sign_out(&self, session: &Session) -> Result<(), SessionError>;

    /// Re-reads the profile. Safe to call any number of times.
    async fn refresh_profile(&self, session: &Session) -> Result<Profile, SessionError> {
        self.fetch_profile(session).await
    }
}

/// An [`AuthProvider`] backed by a fixed token → profile directory.
///
/// Used to run the service without the hosted backend; revoked tokens are
/// remembered for the lifetime of the provider.
#[derive(Debug, Default)]
pub struct StaticAuthProvider {
    profiles: HashMap<String, Profile>,
    revoked: Mutex<HashSet<String>>,
}

impl StaticAuthProvider {
    /// Builds a provider from `(token, profile)` pairs.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, Profile)>) -> Self {
        Self {
            profiles: entries.into_iter().collect(),
            revoked: Mutex::new(HashSet::new()),
        }
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn is_revoked(&self, token: &str) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn fetch_profile(&self, session: &Session) -> Result<Profile, SessionError> {
        if self.is_revoked(session.token()) {
            return Err(SessionError::InvalidSession);
        }
        self.profiles
            .get(session.token())
            .cloned()
            .ok_or(SessionError::InvalidSession)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), SessionError> {
        if !self.profiles.contains_key(session.token()) {
            return Err(SessionError::InvalidSession);
        }
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.token().to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Markers {
    auth_token: bool,
    role: Option<String>,
}

/// Locally persisted auth markers.
///
/// Mirrors the two flags the browser keeps in local storage: an auth-token
/// marker and a role marker. Only presence is interpreted. Clones share the
/// same markers.
#[derive(Debug, Clone, Default)]
pub struct MarkerStore {
    inner: Arc<Mutex<Markers>>,
}

impl MarkerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Markers) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Records that an auth token is held.
    pub fn set_token(&self) {
        self.with(|m| m.auth_token = true);
    }

    /// Records the normalized role.
    pub fn set_role(&self, raw_role: &str) {
        let normalized = normalize_role(raw_role);
        self.with(|m| m.role = (!normalized.is_empty()).then_some(normalized));
    }

    /// Clears both markers.
    pub fn clear(&self) {
        self.with(|m| {
            m.auth_token = false;
            m.role = None;
        });
    }

    /// Returns `true` while the auth-token marker is present.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.with(|m| m.auth_token)
    }

    /// The stored role marker.
    #[must_use]
    pub fn role_marker(&self) -> Option<String> {
        self.with(|m| m.role.clone())
    }
}

/// What happened to a profile fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The profile was stored.
    Applied,
    /// The fetch was issued for an older session or an unmounted shell.
    Stale,
    /// The fetch failed; the role stays unknown.
    Failed,
}

/// The session/profile pair the gate reads.
///
/// Every session change bumps `generation`. Profile fetches carry the
/// generation they were issued under and are dropped if it moved on.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    session: Option<Session>,
    profile: Option<Profile>,
    generation: u64,
}

impl SessionSnapshot {
    /// Stores a new session and forgets the old profile.
    ///
    /// Returns the generation a profile fetch must be tagged with.
    pub fn begin(&mut self, session: Session) -> u64 {
        self.session = Some(session);
        self.profile = None;
        self.generation += 1;
        self.generation
    }

    /// Drops the session and profile, returning the old session.
    pub fn end(&mut self) -> Option<Session> {
        self.profile = None;
        self.generation += 1;
        self.session.take()
    }

    /// Commits a profile fetch result.
    pub fn commit(
        &mut self,
        generation: u64,
        result: Result<Profile, SessionError>,
    ) -> CommitOutcome {
        if generation != self.generation || self.session.is_none() {
            debug!(
                generation,
                current = self.generation,
                "Discarding stale profile fetch"
            );
            return CommitOutcome::Stale;
        }
        match result {
            Ok(profile) => {
                self.profile = Some(profile);
                CommitOutcome::Applied
            }
            Err(err) => {
                warn!(error = %err, generation, "Profile fetch failed, role stays unknown");
                CommitOutcome::Failed
            }
        }
    }

    /// Returns `true` while a session is held.
    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session.is_some()
    }

    /// The current session.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The loaded profile.
    #[must_use]
    pub const fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// The classified role; `None` until a profile with a role has loaded.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().and_then(Profile::role)
    }

    /// Current generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            role: role.to_string(),
            name: "Test User".to_string(),
            phone: None,
            organization_id: None,
            organization_name: None,
        }
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = Session::new("secret-token");
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_profile_role_normalizes() {
        assert_eq!(profile("Operator ").role(), Some(Role::Operator));
        assert_eq!(profile("").role(), None);
    }

    #[tokio::test]
    async fn test_static_provider_fetch_and_sign_out() {
        let provider =
            StaticAuthProvider::new([("tok-1".to_string(), profile("passenger"))]);
        let session = Session::new("tok-1");

        let fetched = provider.fetch_profile(&session).await.unwrap();
        assert_eq!(fetched.role(), Some(Role::Passenger));

        provider.sign_out(&session).await.unwrap();
        assert_eq!(
            provider.fetch_profile(&session).await,
            Err(SessionError::InvalidSession)
        );
    }

    #[tokio::test]
    async fn test_static_provider_unknown_token() {
        let provider = StaticAuthProvider::default();
        let session = Session::new("nope");
        assert_eq!(
            provider.refresh_profile(&session).await,
            Err(SessionError::InvalidSession)
        );
        assert!(provider.sign_out(&session).await.is_err());
    }

    #[test]
    fn test_marker_store_shared_between_clones() {
        let markers = MarkerStore::new();
        let other = markers.clone();

        markers.set_token();
        markers.set_role(" Admin");
        assert!(other.has_token());
        assert_eq!(other.role_marker().as_deref(), Some("admin"));

        other.clear();
        assert!(!markers.has_token());
        assert_eq!(markers.role_marker(), None);
    }

    #[test]
    fn test_empty_role_marker_is_absent() {
        let markers = MarkerStore::new();
        markers.set_role("   ");
        assert_eq!(markers.role_marker(), None);
    }

    #[test]
    fn test_snapshot_commit_current_generation() {
        let mut snapshot = SessionSnapshot::default();
        let generation = snapshot.begin(Session::new("t"));
        assert!(snapshot.session_present());
        assert_eq!(snapshot.role(), None);

        let outcome = snapshot.commit(generation, Ok(profile("operator")));
        assert_eq!(outcome, CommitOutcome::Applied);
        assert_eq!(snapshot.role(), Some(Role::Operator));
    }

    #[test]
    fn test_snapshot_discards_stale_fetch() {
        let mut snapshot = SessionSnapshot::default();
        let first = snapshot.begin(Session::new("a"));
        let second = snapshot.begin(Session::new("b"));

        assert_eq!(
            snapshot.commit(first, Ok(profile("admin"))),
            CommitOutcome::Stale
        );
        assert_eq!(snapshot.role(), None);
        assert_eq!(
            snapshot.commit(second, Ok(profile("passenger"))),
            CommitOutcome::Applied
        );
    }

    #[test]
    fn test_snapshot_discards_fetch_after_end() {
        let mut snapshot = SessionSnapshot::default();
        let generation = snapshot.begin(Session::new("a"));
        assert!(snapshot.end().is_some());
        assert_eq!(
            snapshot.commit(generation, Ok(profile("admin"))),
            CommitOutcome::Stale
        );
        assert!(!snapshot.session_present());
    }

    #[test]
    fn test_snapshot_failed_fetch_keeps_role_unknown() {
        let mut snapshot = SessionSnapshot::default();
        let generation = snapshot.begin(Session::new("a"));
        let outcome = snapshot.commit(
            generation,
            Err(SessionError::Backend {
                message: "timeout".into(),
            }),
        );
        assert_eq!(outcome, CommitOutcome::Failed);
        assert!(snapshot.session_present());
        assert_eq!(snapshot.role(), None);
    }
}
