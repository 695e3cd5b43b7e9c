//! Application state shared across handlers.
//!
//! Each mounted client owns a [`ClientShell`] and an [`IdleMonitor`]. The
//! shell only returns [`ShellEffect`]s; [`run_effects`] carries them out
//! against the auth provider and the idle monitor without holding the state
//! lock across backend calls.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use congomuv_core::{
    AuthProvider, ClientShell, CommitOutcome, GateConfig, GateError, IdleMonitor, IdleSettings,
    IdleStatus, IdleTransition, MarkerStore, MemoryLocation, RoutePath, Session, ShellEffect,
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State handle passed to every handler.
pub type SharedState = Arc<RwLock<AppState>>;

/// Server-wide state.
pub struct AppState {
    /// Loaded configuration.
    pub config: GateConfig,
    auth: Arc<dyn AuthProvider>,
    clients: HashMap<Uuid, ClientEntry>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates state with no mounted clients.
    #[must_use]
    pub fn new(config: GateConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            config,
            auth,
            clients: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    /// Wraps the state for sharing across handlers.
    #[must_use]
    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// The auth backend.
    #[must_use]
    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.auth)
    }

    /// Idle timing from the configuration.
    #[must_use]
    pub const fn idle_settings(&self) -> IdleSettings {
        self.config.idle.settings()
    }

    /// Looks up a client.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::ClientNotFound`] for unknown ids.
    pub fn client(&self, id: Uuid) -> Result<&ClientEntry, GateError> {
        self.clients.get(&id).ok_or(GateError::ClientNotFound(id))
    }

    /// Looks up a client for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::ClientNotFound`] for unknown ids.
    pub fn client_mut(&mut self, id: Uuid) -> Result<&mut ClientEntry, GateError> {
        self.clients
            .get_mut(&id)
            .ok_or(GateError::ClientNotFound(id))
    }

    /// Number of mounted clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// When the server started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Unmounts every client untouched for at least `ttl`.
    ///
    /// Returns the number of clients removed.
    pub fn reap_stale_clients(&mut self, ttl: Duration) -> usize {
        let before = self.clients.len();
        self.clients.retain(|id, entry| {
            if entry.last_seen.elapsed() < ttl {
                return true;
            }
            entry.shell.unmount();
            info!(client = %id, "Reaped stale client");
            false
        });
        before - self.clients.len()
    }
}

/// One mounted client: its shell, idle monitor and expiry watcher.
///
/// Dropping the entry stops both background tasks.
pub struct ClientEntry {
    /// The client's shell.
    pub shell: ClientShell,
    idle: IdleMonitor,
    watcher: JoinHandle<()>,
    mounted_at: DateTime<Utc>,
    last_seen: Instant,
}

impl ClientEntry {
    /// Latest idle timer status.
    #[must_use]
    pub fn idle_status(&self) -> IdleStatus {
        self.idle.status()
    }

    /// When the client was mounted.
    #[must_use]
    pub const fn mounted_at(&self) -> DateTime<Utc> {
        self.mounted_at
    }

    fn replace_idle(&mut self, (idle, watcher): (IdleMonitor, JoinHandle<()>)) {
        self.idle = idle;
        // The previous watcher may be the task running this reload, so it is
        // detached rather than aborted.
        self.watcher = watcher;
    }
}

impl Drop for ClientEntry {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn spawn_idle(
    state: Weak<RwLock<AppState>>,
    id: Uuid,
    settings: IdleSettings,
    markers: MarkerStore,
) -> (IdleMonitor, JoinHandle<()>) {
    let (monitor, transitions) = IdleMonitor::spawn(settings, markers);
    let watcher = tokio::spawn(watch_idle(state, id, transitions));
    (monitor, watcher)
}

async fn watch_idle(
    state: Weak<RwLock<AppState>>,
    id: Uuid,
    mut transitions: mpsc::UnboundedReceiver<IdleTransition>,
) {
    while let Some(transition) = transitions.recv().await {
        let IdleTransition::Expired(cause) = transition else {
            debug!(client = %id, ?transition, "Idle transition");
            continue;
        };

        let Some(state) = state.upgrade() else {
            break;
        };
        let effects = match state.write().await.client_mut(id) {
            Ok(entry) => entry.shell.expire(),
            Err(_) => break,
        };
        info!(client = %id, ?cause, "Client logged out for inactivity");

        if let Err(err) = run_effects(&state, id, effects).await {
            warn!(client = %id, error = %err, "Failed to finish idle logout");
        }
        break;
    }
}

/// Mounts a new client at `path`, restoring the session for `token` if given.
///
/// # Errors
///
/// Returns an error if the client disappears while its effects run.
pub async fn mount_client(
    state: &SharedState,
    path: RoutePath,
    token: Option<String>,
) -> Result<(Uuid, Option<CommitOutcome>), GateError> {
    let id = Uuid::now_v7();

    let effects = {
        let mut guard = state.write().await;
        let markers = MarkerStore::new();
        let (shell, effects) = ClientShell::mount(
            MemoryLocation::new(path),
            markers.clone(),
            token.map(Session::new),
        );
        let (idle, watcher) = spawn_idle(Arc::downgrade(state), id, guard.idle_settings(), markers);

        guard.clients.insert(
            id,
            ClientEntry {
                shell,
                idle,
                watcher,
                mounted_at: Utc::now(),
                last_seen: Instant::now(),
            },
        );
        effects
    };

    info!(client = %id, "Client mounted");
    let outcome = run_effects(state, id, effects).await?;
    Ok((id, outcome))
}

/// Unmounts and forgets a client.
///
/// # Errors
///
/// Returns [`GateError::ClientNotFound`] for unknown ids.
pub async fn unmount_client(state: &SharedState, id: Uuid) -> Result<(), GateError> {
    let mut entry = state
        .write()
        .await
        .clients
        .remove(&id)
        .ok_or(GateError::ClientNotFound(id))?;
    entry.shell.unmount();
    info!(client = %id, "Client unmounted");
    Ok(())
}

/// Applies `op` to a client's entry and runs the effects it returns.
///
/// # Errors
///
/// Returns [`GateError::ClientNotFound`] for unknown ids.
pub async fn update_client<F>(
    state: &SharedState,
    id: Uuid,
    op: F,
) -> Result<Option<CommitOutcome>, GateError>
where
    F: FnOnce(&mut ClientEntry) -> Vec<ShellEffect> + Send,
{
    let effects = {
        let mut guard = state.write().await;
        let entry = guard.client_mut(id)?;
        entry.last_seen = Instant::now();
        op(entry)
    };
    run_effects(state, id, effects).await
}

/// Periodically unmounts clients untouched for longer than `ttl`.
///
/// The task ends once the state has been dropped.
pub fn spawn_reaper(state: &SharedState, ttl: Duration) -> JoinHandle<()> {
    let state = Arc::downgrade(state);
    let period = ttl.min(Duration::from_secs(60));

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(state) = state.upgrade() else {
                break;
            };
            let reaped = state.write().await.reap_stale_clients(ttl);
            if reaped > 0 {
                debug!(reaped, "Stale clients removed");
            }
        }
    })
}

/// Carries out shell effects in order.
///
/// Returns the outcome of the last profile fetch, if one ran.
///
/// # Errors
///
/// Returns [`GateError::ClientNotFound`] if the client was removed meanwhile.
pub async fn run_effects(
    state: &SharedState,
    id: Uuid,
    effects: Vec<ShellEffect>,
) -> Result<Option<CommitOutcome>, GateError> {
    let mut last_fetch = None;

    for effect in effects {
        match effect {
            ShellEffect::FetchProfile {
                generation,
                session,
            } => {
                let auth = state.read().await.auth();
                let result = auth.fetch_profile(&session).await;
                let outcome = state
                    .write()
                    .await
                    .client_mut(id)?
                    .shell
                    .apply_profile(generation, result);
                debug!(client = %id, generation, ?outcome, "Profile fetch finished");
                last_fetch = Some(outcome);
            }
            ShellEffect::RevokeSession { session } => {
                let auth = state.read().await.auth();
                if let Err(err) = auth.sign_out(&session).await {
                    warn!(client = %id, error = %err, "Failed to revoke session");
                }
            }
            ShellEffect::ArmIdle => {
                state.read().await.client(id)?.idle.arm();
            }
            ShellEffect::DisarmIdle => {
                state.read().await.client(id)?.idle.disarm();
            }
            ShellEffect::ResetIdle => {
                state.read().await.client(id)?.idle.reset();
            }
            ShellEffect::Reload => {
                let mut guard = state.write().await;
                let settings = guard.idle_settings();
                let entry = guard.client_mut(id)?;
                let markers = entry.shell.markers().clone();
                entry.replace_idle(spawn_idle(Arc::downgrade(state), id, settings, markers));
                debug!(client = %id, "Client reloaded");
            }
        }
    }

    Ok(last_fetch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use congomuv_core::{IdlePhase, Profile, SessionError, StaticAuthProvider, View};

    fn profile(role: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            role: role.to_string(),
            name: "Test".to_string(),
            phone: None,
            organization_id: None,
            organization_name: None,
        }
    }

    fn test_state() -> SharedState {
        let auth = StaticAuthProvider::new([
            ("op-token".to_string(), profile("operator")),
            ("pax-token".to_string(), profile("Passenger")),
        ]);
        let mut config = GateConfig::default();
        config.idle.idle_timeout_secs = 10;
        config.idle.warn_duration_secs = 3;
        AppState::new(config, Arc::new(auth)).into_shared()
    }

    fn path(raw: &str) -> RoutePath {
        RoutePath::parse(raw).unwrap()
    }

    /// Backend whose user can be promoted or demoted between requests.
    struct ReassignableAuth {
        role: Mutex<String>,
    }

    #[async_trait]
    impl AuthProvider for ReassignableAuth {
        async fn fetch_profile(&self, _session: &Session) -> Result<Profile, SessionError> {
            Ok(profile(&self.role.lock().unwrap()))
        }

        async fn sign_out(&self, _session: &Session) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mount_with_token_loads_profile() {
        let state = test_state();
        let (id, outcome) = mount_client(&state, path("/operator"), Some("op-token".into()))
            .await
            .unwrap();

        assert_eq!(outcome, Some(CommitOutcome::Applied));
        let guard = state.read().await;
        let entry = guard.client(id).unwrap();
        assert_eq!(entry.shell.location(), &path("/operator"));
        assert_eq!(entry.shell.view(), Some(View::OperatorDashboard));
    }

    #[tokio::test]
    async fn test_navigate_picks_up_role_change() {
        let auth = Arc::new(ReassignableAuth {
            role: Mutex::new("operator".to_string()),
        });
        let state = AppState::new(GateConfig::default(), auth.clone()).into_shared();
        let (id, _) = mount_client(&state, path("/operator"), Some("tok".into()))
            .await
            .unwrap();

        *auth.role.lock().unwrap() = "passenger".to_string();
        let outcome = update_client(&state, id, |entry| {
            entry.shell.navigate(path("/operator/trips"))
        })
        .await
        .unwrap();

        assert_eq!(outcome, Some(CommitOutcome::Applied));
        let guard = state.read().await;
        let entry = guard.client(id).unwrap();
        assert_eq!(entry.shell.location(), &path("/passenger"));
        assert_eq!(entry.shell.view(), Some(View::PassengerDashboard));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_stale_clients() {
        let state = test_state();
        let (idle, _) = mount_client(&state, RoutePath::root(), None).await.unwrap();
        let (busy, _) = mount_client(&state, RoutePath::root(), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(40)).await;
        update_client(&state, busy, |entry| entry.shell.navigate(path("/login")))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        let reaped = state.write().await.reap_stale_clients(Duration::from_secs(60));
        assert_eq!(reaped, 1);
        let guard = state.read().await;
        assert!(guard.client(idle).is_err());
        assert_eq!(guard.client(busy).unwrap().shell.view(), Some(View::Login));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_unmounts_abandoned_clients() {
        let state = test_state();
        let (id, _) = mount_client(&state, RoutePath::root(), None).await.unwrap();
        let reaper = spawn_reaper(&state, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(state.read().await.client(id).is_err());
        reaper.abort();
    }

    #[tokio::test]
    async fn test_mount_with_unknown_token_stays_loading() {
        let state = test_state();
        let (id, outcome) = mount_client(&state, path("/operator"), Some("nope".into()))
            .await
            .unwrap();

        assert_eq!(outcome, Some(CommitOutcome::Failed));
        let guard = state.read().await;
        let entry = guard.client(id).unwrap();
        assert!(entry.shell.resolution().decision.is_loading());
        assert_eq!(entry.shell.location(), &path("/operator"));
    }

    #[tokio::test]
    async fn test_unmount_removes_client() {
        let state = test_state();
        let (id, _) = mount_client(&state, RoutePath::root(), None).await.unwrap();
        assert_eq!(state.read().await.client_count(), 1);

        tokio_test::assert_ok!(unmount_client(&state, id).await);
        assert_eq!(state.read().await.client_count(), 0);
        assert!(matches!(
            unmount_client(&state, id).await,
            Err(GateError::ClientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_client() {
        let state = test_state();
        let err = update_client(&state, Uuid::nil(), |_| Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CLIENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_sign_out_revokes_session() {
        let state = test_state();
        let (id, _) = mount_client(&state, path("/passenger"), Some("pax-token".into()))
            .await
            .unwrap();

        update_client(&state, id, |entry| entry.shell.sign_out())
            .await
            .unwrap();

        let auth = state.read().await.auth();
        assert!(auth
            .fetch_profile(&Session::new("pax-token"))
            .await
            .is_err());
        let guard = state.read().await;
        assert_eq!(guard.client(id).unwrap().shell.location(), &RoutePath::root());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_logs_client_out() {
        let state = test_state();
        let (id, _) = mount_client(&state, path("/operator"), Some("op-token".into()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(matches!(
            state.read().await.client(id).unwrap().idle_status().phase,
            IdlePhase::Warning { .. }
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;

        let guard = state.read().await;
        let entry = guard.client(id).unwrap();
        assert!(!entry.shell.snapshot().session_present());
        assert!(!entry.shell.markers().has_token());
        assert_eq!(entry.shell.location(), &RoutePath::root());
        assert_eq!(entry.shell.state().reloads, 1);
        assert!(!entry.idle_status().armed);
    }
}
