//! The mounted root of one browser tab.
//!
//! [`ClientShell`] owns the hash location, the session snapshot, the auth
//! markers and a control-channel subscription. It re-runs the gate after
//! every input and keeps the last [`Resolution`].
//!
//! The shell performs no I/O. Inputs that need the network or timers return
//! [`ShellEffect`]s for the host to execute: fetch a profile, revoke a
//! session, arm or reset the idle monitor, reload.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::control::{ControlBus, ControlHandle, ControlMessage};
use crate::gate::{settle, GateDecision, HashLocation, MemoryLocation, Resolution};
use crate::idle::ActivityKind;
use crate::role::Role;
use crate::route::{RoutePath, View};
use crate::session::{CommitOutcome, MarkerStore, Profile, Session, SessionError, SessionSnapshot};

/// Work the host must carry out on the shell's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEffect {
    /// Fetch the profile for `session` and hand it to
    /// [`ClientShell::apply_profile`] with `generation`.
    FetchProfile {
        /// Generation to tag the result with.
        generation: u64,
        /// Session to fetch for.
        session: Session,
    },
    /// End `session` on the auth backend.
    RevokeSession {
        /// Session to end.
        session: Session,
    },
    /// Start the idle timer.
    ArmIdle,
    /// Stop the idle timer.
    DisarmIdle,
    /// Feed an activity event to the idle timer.
    ResetIdle,
    /// Drop every timer and in-flight task belonging to this shell.
    Reload,
}

/// Serializable view of the shell for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ShellState {
    /// Current hash path.
    pub location: RoutePath,
    /// Rendered view, `None` while loading.
    pub view: Option<View>,
    /// Whether the loading placeholder is shown.
    pub loading: bool,
    /// Whether a session is held.
    pub session_present: bool,
    /// Classified role, once the profile has loaded.
    pub role: Option<Role>,
    /// Loaded profile.
    pub profile: Option<Profile>,
    /// Number of forced reloads since mount.
    pub reloads: u32,
}

/// Root component of a single client.
#[derive(Debug)]
pub struct ClientShell<L: HashLocation = MemoryLocation> {
    location: L,
    snapshot: SessionSnapshot,
    markers: MarkerStore,
    bus: ControlBus,
    control_rx: broadcast::Receiver<ControlMessage>,
    resolution: Resolution,
    mounted: bool,
    reloads: u32,
}

impl ClientShell<MemoryLocation> {
    /// Mounts an anonymous shell on an in-memory location.
    #[must_use]
    pub fn mount_at(path: RoutePath, markers: MarkerStore) -> Self {
        let (shell, _) = Self::mount(MemoryLocation::new(path), markers, None);
        shell
    }

    /// Mounts a shell on an in-memory location with a restored session.
    #[must_use]
    pub fn restore_at(
        path: RoutePath,
        markers: MarkerStore,
        session: Session,
    ) -> (Self, Vec<ShellEffect>) {
        Self::mount(MemoryLocation::new(path), markers, Some(session))
    }
}

impl<L: HashLocation> ClientShell<L> {
    /// Mounts the shell and evaluates the initial location.
    ///
    /// A `restored` session is in place before the first evaluation, so a
    /// protected deep link shows `Loading` until the profile arrives instead
    /// of bouncing to `/`. Markers left over from a previous page load do not
    /// count as a session on their own.
    pub fn mount(
        location: L,
        markers: MarkerStore,
        restored: Option<Session>,
    ) -> (Self, Vec<ShellEffect>) {
        let bus = ControlBus::default();
        let control_rx = bus.subscribe();

        let mut shell = Self {
            location,
            snapshot: SessionSnapshot::default(),
            markers,
            bus,
            control_rx,
            resolution: Resolution {
                decision: GateDecision::Loading,
                redirects: Vec::new(),
            },
            mounted: true,
            reloads: 0,
        };
        let effects = match restored {
            Some(session) => shell.sign_in(session),
            None => {
                shell.evaluate();
                Vec::new()
            }
        };
        (shell, effects)
    }

    fn evaluate(&mut self) -> &Resolution {
        self.resolution = settle(
            &mut self.location,
            self.snapshot.session_present(),
            self.snapshot.role(),
        );
        &self.resolution
    }

    /// Handles a hash change.
    ///
    /// With a session the profile is re-read, so a role changed on the
    /// backend takes effect on the next navigation.
    pub fn navigate(&mut self, path: RoutePath) -> Vec<ShellEffect> {
        if &path != self.location.current() {
            self.location.replace(path);
        }
        self.evaluate();
        self.refresh_profile()
    }

    /// Stores a new session and asks for its profile.
    ///
    /// The gate shows `Loading` until [`ClientShell::apply_profile`] commits.
    pub fn sign_in(&mut self, session: Session) -> Vec<ShellEffect> {
        let generation = self.snapshot.begin(session.clone());
        self.markers.set_token();
        self.evaluate();
        info!(generation, "Session started");

        vec![
            ShellEffect::FetchProfile {
                generation,
                session,
            },
            ShellEffect::ArmIdle,
        ]
    }

    /// Commits a profile fetch result.
    ///
    /// Results for an older session or arriving after unmount are dropped.
    pub fn apply_profile(
        &mut self,
        generation: u64,
        result: Result<Profile, SessionError>,
    ) -> CommitOutcome {
        if !self.mounted {
            debug!(generation, "Shell unmounted, dropping profile fetch");
            return CommitOutcome::Stale;
        }

        let outcome = self.snapshot.commit(generation, result);
        if outcome == CommitOutcome::Applied {
            if let Some(profile) = self.snapshot.profile() {
                self.markers.set_role(&profile.role);
            }
            self.evaluate();
        }
        outcome
    }

    /// Re-reads the profile of the current session, if any.
    pub fn refresh_profile(&self) -> Vec<ShellEffect> {
        self.snapshot
            .session()
            .map(|session| ShellEffect::FetchProfile {
                generation: self.snapshot.generation(),
                session: session.clone(),
            })
            .into_iter()
            .collect()
    }

    /// The tab became visible again: counts as activity and refreshes the
    /// profile.
    pub fn on_visibility_change(&self) -> Vec<ShellEffect> {
        let mut effects = vec![ShellEffect::ResetIdle];
        effects.extend(self.refresh_profile());
        effects
    }

    /// User activity. Becoming visible also refreshes the profile.
    pub fn record_activity(&self, kind: ActivityKind) -> Vec<ShellEffect> {
        match kind {
            ActivityKind::VisibilityChange => self.on_visibility_change(),
            _ => vec![ShellEffect::ResetIdle],
        }
    }

    /// Ends the session and clears the markers.
    pub fn sign_out(&mut self) -> Vec<ShellEffect> {
        self.markers.clear();
        let session = self.snapshot.end();
        self.evaluate();

        let mut effects = vec![ShellEffect::DisarmIdle];
        if let Some(session) = session {
            info!("Session ended by sign-out");
            effects.push(ShellEffect::RevokeSession { session });
        }
        effects
    }

    /// Idle timeout reached: clear markers, force `/`, reload.
    pub fn expire(&mut self) -> Vec<ShellEffect> {
        warn!(path = %self.location.current(), "Session expired for inactivity");
        self.markers.clear();
        let session = self.snapshot.end();

        let root = RoutePath::root();
        if self.location.current() != &root {
            self.location.replace(root);
        }
        self.reload();

        let mut effects = vec![ShellEffect::DisarmIdle];
        if let Some(session) = session {
            effects.push(ShellEffect::RevokeSession { session });
        }
        effects.push(ShellEffect::Reload);
        effects
    }

    /// Discards queued messages and re-evaluates from a clean snapshot.
    ///
    /// The snapshot generation is kept, so fetches issued before the reload
    /// stay stale.
    fn reload(&mut self) {
        self.snapshot.end();
        self.control_rx = self.bus.subscribe();
        self.reloads += 1;
        self.evaluate();
    }

    /// Drains pending control messages and applies them.
    pub fn process_control(&mut self) -> Vec<ShellEffect> {
        let mut effects = Vec::new();
        loop {
            match self.control_rx.try_recv() {
                Ok(ControlMessage::SignOut) => effects.extend(self.sign_out()),
                Ok(ControlMessage::ResetIdle) => effects.push(ShellEffect::ResetIdle),
                Ok(ControlMessage::RefreshProfile) => effects.extend(self.refresh_profile()),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Control channel lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        effects
    }

    /// Unmounts the shell. Later profile results are dropped.
    pub fn unmount(&mut self) -> Vec<ShellEffect> {
        self.mounted = false;
        vec![ShellEffect::DisarmIdle]
    }

    /// A publishing handle for the shell's control channel.
    #[must_use]
    pub fn control(&self) -> ControlHandle {
        self.bus.handle()
    }

    /// The last gate resolution.
    #[must_use]
    pub const fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// The rendered view, `None` while loading.
    #[must_use]
    pub const fn view(&self) -> Option<View> {
        self.resolution.view()
    }

    /// The current hash path.
    #[must_use]
    pub fn location(&self) -> &RoutePath {
        self.location.current()
    }

    /// The session snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// The auth markers.
    #[must_use]
    pub const fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Returns `true` until [`ClientShell::unmount`].
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Serializable snapshot.
    #[must_use]
    pub fn state(&self) -> ShellState {
        ShellState {
            location: self.location.current().clone(),
            view: self.view(),
            loading: self.resolution.decision.is_loading(),
            session_present: self.snapshot.session_present(),
            role: self.snapshot.role(),
            profile: self.snapshot.profile().cloned(),
            reloads: self.reloads,
        }
    }
}
