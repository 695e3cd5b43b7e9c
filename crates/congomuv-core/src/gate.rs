//! Session/role gate.
//!
//! [`decide`] maps `(path, session, role)` to one of three outcomes: show a
//! loading placeholder, redirect the hash, or render a view. It is a pure
//! function; [`settle`] applies its redirects to a [`HashLocation`] and
//! re-evaluates until the location stops moving.
//!
//! # Policy
//!
//! 1. Session present but role not loaded: `Loading`. Never redirect while
//!    the profile fetch is in flight.
//! 2. Auth pages with a signed-in user: redirect to the role's canonical path.
//! 3. Protected routes without a session: redirect to `/`.
//! 4. Protected routes with a session: render if the role is allowed,
//!    otherwise redirect to the role's canonical path (`/` for unknown roles).
//! 5. Everything else renders the public landing view.
//!
//! Every redirect is compared with the current path first, so applying the
//! same decision twice writes the hash at most once.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::role::Role;
use crate::route::{match_route, Access, RoutePath, View};

/// Upper bound on chained redirects during one [`settle`] call.
///
/// The policy never chains more than two; anything beyond this is a bug.
pub const MAX_REDIRECT_HOPS: usize = 4;

/// What the gate wants the shell to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "target")]
pub enum GateDecision {
    /// Profile still loading; show a placeholder.
    Loading,
    /// Replace the hash with this path.
    Redirect(RoutePath),
    /// Render this view.
    Render(View),
}

impl GateDecision {
    /// The view to render, if any.
    #[must_use]
    pub const fn view(&self) -> Option<View> {
        match self {
            Self::Render(view) => Some(*view),
            _ => None,
        }
    }

    /// The redirect target, if any.
    #[must_use]
    pub const fn redirect_target(&self) -> Option<&RoutePath> {
        match self {
            Self::Redirect(target) => Some(target),
            _ => None,
        }
    }

    /// Returns `true` for [`GateDecision::Loading`].
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Decides the outcome for a path given the session snapshot.
///
/// `role` is `None` while the profile has not loaded. Without a session the
/// role is ignored, so a stale role marker never grants access.
#[must_use]
pub fn decide(path: &RoutePath, session_present: bool, role: Option<Role>) -> GateDecision {
    let signed_in = if session_present {
        match role {
            Some(role) => Some(role),
            None => return GateDecision::Loading,
        }
    } else {
        None
    };

    let Some(entry) = match_route(path) else {
        return GateDecision::Render(View::Landing);
    };

    match (entry.access, signed_in) {
        (Access::Public | Access::AuthPage, None) => GateDecision::Render(entry.view),
        (Access::AuthPage, Some(role)) => redirect_unless_current(path, role.into(), entry.view),
        (_, None) => redirect_unless_current(path, RoutePath::root(), View::Landing),
        (access, Some(role)) if access.permits(role) => {
            GateDecision::Render(resolve_view(entry.view, role))
        }
        (_, Some(role)) => redirect_unless_current(path, role.into(), View::Landing),
    }
}

/// Like [`decide`], but takes the raw profile role string.
#[must_use]
pub fn decide_raw(path: &RoutePath, session_present: bool, raw_role: &str) -> GateDecision {
    decide(path, session_present, Role::parse(raw_role))
}

fn redirect_unless_current(current: &RoutePath, target: RoutePath, fallback: View) -> GateDecision {
    if &target == current {
        GateDecision::Render(fallback)
    } else {
        GateDecision::Redirect(target)
    }
}

fn resolve_view(view: View, role: Role) -> View {
    match view {
        View::RoleDashboard => View::dashboard_for(role),
        other => other,
    }
}

/// The browser's location hash, or anything standing in for it.
pub trait HashLocation {
    /// The current path.
    fn current(&self) -> &RoutePath;

    /// Replaces the current path. Callers go through [`apply`], which skips
    /// writes that would not change anything.
    fn replace(&mut self, path: RoutePath);
}

/// In-memory [`HashLocation`] that counts its writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocation {
    current: RoutePath,
    writes: usize,
}

impl MemoryLocation {
    /// Creates a location pointing at `path`.
    #[must_use]
    pub const fn new(path: RoutePath) -> Self {
        Self {
            current: path,
            writes: 0,
        }
    }

    /// Number of times the hash has been replaced.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl HashLocation for MemoryLocation {
    fn current(&self) -> &RoutePath {
        &self.current
    }

    fn replace(&mut self, path: RoutePath) {
        self.current = path;
        self.writes += 1;
    }
}

/// Applies a redirect decision. Returns `true` if the hash changed.
pub fn apply<L: HashLocation + ?Sized>(location: &mut L, decision: &GateDecision) -> bool {
    match decision {
        GateDecision::Redirect(target) if target != location.current() => {
            debug!(from = %location.current(), to = %target, "Gate redirect");
            location.replace(target.clone());
            true
        }
        _ => false,
    }
}

/// Result of settling a location against the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Final decision: always `Loading` or `Render`.
    pub decision: GateDecision,
    /// Paths written to the hash, in order.
    pub redirects: Vec<RoutePath>,
}

impl Resolution {
    /// The rendered view, or `None` while loading.
    #[must_use]
    pub const fn view(&self) -> Option<View> {
        self.decision.view()
    }
}

/// Evaluates the gate, following redirects until the location is stable.
///
/// Each redirect counts as a hash change and is re-evaluated, the way the
/// browser fires `hashchange` after every write.
pub fn settle<L: HashLocation + ?Sized>(
    location: &mut L,
    session_present: bool,
    role: Option<Role>,
) -> Resolution {
    let mut redirects = Vec::new();

    for _ in 0..=MAX_REDIRECT_HOPS {
        let decision = decide(location.current(), session_present, role);
        if !apply(location, &decision) {
            let decision = match decision {
                GateDecision::Redirect(_) => GateDecision::Render(View::Landing),
                other => other,
            };
            return Resolution {
                decision,
                redirects,
            };
        }
        redirects.push(location.current().clone());
    }

    warn!(
        path = %location.current(),
        hops = redirects.len(),
        "Redirect chain did not settle, rendering landing view"
    );
    Resolution {
        decision: GateDecision::Render(View::Landing),
        redirects,
    }
}
