//! Hash paths, views and the typed route table.
//!
//! The browser hash is the only navigational state. [`RoutePath::parse`]
//! turns whatever the location bar holds (`#/operator`, `operator/`,
//! `#/login?next=x`) into one normalized form, and [`match_route`] picks the
//! table entry that governs it.
//!
//! The table is an ordered list of `(pattern, access, view)` entries. A
//! pattern matches when the path starts with it, ignoring ASCII case, so
//! `/operators` falls under `operator` the same way `/operator/trips` does.
//! The longest matching pattern wins; among equally long patterns the first
//! one listed wins.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::role::Role;

/// Longest hash accepted, in bytes.
pub const MAX_PATH_LENGTH: usize = 512;

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._~%+\-]+$").expect("route segment regex is valid")
});

/// Errors from parsing a hash path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// The hash is longer than [`MAX_PATH_LENGTH`].
    #[error("Route path is {actual} bytes, maximum is {max}")]
    TooLong {
        /// Maximum accepted length.
        max: usize,
        /// Length received.
        actual: usize,
    },

}

/// A normalized hash path: leading `/`, no trailing `/`, no query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "/operator")]
pub struct RoutePath(String);

impl RoutePath {
    /// The landing path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parses a raw location hash.
    ///
    /// An empty hash is the root path. Segments with characters outside the
    /// URL-safe set are percent-encoded, the way a browser reports them in
    /// `location.hash`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::TooLong`] if the hash exceeds [`MAX_PATH_LENGTH`].
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let trimmed = raw.trim();
        if trimmed.len() > MAX_PATH_LENGTH {
            return Err(RouteError::TooLong {
                max: MAX_PATH_LENGTH,
                actual: trimmed.len(),
            });
        }

        let without_hash = trimmed.strip_prefix('#').unwrap_or(trimmed);
        let path = without_hash
            .find(|c| c == '?' || c == '#')
            .map_or(without_hash, |idx| &without_hash[..idx]);

        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                if SEGMENT_RE.is_match(segment) {
                    segment.to_string()
                } else {
                    urlencoding::encode(segment).into_owned()
                }
            })
            .collect();

        Ok(Self(format!("/{}", segments.join("/"))))
    }

    /// The path as a string, always starting with `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The hash form used in the location bar, e.g. `#/operator`.
    #[must_use]
    pub fn to_hash(&self) -> String {
        format!("#{}", self.0)
    }
}

impl Default for RoutePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoutePath {
    type Error = RouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoutePath> for String {
    fn from(path: RoutePath) -> Self {
        path.0
    }
}

impl From<Role> for RoutePath {
    fn from(role: Role) -> Self {
        Self(role.canonical_path().to_string())
    }
}

/// The screen a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Public search form and trip listings.
    Landing,
    /// Sign-in form.
    Login,
    /// Account creation form.
    Signup,
    /// Password reset request form.
    ForgotPassword,
    /// Ticket history and bookings of a passenger.
    PassengerDashboard,
    /// Trip and fleet management for an operator.
    OperatorDashboard,
    /// Admin-class back office.
    AdminDashboard,
    /// Platform-wide super-admin console.
    SuperAdminDashboard,
    /// Driver manifest and boarding console.
    DriverConsole,
    /// The signed-in user's profile page.
    Profile,
    /// Placeholder for `#/dashboard`, resolved to the caller's own dashboard.
    RoleDashboard,
}

impl View {
    /// The dashboard a role lands on.
    #[must_use]
    pub const fn dashboard_for(role: Role) -> Self {
        match role {
            Role::SuperAdmin => Self::SuperAdminDashboard,
            Role::Admin => Self::AdminDashboard,
            Role::Operator => Self::OperatorDashboard,
            Role::Passenger => Self::PassengerDashboard,
            Role::Unknown => Self::Landing,
        }
    }
}

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone, signed in or not.
    Public,
    /// Login and signup pages. Signed-in users are sent to their own path.
    AuthPage,
    /// Exactly this role.
    Exactly(Role),
    /// This role or any more privileged one.
    AtLeast(Role),
    /// Admin-class or super-admin.
    AdminClass,
    /// Super-admin only.
    SuperAdminOnly,
    /// Any recognised role.
    AnyRole,
}

impl Access {
    /// Returns `true` if the route needs a session.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        !matches!(self, Self::Public | Self::AuthPage)
    }

    /// Returns `true` if `role` may open a route with this access level.
    ///
    /// Unknown roles are refused every protected route.
    #[must_use]
    pub fn permits(self, role: Role) -> bool {
        match self {
            Self::Public | Self::AuthPage => true,
            _ if role == Role::Unknown => false,
            Self::Exactly(required) => role == required,
            Self::AtLeast(required) => role.at_least(required),
            Self::AdminClass => role.is_admin_like(),
            Self::SuperAdminOnly => role.is_super_admin(),
            Self::AnyRole => true,
        }
    }

    /// Short human-readable form, e.g. `exactly:operator`.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::Public => "public".to_string(),
            Self::AuthPage => "auth_page".to_string(),
            Self::Exactly(role) => format!("exactly:{role}"),
            Self::AtLeast(role) => format!("at_least:{role}"),
            Self::AdminClass => "admin_class".to_string(),
            Self::SuperAdminOnly => "super_admin_only".to_string(),
            Self::AnyRole => "any_role".to_string(),
        }
    }
}

/// One row of the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Path prefix this entry covers, without the leading `/`, e.g. `admin`.
    pub pattern: &'static str,
    /// Who may open it.
    pub access: Access,
    /// What it renders when allowed.
    pub view: View,
}

impl RouteEntry {
    const fn new(pattern: &'static str, access: Access, view: View) -> Self {
        Self {
            pattern,
            access,
            view,
        }
    }

    /// Pattern length if `path` starts with this entry's pattern.
    fn match_len(&self, path: &RoutePath) -> Option<usize> {
        let rest = path.as_str().trim_start_matches('/');
        let head = rest.get(..self.pattern.len())?;
        head.eq_ignore_ascii_case(self.pattern)
            .then_some(self.pattern.len())
    }
}

/// The application's route table, in priority order.
pub static ROUTE_TABLE: &[RouteEntry] = &[
    RouteEntry::new("login", Access::AuthPage, View::Login),
    RouteEntry::new("signup", Access::AuthPage, View::Signup),
    RouteEntry::new("register", Access::AuthPage, View::Signup),
    RouteEntry::new("forgot-password", Access::AuthPage, View::ForgotPassword),
    RouteEntry::new("superadmin", Access::SuperAdminOnly, View::SuperAdminDashboard),
    RouteEntry::new("admin", Access::AdminClass, View::AdminDashboard),
    RouteEntry::new("operator", Access::Exactly(Role::Operator), View::OperatorDashboard),
    RouteEntry::new("passenger", Access::Exactly(Role::Passenger), View::PassengerDashboard),
    RouteEntry::new("driver", Access::AtLeast(Role::Operator), View::DriverConsole),
    RouteEntry::new("dashboard", Access::AnyRole, View::RoleDashboard),
    RouteEntry::new("profile", Access::AnyRole, View::Profile),
];

/// Finds the entry governing `path`, or `None` for the public fallback.
#[must_use]
pub fn match_route(path: &RoutePath) -> Option<&'static RouteEntry> {
    let mut best: Option<(&'static RouteEntry, usize)> = None;
    for entry in ROUTE_TABLE {
        if let Some(len) = entry.match_len(path) {
            if len > 0 && best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((entry, len));
            }
        }
    }
    best.map(|(entry, _)| entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> RoutePath {
        RoutePath::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_hash_forms() {
        assert_eq!(path("#/operator").as_str(), "/operator");
        assert_eq!(path("#operator").as_str(), "/operator");
        assert_eq!(path("/operator/").as_str(), "/operator");
        assert_eq!(path("operator").as_str(), "/operator");
        assert_eq!(path("#/admin//users/").as_str(), "/admin/users");
    }

    #[test]
    fn test_parse_empty_is_root() {
        assert!(path("").is_root());
        assert!(path("#").is_root());
        assert!(path("#/").is_root());
        assert!(path("  ").is_root());
    }

    #[test]
    fn test_parse_strips_query() {
        assert_eq!(path("#/login?next=/admin").as_str(), "/login");
        assert_eq!(path("#/passenger#tickets").as_str(), "/passenger");
    }

    #[test]
    fn test_parse_encodes_unsafe_segments() {
        assert_eq!(path("#/admin/<script>").as_str(), "/admin/%3Cscript%3E");
        assert_eq!(path("#/with space").as_str(), "/with%20space");
        assert_eq!(path("#/already%20encoded").as_str(), "/already%20encoded");
    }

    #[test]
    fn test_parse_rejects_long_paths() {
        let raw = format!("#/{}", "a".repeat(MAX_PATH_LENGTH));
        assert!(matches!(
            RoutePath::parse(&raw),
            Err(RouteError::TooLong { .. })
        ));
    }

    #[test]
    fn test_to_hash() {
        assert_eq!(path("operator").to_hash(), "#/operator");
        assert_eq!(RoutePath::root().to_hash(), "#/");
    }

    #[test]
    fn test_serde_validates() {
        let parsed: RoutePath = serde_json::from_str("\"#/admin/\"").unwrap();
        assert_eq!(parsed.as_str(), "/admin");
        assert_eq!(
            serde_json::from_str::<RoutePath>("\"/a b\"").unwrap().as_str(),
            "/a%20b"
        );
        let long = format!("\"/{}\"", "a".repeat(MAX_PATH_LENGTH));
        assert!(serde_json::from_str::<RoutePath>(&long).is_err());
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"/admin\"");
    }

    #[test]
    fn test_match_route_by_prefix() {
        assert_eq!(match_route(&path("/admin")).unwrap().view, View::AdminDashboard);
        assert_eq!(
            match_route(&path("/admin/operators/42")).unwrap().view,
            View::AdminDashboard
        );
        assert_eq!(
            match_route(&path("/superadmin")).unwrap().view,
            View::SuperAdminDashboard
        );
    }

    #[test]
    fn test_match_route_by_string_prefix() {
        let cases = [
            ("/administrator", View::AdminDashboard),
            ("/operators", View::OperatorDashboard),
            ("/passengers/history", View::PassengerDashboard),
            ("/superadmin-tools", View::SuperAdminDashboard),
            ("/login-help", View::Login),
            ("/profiles", View::Profile),
        ];
        for (raw, view) in cases {
            assert_eq!(match_route(&path(raw)).unwrap().view, view, "{raw}");
        }
    }

    #[test]
    fn test_match_route_prefers_longest_pattern() {
        let entry = match_route(&path("/superadmin")).unwrap();
        assert_eq!(entry.pattern, "superadmin");
        assert!(match_route(&path("/adm")).is_none());
    }

    #[test]
    fn test_match_route_case_insensitive() {
        assert_eq!(
            match_route(&path("/Operator")).unwrap().view,
            View::OperatorDashboard
        );
    }

    #[test]
    fn test_unmatched_paths() {
        assert!(match_route(&RoutePath::root()).is_none());
        assert!(match_route(&path("/trips/kinshasa-matadi")).is_none());
    }

    #[test]
    fn test_register_is_signup() {
        let entry = match_route(&path("/register")).unwrap();
        assert_eq!(entry.access, Access::AuthPage);
        assert_eq!(entry.view, View::Signup);
    }

    #[test]
    fn test_access_permits() {
        assert!(Access::Exactly(Role::Operator).permits(Role::Operator));
        assert!(!Access::Exactly(Role::Operator).permits(Role::Admin));
        assert!(Access::AdminClass.permits(Role::SuperAdmin));
        assert!(!Access::SuperAdminOnly.permits(Role::Admin));
        assert!(Access::AtLeast(Role::Operator).permits(Role::Admin));
        assert!(!Access::AtLeast(Role::Operator).permits(Role::Passenger));
        assert!(Access::AnyRole.permits(Role::Passenger));
    }

    #[test]
    fn test_unknown_role_denied_everything_protected() {
        for entry in ROUTE_TABLE.iter().filter(|e| e.access.is_protected()) {
            assert!(!entry.access.permits(Role::Unknown), "{}", entry.pattern);
        }
    }

    #[test]
    fn test_access_describe() {
        assert_eq!(Access::Exactly(Role::Operator).describe(), "exactly:operator");
        assert_eq!(Access::SuperAdminOnly.describe(), "super_admin_only");
    }

    #[test]
    fn test_dashboard_for_role() {
        assert_eq!(View::dashboard_for(Role::Operator), View::OperatorDashboard);
        assert_eq!(View::dashboard_for(Role::Unknown), View::Landing);
    }
}
