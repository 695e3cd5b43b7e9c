//! Role normalization and the privilege tier.
//!
//! Profiles carry a free-form role string written by the auth backend. Every
//! comparison goes through [`Role::parse`], which trims and lower-cases the
//! raw value before classifying it.
//!
//! An empty role is not a role at all: it means the profile has not loaded
//! yet, so [`Role::parse`] returns `None` instead of [`Role::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Raw role names that classify as admin-class.
pub const ADMIN_ROLE_NAMES: &[&str] = &[
    "congomuv_hq",
    "onatra",
    "transco",
    "private",
    "admin",
    "superadmin",
    "super_admin",
];

/// Raw role names that classify as super-admin.
pub const SUPER_ADMIN_ROLE_NAMES: &[&str] = &["superadmin", "super_admin"];

/// A classified user role.
///
/// Variants are declared in tier order, so the derived [`Ord`] is the
/// privilege order: `Unknown < Passenger < Operator < Admin < SuperAdmin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A non-empty role string that matched no known class.
    Unknown,
    /// Ticket buyer.
    Passenger,
    /// Transport operator staff.
    Operator,
    /// Admin-class: headquarters, ONATRA, TRANSCO, private operators, admin.
    Admin,
    /// Platform super-administrator.
    SuperAdmin,
}

impl Role {
    /// Classifies a raw role string.
    ///
    /// Returns `None` when the normalized string is empty ("not yet loaded").
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_role(raw);
        if normalized.is_empty() {
            return None;
        }

        let role = if SUPER_ADMIN_ROLE_NAMES.contains(&normalized.as_str()) {
            Self::SuperAdmin
        } else if ADMIN_ROLE_NAMES.contains(&normalized.as_str()) {
            Self::Admin
        } else if normalized == "operator" {
            Self::Operator
        } else if normalized == "passenger" {
            Self::Passenger
        } else {
            Self::Unknown
        };
        Some(role)
    }

    /// Returns `true` if `self` is at least as privileged as `other`.
    ///
    /// `Unknown` is never at least anything, including itself.
    #[inline]
    #[must_use]
    pub fn at_least(self, other: Self) -> bool {
        self != Self::Unknown && self >= other
    }

    /// Returns `true` for admin-class roles, super-admin included.
    #[inline]
    #[must_use]
    pub fn is_admin_like(self) -> bool {
        self.at_least(Self::Admin)
    }

    /// Returns `true` only for super-admin.
    #[inline]
    #[must_use]
    pub fn is_super_admin(self) -> bool {
        self == Self::SuperAdmin
    }

    /// The hash path this role lands on by default.
    #[must_use]
    pub const fn canonical_path(self) -> &'static str {
        match self {
            Self::SuperAdmin => "/superadmin",
            Self::Admin => "/admin",
            Self::Operator => "/operator",
            Self::Passenger => "/passenger",
            Self::Unknown => "/",
        }
    }

    /// Stable lower-case name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Passenger => "passenger",
            Self::Operator => "operator",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trims and lower-cases a raw role string.
#[must_use]
pub fn normalize_role(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_role_is_not_loaded() {
        assert_eq!(Role::parse(""), None);
        assert_eq!(Role::parse("   "), None);
        assert_eq!(Role::parse("\t\n"), None);
    }

    #[test]
    fn test_mixed_case_and_whitespace_normalize() {
        assert_eq!(Role::parse("Operator "), Some(Role::Operator));
        assert_eq!(Role::parse("  PASSENGER"), Some(Role::Passenger));
        assert_eq!(Role::parse("Super_Admin"), Some(Role::SuperAdmin));
    }

    #[test]
    fn test_admin_class_names() {
        for name in ["congomuv_hq", "onatra", "transco", "private", "admin"] {
            assert_eq!(Role::parse(name), Some(Role::Admin), "{name}");
        }
        for name in SUPER_ADMIN_ROLE_NAMES {
            assert_eq!(Role::parse(name), Some(Role::SuperAdmin), "{name}");
        }
    }

    #[test]
    fn test_unrecognised_role_is_unknown() {
        assert_eq!(Role::parse("driver"), Some(Role::Unknown));
        assert_eq!(Role::parse("root"), Some(Role::Unknown));
    }

    #[test]
    fn test_tier_order() {
        assert!(Role::SuperAdmin > Role::Admin);
        assert!(Role::Admin > Role::Operator);
        assert!(Role::Operator > Role::Passenger);
        assert!(Role::Passenger > Role::Unknown);
    }

    #[test]
    fn test_at_least() {
        assert!(Role::SuperAdmin.at_least(Role::Admin));
        assert!(Role::Admin.at_least(Role::Admin));
        assert!(!Role::Operator.at_least(Role::Admin));
        assert!(Role::Passenger.at_least(Role::Passenger));
        assert!(!Role::Unknown.at_least(Role::Unknown));
    }

    #[test]
    fn test_admin_like_and_super_admin() {
        assert!(Role::Admin.is_admin_like());
        assert!(Role::SuperAdmin.is_admin_like());
        assert!(!Role::Operator.is_admin_like());
        assert!(Role::SuperAdmin.is_super_admin());
        assert!(!Role::Admin.is_super_admin());
    }

    #[test]
    fn test_canonical_paths() {
        assert_eq!(Role::SuperAdmin.canonical_path(), "/superadmin");
        assert_eq!(Role::Admin.canonical_path(), "/admin");
        assert_eq!(Role::Operator.canonical_path(), "/operator");
        assert_eq!(Role::Passenger.canonical_path(), "/passenger");
        assert_eq!(Role::Unknown.canonical_path(), "/");
    }

    #[test]
    fn test_serde_matches_display() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
        assert_eq!(Role::SuperAdmin.to_string(), "super_admin");
    }
}
