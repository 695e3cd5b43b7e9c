//! Route table and stateless gate evaluation.
//!
//! These endpoints answer "what would the gate do" without mounting a
//! client, which is what route guards in other services and the front-end
//! test suite use.

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use congomuv_core::{
    decide_raw, match_route, settle, GateDecision, MemoryLocation, Role, RoutePath, View,
    ROUTE_TABLE,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the gate router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/gate", get(evaluate_gate))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// One row of the route table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "pattern": "operator",
    "access": "exactly:operator",
    "protected": true,
    "view": "operator_dashboard"
}))]
pub struct RouteInfo {
    /// Leading path segments matched, case-insensitively.
    #[schema(example = "operator")]
    pub pattern: String,

    /// Access rule, e.g. `public`, `exactly:operator`, `admin_class`.
    #[schema(example = "exactly:operator")]
    pub access: String,

    /// Whether a session is required.
    pub protected: bool,

    /// View rendered when access is granted.
    pub view: View,
}

/// Route table listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoutesResponse {
    /// Entries in priority order.
    pub routes: Vec<RouteInfo>,
    /// View for paths no entry matches.
    pub fallback: View,
}

/// Query parameters for gate evaluation.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct GateQuery {
    /// Hash path, with or without the leading `#`.
    #[param(example = "#/operator")]
    pub path: String,

    /// Raw profile role. Empty or absent means "not loaded yet".
    #[param(example = "Operator ")]
    pub role: Option<String>,

    /// Whether a session is held.
    #[param(example = true)]
    #[serde(default)]
    pub session: bool,
}

/// Gate evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "path": "/admin",
    "role": "operator",
    "route": "admin",
    "decision": { "outcome": "redirect", "target": "/operator" },
    "settled": { "outcome": "render", "target": "operator_dashboard" },
    "redirects": ["/operator"]
}))]
pub struct GateResponse {
    /// Normalized path.
    pub path: RoutePath,

    /// Classified role, `null` while not loaded.
    pub role: Option<Role>,

    /// Matched route pattern, `null` for unmatched paths.
    pub route: Option<String>,

    /// Decision for this path alone.
    pub decision: GateDecision,

    /// Final decision after following redirects.
    pub settled: GateDecision,

    /// Paths written while settling, in order.
    pub redirects: Vec<RoutePath>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the route table.
#[utoipa::path(
    get,
    path = "/api/routes",
    tag = "gate",
    operation_id = "listRoutes",
    summary = "List the route table",
    description = "Returns every route pattern with its access rule and view, in the \
        order used to break ties between equally long matches.",
    responses(
        (status = 200, description = "Route table", body = RoutesResponse)
    )
)]
pub async fn list_routes() -> Json<RoutesResponse> {
    let routes = ROUTE_TABLE
        .iter()
        .map(|entry| RouteInfo {
            pattern: entry.pattern.to_string(),
            access: entry.access.describe(),
            protected: entry.access.is_protected(),
            view: entry.view,
        })
        .collect();

    Json(RoutesResponse {
        routes,
        fallback: View::Landing,
    })
}

/// Evaluate the gate for a path and role.
#[utoipa::path(
    get,
    path = "/api/gate",
    tag = "gate",
    operation_id = "evaluateGate",
    summary = "Evaluate the gate",
    description = "Computes the gate decision for a hash path, session presence and raw \
        role string. A session with an empty role yields `loading`, never a redirect.",
    params(GateQuery),
    responses(
        (status = 200, description = "Gate decision", body = GateResponse),
        (status = 400, description = "Path longer than 512 bytes", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn evaluate_gate(Query(query): Query<GateQuery>) -> ApiResult<Json<GateResponse>> {
    let path = RoutePath::parse(&query.path)?;
    let raw_role = query.role.as_deref().unwrap_or_default();
    let role = Role::parse(raw_role);

    let decision = decide_raw(&path, query.session, raw_role);
    let mut location = MemoryLocation::new(path.clone());
    let resolution = settle(&mut location, query.session, role);

    Ok(Json(GateResponse {
        route: match_route(&path).map(|entry| entry.pattern.to_string()),
        path,
        role,
        decision,
        settled: resolution.decision,
        redirects: resolution.redirects,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_routes_matches_table() {
        let Json(response) = list_routes().await;
        assert_eq!(response.routes.len(), ROUTE_TABLE.len());
        let admin = response
            .routes
            .iter()
            .find(|r| r.pattern == "admin")
            .unwrap();
        assert!(admin.protected);
        assert_eq!(admin.access, "admin_class");
    }

    #[tokio::test]
    async fn test_gate_loading_with_empty_role() {
        let query = GateQuery {
            path: "#/admin".to_string(),
            role: Some(String::new()),
            session: true,
        };
        let Json(response) = evaluate_gate(Query(query)).await.unwrap();
        assert_eq!(response.decision, GateDecision::Loading);
        assert_eq!(response.role, None);
        assert!(response.redirects.is_empty());
    }

    #[tokio::test]
    async fn test_gate_operator_on_admin_path() {
        let query = GateQuery {
            path: "/admin".to_string(),
            role: Some("Operator ".to_string()),
            session: true,
        };
        let Json(response) = evaluate_gate(Query(query)).await.unwrap();
        assert_eq!(
            response.decision.redirect_target().map(RoutePath::as_str),
            Some("/operator")
        );
        assert_eq!(response.settled, GateDecision::Render(View::OperatorDashboard));
        assert_eq!(response.route.as_deref(), Some("admin"));
    }
}
