//! OpenAPI specification generation for the CongoMuv gate API.
//!
//! Swagger UI serves the document at `/api/openapi.json` and renders it at
//! `/swagger-ui`; the `gen-openapi` binary writes it to disk for the
//! front-end client generator.

use congomuv_core::{
    ActivityKind, CommitOutcome, ControlMessage, ExpiryCause, GateDecision, IdlePhase,
    IdleStatus, Profile, Role, RoutePath, ShellState, View,
};
use utoipa::OpenApi;

use super::clients::{
    ActivityRequest, ClientResponse, ControlRequest, MountRequest, NavigateRequest,
    SignInRequest,
};
use super::error::ErrorResponse;
use super::gate::{GateResponse, RouteInfo, RoutesResponse};
use super::health::HealthResponse;

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CongoMuv Gate API",
        version = "0.1.0",
        description = r#"
# CongoMuv Gate API

Session and role gating for the CongoMuv ticketing front-end (bus, train,
river and private transport in the DRC).

## Overview

1. **Gate**: decide whether a hash route renders, redirects, or waits for
   the profile to load, from session presence and role.
2. **Client shells**: one mounted shell per browser tab, with its own hash
   location, session snapshot and idle timer.
3. **Idle logout**: after a period without activity a warning counts down,
   then the session is cleared and the shell reloads at `/`.

## Roles

`super_admin` > `admin` (congomuv_hq, onatra, transco, private, admin) >
`operator` > `passenger`. Role strings are trimmed and lower-cased before
comparison. An empty role means "not loaded yet" and always yields
`loading`, never a redirect.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local CongoMuv gate server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "gate", description = "Route table and stateless gate evaluation"),
        (name = "clients", description = "Mounted client shells: navigation, sessions, idle timer")
    ),
    paths(
        super::health::health_check,
        super::gate::list_routes,
        super::gate::evaluate_gate,
        super::clients::mount_client,
        super::clients::get_client,
        super::clients::unmount_client,
        super::clients::navigate,
        super::clients::sign_in,
        super::clients::sign_out,
        super::clients::refresh_profile,
        super::clients::record_activity,
        super::clients::publish_control,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            RouteInfo,
            RoutesResponse,
            GateResponse,
            MountRequest,
            NavigateRequest,
            SignInRequest,
            ActivityRequest,
            ControlRequest,
            ClientResponse,
            ShellState,
            IdleStatus,
            IdlePhase,
            ExpiryCause,
            ActivityKind,
            ControlMessage,
            CommitOutcome,
            GateDecision,
            RoutePath,
            Role,
            View,
            Profile,
        )
    )
)]
pub struct ApiDoc;
