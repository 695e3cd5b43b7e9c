//! HTTP API routes and handlers.
//!
//! - `health` - Service health checks
//! - `gate` - Route table and stateless gate evaluation
//! - `clients` - Mounted client shells
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod clients;
pub mod error;
pub mod gate;
pub mod health;
pub mod openapi;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /swagger-ui                      - Swagger UI
/// /api
/// ├── /routes                      - Route table
/// ├── /gate                        - Stateless gate evaluation
/// ├── /clients                     - Mount a client shell
/// ├── /clients/{id}                - Client state, unmount
/// ├── /clients/{id}/location       - Hash change
/// ├── /clients/{id}/session        - Sign in
/// ├── /clients/{id}/sign-out       - Sign out
/// ├── /clients/{id}/profile/refresh
/// ├── /clients/{id}/activity       - User activity
/// ├── /clients/{id}/control        - Control channel
/// └── /openapi.json                - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .merge(gate::router())
                .nest("/clients", clients::router()),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
