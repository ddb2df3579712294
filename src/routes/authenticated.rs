use crate::{AppState, handlers, require_auth, routes::USER_ADMIN_PATH};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes that require a valid bearer token but no particular role. Each method route is
/// wrapped by `require_auth`, which rejects everything else with 401 and leaves the decoded
/// claims in the request extensions.
pub fn authenticated_routes(state: &AppState) -> Router<AppState> {
    Router::<AppState>::new()
        // GET /users/admin/{email}
        // Whether the caller is an admin. Only answers truthfully about the caller's own email.
        .route(USER_ADMIN_PATH, require_auth(state, get(handlers::check_admin)))
}
