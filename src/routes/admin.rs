use crate::{AppState, handlers, require_admin, routes::USER_ADMIN_PATH};
use axum::{
    Router,
    routing::{get, patch},
};

/// Admin Router Module
///
/// Routes restricted to users whose record carries `role = "admin"`. Each method route is
/// wrapped by `require_admin`: authentication first (401), then the admin lookup (403).
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // GET /users
        // Full user listing.
        .route("/users", require_admin(state, get(handlers::get_users)))
        // PATCH /users/admin/{id}
        // Promotes a user to admin by store `_id`.
        .route(USER_ADMIN_PATH, require_admin(state, patch(handlers::promote_user)))
}
