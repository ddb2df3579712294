use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Public Router Module
///
/// Endpoints that need no credential: the banner, the token issuer, the info listing,
/// self-registration and the selected-class collection.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Plain-text banner.
        .route("/", get(handlers::root))
        // POST /jwt
        // Token Issuer: signs the posted payload for one hour.
        .route("/jwt", post(handlers::issue_jwt))
        // GET /info
        .route("/info", get(handlers::get_info))
        // POST /users
        // Self-registration, unique by email.
        .route("/users", post(handlers::create_user))
        // GET/POST /selectedclasses
        // Selections are unique by their external `id` field.
        .route(
            "/selectedclasses",
            get(handlers::get_selected_classes).post(handlers::add_selected_class),
        )
        // DELETE /selectedclasses/{id}
        // Removes a selection by its store-generated `_id`.
        .route("/selectedclasses/{id}", delete(handlers::delete_selected_class))
}
