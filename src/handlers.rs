use crate::{
    AppState,
    auth::{self, AuthUser},
    config::AppConfig,
    error::{ApiError, ErrorBody},
    models::{AdminStatus, Document, InsertResult, MessageResponse, PromoteResponse, TokenResponse},
    repository::InsertOutcome,
};
use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use uuid::Uuid;

// Store identifiers that do not parse can't match any record.
fn parse_store_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

// --- Public Routes ---

/// root
///
/// [Public Route] Plain-text banner, doubles as a liveness probe.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner", body = String))
)]
pub async fn root() -> &'static str {
    "time-tune"
}

/// issue_jwt
///
/// [Public Route] Token Issuer. Signs the posted JSON object as the claims of a token
/// valid for one hour.
///
/// *Note*: the payload (normally `{"email": ...}`) is not verified against any credential.
#[utoipa::path(
    post,
    path = "/jwt",
    request_body = std::collections::HashMap<String, serde_json::Value>,
    responses((status = 200, description = "Signed token", body = TokenResponse))
)]
pub async fn issue_jwt(
    State(config): State<AppConfig>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = auth::issue_token(payload, &config.jwt_secret)?;
    Ok(Json(TokenResponse { token }))
}

/// get_info
///
/// [Public Route] Lists every record of the `info` collection.
#[utoipa::path(
    get,
    path = "/info",
    responses(
        (status = 200, description = "Info records", body = [Document]),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn get_info(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    let info = state
        .repo
        .list_info()
        .await
        .map_err(|e| ApiError::store("Failed to fetch info", e))?;
    Ok(Json(info))
}

/// create_user
///
/// [Public Route] Self-registration. The body is stored as-is, except that the store
/// assigns `_id` and a client-supplied `role` is dropped (roles are granted only through
/// the admin promotion route).
///
/// *Uniqueness*: a second registration with the same email is answered with
/// `{"message": "User already exists"}` (200) and writes nothing.
#[utoipa::path(
    post,
    path = "/users",
    request_body = std::collections::HashMap<String, serde_json::Value>,
    responses(
        (status = 200, description = "Inserted, or already exists", body = InsertResult),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut user): Json<Map<String, Value>>,
) -> Result<Response, ApiError> {
    user.remove("_id");
    if user.remove("role").is_some() {
        tracing::warn!("ignored role supplied at registration");
    }

    match state
        .repo
        .insert_user(user)
        .await
        .map_err(|e| ApiError::store("Failed to add user", e))?
    {
        InsertOutcome::Inserted(id) => Ok(Json(InsertResult::acknowledged(id)).into_response()),
        InsertOutcome::Duplicate => {
            Ok(Json(MessageResponse::new("User already exists")).into_response())
        }
    }
}

/// add_selected_class
///
/// [Public Route] Records a class selection. The client's own `id` field is the
/// collection's unique key; `_id` is assigned by the store.
#[utoipa::path(
    post,
    path = "/selectedclasses",
    request_body = std::collections::HashMap<String, serde_json::Value>,
    responses(
        (status = 200, description = "Inserted", body = InsertResult),
        (status = 400, description = "Class already selected", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn add_selected_class(
    State(state): State<AppState>,
    Json(mut class): Json<Map<String, Value>>,
) -> Result<Json<InsertResult>, ApiError> {
    class.remove("_id");

    match state
        .repo
        .insert_selected_class(class)
        .await
        .map_err(|e| ApiError::store("Failed to add class", e))?
    {
        InsertOutcome::Inserted(id) => Ok(Json(InsertResult::acknowledged(id))),
        InsertOutcome::Duplicate => Err(ApiError::Duplicate("Class already selected")),
    }
}

/// get_selected_classes
///
/// [Public Route] Lists every selection record.
#[utoipa::path(
    get,
    path = "/selectedclasses",
    responses(
        (status = 200, description = "Selections", body = [Document]),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn get_selected_classes(
    State(state): State<AppState>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let classes = state
        .repo
        .list_selected_classes()
        .await
        .map_err(|e| ApiError::store("Failed to fetch classes", e))?;
    Ok(Json(classes))
}

/// delete_selected_class
///
/// [Public Route] Removes a selection by its store-generated `_id`.
#[utoipa::path(
    delete,
    path = "/selectedclasses/{id}",
    params(("id" = String, Path, description = "Store-generated identifier (_id)")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Class not found", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn delete_selected_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_store_id(&id).ok_or(ApiError::NotFound("Class not found"))?;

    let deleted = state
        .repo
        .delete_selected_class(id)
        .await
        .map_err(|e| ApiError::store("Failed to delete class", e))?;

    if deleted == 0 {
        return Err(ApiError::NotFound("Class not found"));
    }
    Ok(Json(MessageResponse::new("Class deleted successfully")))
}

// --- Authenticated Routes ---

/// check_admin
///
/// [Authenticated Route] Tells the caller whether *they* are an admin. Asking about any
/// other email answers `{"admin": false}` straight away, without touching the store.
#[utoipa::path(
    get,
    path = "/users/admin/{email}",
    params(("email" = String, Path, description = "Email to check; must be the caller's")),
    responses(
        (status = 200, description = "Admin status", body = AdminStatus),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn check_admin(
    AuthUser { claims }: AuthUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<AdminStatus>, ApiError> {
    if claims.email.as_deref() != Some(email.as_str()) {
        return Ok(Json(AdminStatus { admin: false }));
    }

    let user = state
        .repo
        .find_user_by_email(&email)
        .await
        .map_err(|e| ApiError::store("Failed to check admin status", e))?;

    Ok(Json(AdminStatus {
        admin: user.is_some_and(|user| user.is_admin()),
    }))
}

// --- Admin Routes ---

/// get_users
///
/// [Admin Route] Lists every user record.
///
/// *Authorization*: reachable only through the auth + admin route layers.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Users", body = [Document]),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn get_users(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    let users = state
        .repo
        .list_users()
        .await
        .map_err(|e| ApiError::store("Failed to fetch users", e))?;
    Ok(Json(users))
}

/// promote_user
///
/// [Admin Route] Grants the `admin` role to the user with the given `_id`.
///
/// Unknown ids and users who already are admins both answer 404: nothing was modified.
#[utoipa::path(
    patch,
    path = "/users/admin/{id}",
    params(("id" = String, Path, description = "Store-generated identifier (_id)")),
    responses(
        (status = 200, description = "Promoted", body = PromoteResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "User not found or already an admin", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    ),
    security(("bearer" = []))
)]
pub async fn promote_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PromoteResponse>, ApiError> {
    const NOT_FOUND: &str = "User not found or already an admin";

    let id = parse_store_id(&id).ok_or(ApiError::NotFound(NOT_FOUND))?;

    let modified_count = state
        .repo
        .promote_user(id)
        .await
        .map_err(|e| ApiError::store("Failed to update user", e))?;

    if modified_count == 0 {
        return Err(ApiError::NotFound(NOT_FOUND));
    }

    tracing::info!(user_id = %id, "user promoted to admin");
    Ok(Json(PromoteResponse {
        message: "User updated to admin successfully".to_string(),
        modified_count,
    }))
}
