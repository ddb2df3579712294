use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Map, Value, json};
use std::{sync::Arc, time::SystemTime};
use tune_time::{
    ApiError, AppState,
    auth::{AdminUser, AuthUser, issue_token},
    config::AppConfig,
    repository::{Collection, MemoryRepository, Repository},
};

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_EMAIL: &str = "student@tunetime.test";

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("test fixture must be a JSON object"),
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Signs claims directly, so tests control `exp` and the key.
fn create_token(email: &str, exp: i64, secret: &str) -> String {
    let claims = json!({ "email": email, "iat": now(), "exp": exp });
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_app_state(repo: MemoryRepository) -> AppState {
    let mut config = AppConfig::default();
    config.jwt_secret = TEST_JWT_SECRET.to_string();

    AppState {
        repo: Arc::new(repo),
        config,
    }
}

/// Request parts carrying the given `Authorization` value, if any.
fn get_request_parts(authorization: Option<&str>) -> Parts {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri("/users".parse::<Uri>().unwrap());
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let (parts, _) = builder.body(axum::body::Body::empty()).unwrap().into_parts();
    parts
}

async fn repo_with_user(email: &str, role: Option<&str>) -> MemoryRepository {
    let repo = MemoryRepository::new();
    let mut user = fields(json!({ "email": email, "name": "Test User" }));
    if let Some(role) = role {
        user.insert("role".into(), Value::from(role));
    }
    repo.seed(Collection::Users, user).await;
    repo
}

// --- Stage one: AuthUser ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let state = create_app_state(MemoryRepository::new());
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(user.claims.email.as_deref(), Some(TEST_EMAIL));
}

#[tokio::test]
async fn test_auth_accepts_token_issued_by_server() {
    let state = create_app_state(MemoryRepository::new());
    let token = issue_token(fields(json!({ "email": TEST_EMAIL })), TEST_JWT_SECRET).unwrap();
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(user.claims.email.as_deref(), Some(TEST_EMAIL));
}

#[tokio::test]
async fn test_auth_ignores_scheme() {
    let state = create_app_state(MemoryRepository::new());
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("whatever {}", token)));

    assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_ok());
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let state = create_app_state(MemoryRepository::new());
    let mut parts = get_request_parts(None);

    let result = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_header_without_token() {
    let state = create_app_state(MemoryRepository::new());
    let mut parts = get_request_parts(Some("Bearer"));

    let result = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_foreign_secret() {
    let state = create_app_state(MemoryRepository::new());
    let token = create_token(TEST_EMAIL, now() + 3600, "some-other-secret");
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let state = create_app_state(MemoryRepository::new());
    // Well past the validation leeway.
    let token = create_token(TEST_EMAIL, now() - 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_right_after_expiry() {
    let state = create_app_state(MemoryRepository::new());
    // Expired seconds ago: no grace window.
    let token = create_token(TEST_EMAIL, now() - 5, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_garbage_token() {
    let state = create_app_state(MemoryRepository::new());
    let mut parts = get_request_parts(Some("Bearer not.a.token"));

    let result = AuthUser::from_request_parts(&mut parts, &state).await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "unauthorized access");
}

// --- Stage two: AdminUser ---

#[tokio::test]
async fn test_admin_success_for_admin_role() {
    let state = create_app_state(repo_with_user(TEST_EMAIL, Some("admin")).await);
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let admin = AdminUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(admin.user.email(), Some(TEST_EMAIL));
    assert!(admin.user.is_admin());
}

#[tokio::test]
async fn test_admin_forbidden_for_other_role() {
    let state = create_app_state(repo_with_user(TEST_EMAIL, Some("student")).await);
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    let err = result.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));
    assert_eq!(err.to_string(), "Forbidden access");
}

#[tokio::test]
async fn test_admin_forbidden_without_role() {
    let state = create_app_state(repo_with_user(TEST_EMAIL, None).await);
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Forbidden)));
}

#[tokio::test]
async fn test_admin_forbidden_for_unknown_user() {
    let state = create_app_state(repo_with_user("someone-else@tunetime.test", Some("admin")).await);
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Forbidden)));
}

#[tokio::test]
async fn test_admin_forbidden_without_email_claim() {
    let state = create_app_state(MemoryRepository::new());
    let token = issue_token(fields(json!({ "name": "anonymous" })), TEST_JWT_SECRET).unwrap();
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Forbidden)));
}

#[tokio::test]
async fn test_admin_forbidden_with_non_string_email_claim() {
    let state = create_app_state(repo_with_user(TEST_EMAIL, Some("admin")).await);
    let token = issue_token(fields(json!({ "email": 5 })), TEST_JWT_SECRET).unwrap();
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    // The token itself is valid; only the identity is unusable.
    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(user.claims.email, None);

    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));
    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Forbidden)));
}

#[tokio::test]
async fn test_admin_unauthorized_before_lookup() {
    // A failing store would answer 500; stage one must reject first.
    let state = create_app_state(MemoryRepository::new_failing());
    let mut parts = get_request_parts(None);

    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_admin_store_failure_is_internal_error() {
    let state = create_app_state(MemoryRepository::new_failing());
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Some(&format!("Bearer {}", token)));

    let result = AdminUser::from_request_parts(&mut parts, &state).await;

    assert_eq!(result.unwrap_err().status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_admin_role_is_read_fresh_each_request() {
    let repo = Arc::new(repo_with_user(TEST_EMAIL, Some("student")).await);
    let mut config = AppConfig::default();
    config.jwt_secret = TEST_JWT_SECRET.to_string();
    let state = AppState {
        repo: repo.clone(),
        config,
    };
    let token = create_token(TEST_EMAIL, now() + 3600, TEST_JWT_SECRET);
    let authorization = format!("Bearer {}", token);

    let mut parts = get_request_parts(Some(&authorization));
    assert!(AdminUser::from_request_parts(&mut parts, &state).await.is_err());

    // Promote the same record; the unchanged token is now accepted.
    let user = repo.find_user_by_email(TEST_EMAIL).await.unwrap().unwrap();
    assert_eq!(repo.promote_user(user.id).await.unwrap(), 1);

    let mut parts = get_request_parts(Some(&authorization));
    assert!(AdminUser::from_request_parts(&mut parts, &state).await.is_ok());
}
