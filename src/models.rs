use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Stored Documents ---

/// Document
///
/// A loosely-typed record read back from one of the collections (`info`, `users`,
/// `selectedclasses`). The schema is a convention of the frontend, not something the
/// store validates: everything except the store-generated identifier is kept as raw JSON.
///
/// Serialized flat, with the identifier under `_id`:
/// `{"_id": "…", "email": "a@b.com", "role": "admin"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Document {
    /// Store-generated identifier, used by the update/delete-by-id routes.
    #[serde(rename = "_id")]
    pub id: Uuid,

    /// The caller-supplied fields, passed through untouched.
    #[serde(flatten)]
    #[schema(value_type = std::collections::HashMap<String, serde_json::Value>)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Wraps a field set with a freshly generated store identifier.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fields,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.fields.get("email").and_then(Value::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.fields.get("role").and_then(Value::as_str)
    }

    /// True when the record's `role` is exactly `"admin"`.
    pub fn is_admin(&self) -> bool {
        self.role() == Some(ADMIN_ROLE)
    }
}

/// The only role value that grants elevated access.
pub const ADMIN_ROLE: &str = "admin";

// --- Response Payloads (Output Schemas) ---

/// InsertResult
///
/// Acknowledgement for a successful insert (POST /users, POST /selectedclasses).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InsertResult {
    pub acknowledged: bool,
    /// The store-generated identifier of the new record.
    pub inserted_id: Uuid,
}

impl InsertResult {
    pub fn acknowledged(inserted_id: Uuid) -> Self {
        Self {
            acknowledged: true,
            inserted_id,
        }
    }
}

/// TokenResponse
///
/// Output of the token issuer (POST /jwt).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    /// Signed HS256 token, valid for one hour.
    pub token: String,
}

/// MessageResponse
///
/// Plain acknowledgement used by the non-error "already exists" and delete responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// AdminStatus
///
/// Output of the email-ownership admin check (GET /users/admin/{email}).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminStatus {
    pub admin: bool,
}

/// PromoteResponse
///
/// Output of a successful promotion (PATCH /users/admin/{id}).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PromoteResponse {
    pub message: String,
    // Always 1 on success; zero-modification outcomes are answered with 404.
    pub modified_count: u64,
}
