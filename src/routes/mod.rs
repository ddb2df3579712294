/// Router Module Index
///
/// Routes are grouped by the access gate they sit behind. Each gated group wraps its
/// method routes with `require_auth` / `require_admin`, so a handler can only be reached
/// through its group's checks.

/// Routes open to anyone.
pub mod public;

/// Routes behind stage one of the gate (valid bearer token).
pub mod authenticated;

/// Routes behind both stages (valid token, and the caller's user record has `role = "admin"`).
pub mod admin;

/// Path shared by the email check (GET, authenticated) and the promotion (PATCH, admin).
/// The segment is an email for the former and a store `_id` for the latter; both routes
/// must spell the parameter identically or the router rejects them as conflicting.
pub const USER_ADMIN_PATH: &str = "/users/admin/{key}";
