//! Caller identity forwarded by the auth gateway.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;
use crate::service::{Actor, Role};
use crate::CommerceError;

pub const USER_ID: &str = "x-user-id";
pub const USER_ROLE: &str = "x-user-role";
pub const USERNAME: &str = "x-username";

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for Actor {
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());

        let id = header(USER_ID).and_then(|v| Uuid::parse_str(v).ok()).ok_or(CommerceError::Unauthorized)?;
        let role = match header(USER_ROLE) {
            Some("customer") => Role::Customer,
            Some("merchant") => Role::Merchant,
            _ => return Err(CommerceError::Unauthorized),
        };
        let username = header(USERNAME).unwrap_or_default().to_string();
        let username = if username.is_empty() { id.to_string() } else { username };
        Ok(Actor { id, role, username })
    }
}
