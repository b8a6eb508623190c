//! JSON request bodies that reject in the service's error format.

use axum::extract::{rejection::JsonRejection, FromRequest, Request};
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use crate::CommerceError;

/// `Json<T>` whose rejections become a 400 `validation_error` body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, St> FromRequest<St> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    St: Send + Sync,
{
    type Rejection = CommerceError;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(rejected(rejection)),
        }
    }
}

fn rejected(rejection: JsonRejection) -> CommerceError {
    CommerceError::Validation(format!("Invalid request body: {}", rejection.body_text()))
}

/// Body that may be left out entirely; an empty body yields `T::default()`.
pub fn optional<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, CommerceError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| CommerceError::Validation(format!("Invalid request body: {e}")))
}
