use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use validator::Validate;

use crate::{entities::order::PaymentMethod, errors::ServiceError, ApiResponse};

/// JSON body that has been deserialized and passed `Validate`.
///
/// Malformed bodies are reported through the standard error envelope instead of
/// axum's plain-text rejection.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                ServiceError::ValidationError(rejection.body_text())
            })?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Standard success response
pub fn success_response<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Standard created response
pub fn created_response<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// Parses the wire name of a payment method (`qris`, `bca_va`)
pub fn parse_payment_method(raw: &str) -> Result<PaymentMethod, ServiceError> {
    PaymentMethod::from_str(raw.trim()).map_err(|_| {
        ServiceError::ValidationError(format!(
            "payment_method must be one of: qris, bca_va (got '{}')",
            raw
        ))
    })
}
