use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, success_response, ValidatedJson};
use crate::{
    auth::AuthUser,
    entities::cart_line,
    errors::ServiceError,
    services::carts::{AddCartLineRequest, CartLineView},
    ApiResponse, AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddCartLineBody {
    pub destination_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    #[schema(value_type = String, format = Date, example = "2026-12-24")]
    pub visit_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineCreated {
    pub id: Uuid,
    pub destination_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String, format = Date)]
    pub visit_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<cart_line::Model> for CartLineCreated {
    fn from(line: cart_line::Model) -> Self {
        Self {
            id: line.id,
            destination_id: line.destination_id,
            quantity: line.quantity,
            visit_date: line.visit_date,
            created_at: line.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "List cart",
    responses(
        (status = 200, description = "Cart lines, oldest first", body = ApiResponse<Vec<CartLineView>>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn list_cart(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<Vec<CartLineView>>>), ServiceError> {
    let lines = state.services.carts.list_lines(&caller).await?;
    Ok(success_response(lines))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart",
    summary = "Add to cart",
    request_body = AddCartLineBody,
    responses(
        (status = 201, description = "Cart line added", body = ApiResponse<CartLineCreated>),
        (status = 400, description = "Bad quantity, past visit date or inactive destination", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 404, description = "Destination not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    caller: AuthUser,
    ValidatedJson(body): ValidatedJson<AddCartLineBody>,
) -> Result<(StatusCode, Json<ApiResponse<CartLineCreated>>), ServiceError> {
    let line = state
        .services
        .carts
        .add_line(
            &caller,
            AddCartLineRequest {
                destination_id: body.destination_id,
                quantity: body.quantity,
                visit_date: body.visit_date,
            },
        )
        .await?;

    Ok(created_response(CartLineCreated::from(line)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/{id}",
    summary = "Remove cart line",
    params(("id" = Uuid, Path, description = "Cart line id")),
    responses(
        (status = 204, description = "Cart line removed"),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such line in the caller's cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.carts.remove_line(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
