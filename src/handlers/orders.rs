use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::str::FromStr;
use utoipa::IntoParams;

use super::common::success_response;
use crate::{
    auth::AuthUser,
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::{AdminOrderFilter, OrderView},
    ApiResponse, AppState,
};

/// Admin listing filters; dates are inclusive calendar days
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminOrdersParams {
    /// `pending`, `success` or `failed`
    pub status: Option<String>,
    #[param(value_type = Option<String>, format = Date)]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = Date)]
    pub end_date: Option<NaiveDate>,
}

impl AdminOrdersParams {
    fn into_filter(self) -> Result<AdminOrderFilter, ServiceError> {
        let status = self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                OrderStatus::from_str(s).map_err(|_| {
                    ServiceError::ValidationError(format!(
                        "status must be one of: pending, success, failed (got '{}')",
                        s
                    ))
                })
            })
            .transpose()?;

        Ok(AdminOrderFilter {
            status,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

/// Orders owned by the caller
#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    summary = "My orders",
    description = "Orders owned by the caller, newest first, with lines and destination info.",
    responses(
        (status = 200, description = "Orders", body = ApiResponse<Vec<OrderView>>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<(StatusCode, Json<ApiResponse<Vec<OrderView>>>), ServiceError> {
    let orders = state.services.orders.list_mine(&caller).await?;
    Ok(success_response(orders))
}

/// Order detail by reference code
#[utoipa::path(
    get,
    path = "/api/v1/orders/{reference_code}",
    summary = "Get order",
    params(("reference_code" = String, Path, description = "Order reference code")),
    responses(
        (status = 200, description = "Order with lines and owner summary", body = ApiResponse<OrderView>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is neither owner nor admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown reference code", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(reference_code): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ServiceError> {
    let order = state
        .services
        .orders
        .get_by_reference(&reference_code, &caller)
        .await?;
    Ok(success_response(order))
}

/// Admin report listing
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List all orders (admin)",
    params(AdminOrdersParams),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<Vec<OrderView>>),
        (status = 400, description = "Invalid status or date range", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn admin_list_orders(
    State(state): State<AppState>,
    caller: AuthUser,
    params: Result<Query<AdminOrdersParams>, QueryRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<OrderView>>>), ServiceError> {
    let Query(params) =
        params.map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
    let filter = params.into_filter()?;

    let orders = state.services.orders.admin_list(&caller, filter).await?;
    Ok(success_response(orders))
}
