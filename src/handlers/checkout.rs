use axum::{extract::State, http::StatusCode, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, parse_payment_method, success_response, ValidatedJson};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::{
        checkout::{BuyNowRequest, CheckoutRequest, OrderReceipt},
        orders::OrderView,
    },
    ApiResponse, AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutBody {
    /// `qris` or `bca_va`
    #[schema(example = "bca_va")]
    pub payment_method: String,
    /// Cart line ids to convert into one order
    #[validate(length(min = 1, message = "select at least one cart line"))]
    pub cart_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BuyNowBody {
    pub destination_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    #[schema(value_type = String, format = Date, example = "2026-12-24")]
    pub visit_date: NaiveDate,
    #[schema(example = "qris")]
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentBody {
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "TL7QK2ZD")]
    pub reference_code: String,
}

/// Convert selected cart lines into an order
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Checkout cart lines",
    description = "Atomically converts the caller's selected cart lines into one order with frozen prices. The lines are removed from the cart.",
    request_body = CheckoutBody,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderReceipt>),
        (status = 400, description = "Empty or invalid selection, or unknown payment method", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reference code could not be allocated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    caller: AuthUser,
    ValidatedJson(body): ValidatedJson<CheckoutBody>,
) -> Result<(StatusCode, Json<ApiResponse<OrderReceipt>>), ServiceError> {
    let payment_method = parse_payment_method(&body.payment_method)?;
    let receipt = state
        .services
        .checkout
        .checkout_from_cart(
            &caller,
            CheckoutRequest {
                payment_method,
                cart_line_ids: body.cart_ids,
            },
        )
        .await?;

    Ok(created_response(receipt))
}

/// Book a single destination without touching the cart
#[utoipa::path(
    post,
    path = "/api/v1/buy-now",
    summary = "Buy now",
    request_body = BuyNowBody,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderReceipt>),
        (status = 400, description = "Bad quantity, past visit date, inactive destination or unknown payment method", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 404, description = "Destination not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Checkout"
)]
pub async fn buy_now(
    State(state): State<AppState>,
    caller: AuthUser,
    ValidatedJson(body): ValidatedJson<BuyNowBody>,
) -> Result<(StatusCode, Json<ApiResponse<OrderReceipt>>), ServiceError> {
    let payment_method = parse_payment_method(&body.payment_method)?;
    let receipt = state
        .services
        .checkout
        .buy_now(
            &caller,
            BuyNowRequest {
                destination_id: body.destination_id,
                quantity: body.quantity,
                visit_date: body.visit_date,
                payment_method,
            },
        )
        .await?;

    Ok(created_response(receipt))
}

/// Simulated payment confirmation
#[utoipa::path(
    post,
    path = "/api/v1/payments/confirm",
    summary = "Confirm payment",
    description = "Marks a pending order as paid. Only the order owner may confirm.",
    request_body = ConfirmPaymentBody,
    responses(
        (status = 200, description = "Order paid", body = ApiResponse<OrderView>),
        (status = 400, description = "Order already paid or not payable", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller does not own the order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown reference code", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    caller: AuthUser,
    ValidatedJson(body): ValidatedJson<ConfirmPaymentBody>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ServiceError> {
    let order = state
        .services
        .order_status
        .confirm_payment(body.reference_code.trim(), &caller)
        .await?;

    Ok(success_response(order))
}
