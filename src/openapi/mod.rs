use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the `Bearer` JWT scheme referenced by every protected path
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TiketLoka API",
        version = "1.0.0",
        description = r#"
# TiketLoka booking API

Tourism ticket booking: carts, checkout, direct purchase, simulated payment and
order lookups.

## Authentication

Every endpoint except health and status requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Failures share one envelope:

```json
{
  "error": "Bad Request",
  "message": "Invalid selection: No valid cart lines were selected",
  "request_id": "b7f3c1d2-...",
  "timestamp": "2026-03-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Cart management"),
        (name = "Checkout", description = "Cart checkout and direct purchase"),
        (name = "Payments", description = "Simulated payment confirmation"),
        (name = "Orders", description = "Order lookups"),
        (name = "Admin", description = "Administrative reports"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Cart
        crate::handlers::carts::list_cart,
        crate::handlers::carts::add_to_cart,
        crate::handlers::carts::remove_from_cart,

        // Checkout & payments
        crate::handlers::checkout::checkout,
        crate::handlers::checkout::buy_now,
        crate::handlers::checkout::confirm_payment,

        // Orders
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::admin_list_orders,

        // Health
        crate::health_check,
        crate::api_status,
    ),
    components(
        schemas(
            crate::handlers::checkout::CheckoutBody,
            crate::handlers::checkout::BuyNowBody,
            crate::handlers::checkout::ConfirmPaymentBody,
            crate::handlers::carts::AddCartLineBody,
            crate::handlers::carts::CartLineCreated,
            crate::services::checkout::OrderReceipt,
            crate::services::payment_instructions::PaymentInstructions,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,
            crate::services::orders::DestinationSummary,
            crate::services::orders::OwnerSummary,
            crate::services::carts::CartLineView,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
