pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    clock::Clock,
    config::BookingSettings,
    events::EventSender,
    services::{
        carts::CartService,
        checkout::CheckoutService,
        order_status::OrderStatusService,
        orders::OrderQueryService,
        reference_code::{RandomSource, ReferenceCodeGenerator},
    },
};

/// Services shared by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub order_status: Arc<OrderStatusService>,
    pub orders: Arc<OrderQueryService>,
    pub carts: Arc<CartService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: BookingSettings,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let codes = ReferenceCodeGenerator::from_settings(&settings, random);
        Self::with_generator(db, event_sender, settings, clock, codes)
    }

    /// Same as [`AppServices::new`] with a caller-built reference code generator
    pub fn with_generator(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: BookingSettings,
        clock: Arc<dyn Clock>,
        codes: ReferenceCodeGenerator,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                settings,
                codes,
                clock.clone(),
            )),
            order_status: Arc::new(OrderStatusService::new(
                db.clone(),
                event_sender.clone(),
                clock.clone(),
            )),
            orders: Arc::new(OrderQueryService::new(db.clone())),
            carts: Arc::new(CartService::new(db, event_sender, clock)),
        }
    }
}
