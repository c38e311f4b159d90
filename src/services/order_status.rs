use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};

use crate::{
    auth::{guard, AuthUser},
    clock::Clock,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{assemble_views, OrderView},
};

/// Drives orders through `pending -> success` (and the reserved `pending -> failed`)
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            event_sender,
            clock,
        }
    }

    /// Simulated payment confirmation by the order owner.
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn confirm_payment(
        &self,
        reference_code: &str,
        caller: &AuthUser,
    ) -> Result<OrderView, ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find()
            .filter(order::Column::ReferenceCode.eq(reference_code))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference_code)))?;

        if order.status == OrderStatus::Success {
            return Err(ServiceError::AlreadyPaid(format!(
                "Order {} has already been paid",
                reference_code
            )));
        }

        guard::ensure_can_mutate(order.user_id, caller)?;

        let paid_at = self.clock.now();
        let updated = self
            .transition(&order, OrderStatus::Success, Some(paid_at))
            .await?;

        counter!("tiketloka.payments.confirmed", 1);
        info!(
            reference_code = %updated.reference_code,
            order_id = %updated.id,
            "Payment confirmed"
        );

        self.event_sender
            .send_or_log(Event::PaymentConfirmed {
                order_id: updated.id,
                reference_code: updated.reference_code.clone(),
                paid_at,
            });

        assemble_views(db, vec![updated], false)
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order view assembly returned nothing".into()))
    }

    /// Conditional status update guarded by the transition table. The `WHERE
    /// status = <current>` clause makes a lost race visible as zero rows.
    async fn transition(
        &self,
        order: &OrderModel,
        next: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<OrderModel, ServiceError> {
        if !order.status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order {} from {} to {}",
                order.reference_code, order.status, next
            )));
        }

        let changes = order::ActiveModel {
            status: Set(next),
            paid_at: Set(paid_at.or(order.paid_at)),
            ..Default::default()
        };

        let result = OrderEntity::update_many()
            .set(changes)
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(order.status))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                reference_code = %order.reference_code,
                "Order changed status concurrently"
            );
            return Err(match next {
                OrderStatus::Success => ServiceError::AlreadyPaid(format!(
                    "Order {} has already been paid",
                    order.reference_code
                )),
                _ => ServiceError::Conflict(format!(
                    "Order {} changed status concurrently",
                    order.reference_code
                )),
            });
        }

        Ok(OrderModel {
            status: next,
            paid_at: paid_at.or(order.paid_at),
            ..order.clone()
        })
    }
}
