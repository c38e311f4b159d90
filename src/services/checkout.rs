//! Cart-to-order conversion.
//!
//! Both entry points run as one database transaction: the cart lines are claimed
//! (deleted) first, prices are snapshotted, the header is inserted under a unique
//! reference code and the lines follow. Any failure rolls everything back.

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    clock::Clock,
    config::{BookingSettings, CheckoutFlow},
    entities::{
        cart_line,
        order::{self, OrderStatus, PaymentMethod},
        order_line, user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        orders::{assemble_views, OrderView},
        payment_instructions::{self, PaymentInstructions},
        pricing::{self, PriceSnapshot},
        reference_code::ReferenceCodeGenerator,
    },
};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    pub cart_line_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct BuyNowRequest {
    pub destination_id: Uuid,
    pub quantity: i32,
    pub visit_date: NaiveDate,
    pub payment_method: PaymentMethod,
}

/// Result of a successful checkout
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderReceipt {
    pub reference_code: String,
    pub grand_total: Decimal,
    /// Present only while the order awaits payment
    pub payment_instructions: Option<PaymentInstructions>,
    pub order: OrderView,
}

/// One line about to be written, with its frozen price
#[derive(Debug, Clone)]
struct PricedLine {
    snapshot: PriceSnapshot,
    visit_date: NaiveDate,
}

/// Deletes the lines about to be ordered. A concurrent checkout that got there
/// first leaves fewer deletions than lines read.
async fn claim_lines<C>(
    conn: &C,
    user_id: Uuid,
    lines: &[cart_line::Model],
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let line_ids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
    let claimed = cart_line::Entity::delete_many()
        .filter(cart_line::Column::UserId.eq(user_id))
        .filter(cart_line::Column::Id.is_in(line_ids))
        .exec(conn)
        .await?;
    if claimed.rows_affected != lines.len() as u64 {
        counter!("tiketloka.checkout.lost_claims", 1);
        return Err(ServiceError::InvalidSelection(
            "Selected cart lines were already checked out".to_string(),
        ));
    }
    Ok(())
}

/// Commits on `Ok`, rolls back on `Err`
async fn finish_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            counter!("tiketloka.checkout.transactions", 1, "outcome" => "committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed checkout also failed");
            }
            counter!("tiketloka.checkout.transactions", 1, "outcome" => "rolled_back");
            Err(err)
        }
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    settings: Arc<BookingSettings>,
    codes: ReferenceCodeGenerator,
    clock: Arc<dyn Clock>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: Arc<BookingSettings>,
        codes: ReferenceCodeGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            event_sender,
            settings,
            codes,
            clock,
        }
    }

    /// Converts the caller's selected cart lines into one order.
    ///
    /// Every requested id must name a line the caller still owns; a foreign or
    /// already consumed id rejects the whole selection.
    #[instrument(skip(self, request), fields(user_id = %caller.user_id, requested = request.cart_line_ids.len()))]
    pub async fn checkout_from_cart(
        &self,
        caller: &AuthUser,
        request: CheckoutRequest,
    ) -> Result<OrderReceipt, ServiceError> {
        let mut ids = request.cart_line_ids;
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Err(ServiceError::InvalidSelection(
                "Select at least one cart line".to_string(),
            ));
        }
        let method = request.payment_method;

        let (receipt, line_count) =
            crate::tracing::with_metrics("checkout_from_cart", move || async move {
                let txn = self.db.begin().await?;
                let result = self.assemble_from_cart(&txn, caller, ids, method).await;
                finish_transaction(txn, result).await
            })
            .await?;

        self.publish_order_placed(caller, &receipt, line_count, "cart");
        Ok(receipt)
    }

    /// Books a single destination directly, leaving the cart alone.
    #[instrument(skip(self, request), fields(user_id = %caller.user_id, destination_id = %request.destination_id))]
    pub async fn buy_now(
        &self,
        caller: &AuthUser,
        request: BuyNowRequest,
    ) -> Result<OrderReceipt, ServiceError> {
        if request.quantity < 1 {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity must be at least 1, got {}",
                request.quantity
            )));
        }
        let today = self.clock.today();
        if request.visit_date < today {
            return Err(ServiceError::InvalidInput(format!(
                "Visit date {} is in the past (today is {})",
                request.visit_date, today
            )));
        }

        let (receipt, line_count) = crate::tracing::with_metrics("buy_now", move || async move {
            let txn = self.db.begin().await?;
            let result = self.assemble_direct(&txn, caller, &request).await;
            finish_transaction(txn, result).await
        })
        .await?;

        self.publish_order_placed(caller, &receipt, line_count, "buy_now");
        Ok(receipt)
    }

    async fn assemble_from_cart(
        &self,
        txn: &DatabaseTransaction,
        caller: &AuthUser,
        ids: Vec<Uuid>,
        method: PaymentMethod,
    ) -> Result<(OrderReceipt, usize), ServiceError> {
        let payer = self.load_payer(txn, caller).await?;

        let lines = cart_line::Entity::find()
            .filter(cart_line::Column::UserId.eq(caller.user_id))
            .filter(cart_line::Column::Id.is_in(ids.clone()))
            .order_by_asc(cart_line::Column::CreatedAt)
            .all(txn)
            .await?;

        if lines.len() != ids.len() {
            warn!(
                requested = ids.len(),
                resolved = lines.len(),
                "Rejecting selection with unavailable cart lines"
            );
            return Err(ServiceError::InvalidSelection(
                "Some selected cart lines do not exist or do not belong to you".to_string(),
            ));
        }

        claim_lines(txn, caller.user_id, &lines).await?;

        let pairs: Vec<(Uuid, i32)> = lines
            .iter()
            .map(|l| (l.destination_id, l.quantity))
            .collect();
        let snapshots = pricing::resolve_many(txn, &pairs).await?;

        let priced = snapshots
            .into_iter()
            .zip(lines.iter())
            .map(|(snapshot, line)| PricedLine {
                snapshot,
                visit_date: line.visit_date,
            })
            .collect();

        self.persist_order(txn, &payer, method, priced).await
    }

    async fn assemble_direct(
        &self,
        txn: &DatabaseTransaction,
        caller: &AuthUser,
        request: &BuyNowRequest,
    ) -> Result<(OrderReceipt, usize), ServiceError> {
        let payer = self.load_payer(txn, caller).await?;
        let snapshot = pricing::resolve(txn, request.destination_id, request.quantity).await?;

        self.persist_order(
            txn,
            &payer,
            request.payment_method,
            vec![PricedLine {
                snapshot,
                visit_date: request.visit_date,
            }],
        )
        .await
    }

    async fn load_payer(
        &self,
        txn: &DatabaseTransaction,
        caller: &AuthUser,
    ) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(caller.user_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Unknown user".to_string()))
    }

    /// Initial status and payment time for the configured flow
    fn initial_state(&self, now: DateTime<Utc>) -> (OrderStatus, Option<DateTime<Utc>>) {
        match self.settings.checkout_flow {
            CheckoutFlow::RequireConfirmation => (OrderStatus::Pending, None),
            CheckoutFlow::AutoConfirm => (OrderStatus::Success, Some(now)),
        }
    }

    async fn persist_order(
        &self,
        txn: &DatabaseTransaction,
        payer: &user::Model,
        method: PaymentMethod,
        lines: Vec<PricedLine>,
    ) -> Result<(OrderReceipt, usize), ServiceError> {
        let now = self.clock.now();
        let snapshots: Vec<PriceSnapshot> = lines.iter().map(|l| l.snapshot.clone()).collect();
        let grand_total = pricing::grand_total(&snapshots);
        let (status, paid_at) = self.initial_state(now);
        let order_id = Uuid::new_v4();
        let user_id = payer.id;

        let header = self
            .codes
            .insert_order_header(txn, now, |reference_code| order::ActiveModel {
                id: Set(order_id),
                user_id: Set(user_id),
                reference_code: Set(reference_code),
                grand_total: Set(grand_total),
                status: Set(status),
                payment_method: Set(method),
                paid_at: Set(paid_at),
                created_at: Set(now),
            })
            .await?;

        let line_count = lines.len();
        let rows: Vec<order_line::ActiveModel> = lines
            .into_iter()
            .map(|line| order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(header.id),
                destination_id: Set(line.snapshot.destination_id),
                quantity: Set(line.snapshot.quantity),
                unit_price: Set(line.snapshot.unit_price),
                subtotal: Set(line.snapshot.subtotal),
                visit_date: Set(line.visit_date),
            })
            .collect();
        order_line::Entity::insert_many(rows)
            .exec_without_returning(txn)
            .await?;

        let payment_instructions = (header.status == OrderStatus::Pending).then(|| {
            payment_instructions::synthesize(
                method,
                &header,
                payer.phone_number.as_deref(),
                &self.settings,
            )
        });

        let order = assemble_views(txn, vec![header.clone()], false)
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order view assembly returned nothing".into()))?;

        Ok((
            OrderReceipt {
                reference_code: header.reference_code,
                grand_total: header.grand_total,
                payment_instructions,
                order,
            },
            line_count,
        ))
    }

    fn publish_order_placed(
        &self,
        caller: &AuthUser,
        receipt: &OrderReceipt,
        line_count: usize,
        source: &'static str,
    ) {
        counter!("tiketloka.orders.placed", 1, "source" => source);
        info!(
            reference_code = %receipt.reference_code,
            user_id = %caller.user_id,
            grand_total = %receipt.grand_total,
            status = %receipt.order.status,
            "Order placed"
        );

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: receipt.order.id,
                reference_code: receipt.reference_code.clone(),
                user_id: caller.user_id,
                grand_total: receipt.grand_total,
                payment_method: receipt.order.payment_method,
                status: receipt.order.status,
                line_count,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use sea_orm::ActiveModelTrait;

    use crate::{
        db::{self, DbConfig},
        entities::{destination, user::UserRole},
    };

    async fn seeded_line() -> (DatabaseConnection, cart_line::Model) {
        let conn = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .unwrap();
        db::run_migrations(&conn).await.unwrap();
        let now = Utc::now();

        let owner = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Sari".to_string()),
            email: Set("sari@example.com".to_string()),
            phone_number: Set(None),
            role: Set(UserRole::Customer),
            created_at: Set(now),
        }
        .insert(&conn)
        .await
        .unwrap();
        let place = destination::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Pantai Kuta".to_string()),
            slug: Set("pantai-kuta".to_string()),
            location: Set("Badung".to_string()),
            price: Set(dec!(50000)),
            is_active: Set(true),
            created_at: Set(now),
        }
        .insert(&conn)
        .await
        .unwrap();
        let line = cart_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner.id),
            destination_id: Set(place.id),
            quantity: Set(2),
            visit_date: Set(now.date_naive()),
            created_at: Set(now),
        }
        .insert(&conn)
        .await
        .unwrap();

        (conn, line)
    }

    #[tokio::test]
    async fn claim_takes_lines_that_are_still_there() {
        let (conn, line) = seeded_line().await;

        claim_lines(&conn, line.user_id, std::slice::from_ref(&line))
            .await
            .unwrap();

        assert!(cart_line::Entity::find_by_id(line.id)
            .one(&conn)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn claim_fails_when_lines_vanish_after_being_read() {
        let (conn, line) = seeded_line().await;
        // Another checkout deletes the row between our read and our claim
        cart_line::Entity::delete_by_id(line.id)
            .exec(&conn)
            .await
            .unwrap();

        let result = claim_lines(&conn, line.user_id, std::slice::from_ref(&line)).await;

        assert_matches!(result, Err(ServiceError::InvalidSelection(_)));
    }

    #[tokio::test]
    async fn claim_ignores_lines_of_other_users() {
        let (conn, line) = seeded_line().await;

        let result = claim_lines(&conn, Uuid::new_v4(), std::slice::from_ref(&line)).await;

        assert_matches!(result, Err(ServiceError::InvalidSelection(_)));
        assert!(cart_line::Entity::find_by_id(line.id)
            .one(&conn)
            .await
            .unwrap()
            .is_some());
    }
}
