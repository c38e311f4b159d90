use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{guard, AuthUser},
    entities::{
        destination,
        order::{self, OrderStatus, PaymentMethod},
        order_line, user,
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DestinationSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub location: String,
}

impl From<&destination::Model> for DestinationSummary {
    fn from(d: &destination::Model) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            slug: d.slug.clone(),
            location: d.location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderLineView {
    pub id: Uuid,
    pub destination_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub visit_date: NaiveDate,
    /// Display data; the frozen price above is authoritative
    pub destination: Option<DestinationSummary>,
}

/// Order header with its lines and display data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub reference_code: String,
    pub user_id: Uuid,
    pub grand_total: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
}

/// Admin listing filter. Date bounds are inclusive calendar days (UTC).
#[derive(Debug, Clone, Default)]
pub struct AdminOrderFilter {
    pub status: Option<OrderStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AdminOrderFilter {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ServiceError::InvalidInput(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// `[start 00:00, (end + 1 day) 00:00)`
    fn created_at_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let lower = self
            .start_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        let upper = self
            .end_date
            .and_then(|d| d.checked_add_signed(Duration::days(1)))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        (lower, upper)
    }
}

/// Builds views for `orders` with batched lookups, preserving input order.
pub async fn assemble_views<C>(
    conn: &C,
    orders: Vec<order::Model>,
    include_owner: bool,
) -> Result<Vec<OrderView>, ServiceError>
where
    C: ConnectionTrait,
{
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let lines = order_line::Entity::find()
        .filter(order_line::Column::OrderId.is_in(order_ids))
        .all(conn)
        .await?;

    let mut destination_ids: Vec<Uuid> = lines.iter().map(|l| l.destination_id).collect();
    destination_ids.sort_unstable();
    destination_ids.dedup();

    let destinations: HashMap<Uuid, DestinationSummary> = if destination_ids.is_empty() {
        HashMap::new()
    } else {
        destination::Entity::find()
            .filter(destination::Column::Id.is_in(destination_ids))
            .all(conn)
            .await?
            .iter()
            .map(|d| (d.id, DestinationSummary::from(d)))
            .collect()
    };

    let owners: HashMap<Uuid, OwnerSummary> = if include_owner {
        let mut user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|u| {
                (
                    u.id,
                    OwnerSummary {
                        id: u.id,
                        name: u.name,
                        email: u.email,
                    },
                )
            })
            .collect()
    } else {
        HashMap::new()
    };

    let mut lines_by_order: HashMap<Uuid, Vec<OrderLineView>> = HashMap::new();
    for line in lines {
        lines_by_order
            .entry(line.order_id)
            .or_default()
            .push(OrderLineView {
                id: line.id,
                destination_id: line.destination_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal,
                visit_date: line.visit_date,
                destination: destinations.get(&line.destination_id).cloned(),
            });
    }

    Ok(orders
        .into_iter()
        .map(|o| {
            let mut lines = lines_by_order.remove(&o.id).unwrap_or_default();
            lines.sort_by(|a, b| a.visit_date.cmp(&b.visit_date).then(a.id.cmp(&b.id)));
            OrderView {
                id: o.id,
                owner: owners.get(&o.user_id).cloned(),
                reference_code: o.reference_code,
                user_id: o.user_id,
                grand_total: o.grand_total,
                status: o.status,
                payment_method: o.payment_method,
                paid_at: o.paid_at,
                created_at: o.created_at,
                lines,
            }
        })
        .collect())
}

/// Read-only order lookups, each gated by the authorization guard
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DatabaseConnection>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Orders owned by the caller, newest first
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn list_mine(&self, caller: &AuthUser) -> Result<Vec<OrderView>, ServiceError> {
        let db = &*self.db;
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(caller.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await?;

        assemble_views(db, orders, false).await
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn get_by_reference(
        &self,
        reference_code: &str,
        caller: &AuthUser,
    ) -> Result<OrderView, ServiceError> {
        let db = &*self.db;
        let order = order::Entity::find()
            .filter(order::Column::ReferenceCode.eq(reference_code))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference_code)))?;

        guard::ensure_can_view(order.user_id, caller)?;

        assemble_views(db, vec![order], true)
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order view assembly returned nothing".into()))
    }

    /// Admin report listing, newest first
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn admin_list(
        &self,
        caller: &AuthUser,
        filter: AdminOrderFilter,
    ) -> Result<Vec<OrderView>, ServiceError> {
        guard::ensure_admin(caller)?;
        filter.validate()?;

        let mut query = order::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let (lower, upper) = filter.created_at_bounds();
        if let Some(lower) = lower {
            query = query.filter(order::Column::CreatedAt.gte(lower));
        }
        if let Some(upper) = upper {
            query = query.filter(order::Column::CreatedAt.lt(upper));
        }

        let db = &*self.db;
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await?;
        info!(count = orders.len(), "Admin order listing");

        assemble_views(db, orders, true).await
    }
}
