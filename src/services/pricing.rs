//! Authoritative price lookups taken at order-assembly time.
//!
//! Snapshots are read through the caller's connection so they observe the same
//! transaction as the order being written. The unit price copied into an order
//! line is never recomputed afterwards.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::destination;
use crate::errors::ServiceError;

/// Price of one order line as of the moment it was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceSnapshot {
    pub destination_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Builds a snapshot from an already loaded destination row.
pub fn snapshot(
    destination: &destination::Model,
    quantity: i32,
) -> Result<PriceSnapshot, ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::InvalidInput(format!(
            "Quantity must be at least 1, got {}",
            quantity
        )));
    }
    if !destination.is_active {
        return Err(ServiceError::InvalidInput(format!(
            "Destination {} is not available for booking",
            destination.name
        )));
    }

    Ok(PriceSnapshot {
        destination_id: destination.id,
        quantity,
        unit_price: destination.price,
        subtotal: destination.price * Decimal::from(quantity),
    })
}

/// Sum of line subtotals
pub fn grand_total(snapshots: &[PriceSnapshot]) -> Decimal {
    snapshots.iter().map(|s| s.subtotal).sum()
}

#[instrument(skip(conn))]
pub async fn resolve<C>(
    conn: &C,
    destination_id: Uuid,
    quantity: i32,
) -> Result<PriceSnapshot, ServiceError>
where
    C: ConnectionTrait,
{
    let destination = destination::Entity::find_by_id(destination_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Destination {} not found", destination_id))
        })?;

    snapshot(&destination, quantity)
}

/// Resolves every `(destination_id, quantity)` pair with a single query.
/// Results keep the order of `lines`.
#[instrument(skip(conn, lines), fields(line_count = lines.len()))]
pub async fn resolve_many<C>(
    conn: &C,
    lines: &[(Uuid, i32)],
) -> Result<Vec<PriceSnapshot>, ServiceError>
where
    C: ConnectionTrait,
{
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    ids.dedup();

    let destinations: HashMap<Uuid, destination::Model> = destination::Entity::find()
        .filter(destination::Column::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();

    lines
        .iter()
        .map(|(destination_id, quantity)| {
            let destination = destinations.get(destination_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Destination {} not found", destination_id))
            })?;
            snapshot(destination, *quantity)
        })
        .collect()
}
