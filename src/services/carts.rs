use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    clock::Clock,
    entities::{cart_line, destination, user},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing,
};

#[derive(Debug, Clone)]
pub struct AddCartLineRequest {
    pub destination_id: Uuid,
    pub quantity: i32,
    pub visit_date: NaiveDate,
}

/// Cart line with live catalog data. Prices here are indicative; the checkout
/// snapshot is what gets charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub destination_id: Uuid,
    pub destination_name: Option<String>,
    pub quantity: i32,
    pub visit_date: NaiveDate,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
}

impl CartService {
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

    #[instrument(skip(self, request), fields(user_id = %caller.user_id, destination_id = %request.destination_id))]
    pub async fn add_line(
        &self,
        caller: &AuthUser,
        request: AddCartLineRequest,
    ) -> Result<cart_line::Model, ServiceError> {
        let today = self.clock.today();
        if request.visit_date < today {
            return Err(ServiceError::InvalidInput(format!(
                "Visit date {} is in the past (today is {})",
                request.visit_date, today
            )));
        }

        let db = &*self.db;
        user::Entity::find_by_id(caller.user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Unknown user".to_string()))?;

        // Same availability rules as checkout: exists, active, quantity >= 1
        pricing::resolve(db, request.destination_id, request.quantity).await?;

        let line = cart_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(caller.user_id),
            destination_id: Set(request.destination_id),
            quantity: Set(request.quantity),
            visit_date: Set(request.visit_date),
            created_at: Set(self.clock.now()),
        }
        .insert(db)
        .await?;

        info!(cart_line_id = %line.id, "Cart line added");
        self.event_sender
            .send_or_log(Event::CartLineAdded {
                cart_line_id: line.id,
                user_id: caller.user_id,
                destination_id: line.destination_id,
            });

        Ok(line)
    }

    /// Caller's cart, oldest first
    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn list_lines(&self, caller: &AuthUser) -> Result<Vec<CartLineView>, ServiceError> {
        let db = &*self.db;
        let lines = cart_line::Entity::find()
            .filter(cart_line::Column::UserId.eq(caller.user_id))
            .order_by_asc(cart_line::Column::CreatedAt)
            .all(db)
            .await?;

        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut destination_ids: Vec<Uuid> = lines.iter().map(|l| l.destination_id).collect();
        destination_ids.sort_unstable();
        destination_ids.dedup();
        let destinations: HashMap<Uuid, destination::Model> = destination::Entity::find()
            .filter(destination::Column::Id.is_in(destination_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        Ok(lines
            .into_iter()
            .map(|line| {
                let destination = destinations.get(&line.destination_id);
                let unit_price = destination.map(|d| d.price);
                CartLineView {
                    id: line.id,
                    destination_id: line.destination_id,
                    destination_name: destination.map(|d| d.name.clone()),
                    quantity: line.quantity,
                    visit_date: line.visit_date,
                    line_total: unit_price.map(|p| p * Decimal::from(line.quantity)),
                    unit_price,
                    created_at: line.created_at,
                }
            })
            .collect())
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn remove_line(&self, caller: &AuthUser, line_id: Uuid) -> Result<(), ServiceError> {
        let result = cart_line::Entity::delete_many()
            .filter(cart_line::Column::Id.eq(line_id))
            .filter(cart_line::Column::UserId.eq(caller.user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Cart line {} not found",
                line_id
            )));
        }

        self.event_sender
            .send_or_log(Event::CartLineRemoved {
                cart_line_id: line_id,
                user_id: caller.user_id,
            });
        Ok(())
    }
}
