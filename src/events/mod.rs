use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::order::{OrderStatus, PaymentMethod};

// Domain events published after a unit of work has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        reference_code: String,
        user_id: Uuid,
        grand_total: Decimal,
        payment_method: PaymentMethod,
        status: OrderStatus,
        line_count: usize,
    },
    PaymentConfirmed {
        order_id: Uuid,
        reference_code: String,
        paid_at: DateTime<Utc>,
    },
    CartLineAdded {
        cart_line_id: Uuid,
        user_id: Uuid,
        destination_id: Uuid,
    },
    CartLineRemoved {
        cart_line_id: Uuid,
        user_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::PaymentConfirmed { .. } => "payment_confirmed",
            Event::CartLineAdded { .. } => "cart_line_added",
            Event::CartLineRemoved { .. } => "cart_line_removed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting, logging instead of failing. Used after
    /// commit, where the write has already happened and must not stall or be
    /// reported as an error.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("tiketloka.events.dropped", 1, "event" => name, "reason" => "full");
                warn!(event = name, "Event channel full; dropping domain event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter!("tiketloka.events.dropped", 1, "event" => name, "reason" => "closed");
                warn!(event = name, "Event channel closed; dropping domain event");
            }
        }
    }
}

/// Handlers process events asynchronously off the request path.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Writes every event to the structured log
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        match event {
            Event::OrderPlaced {
                order_id,
                reference_code,
                user_id,
                grand_total,
                payment_method,
                status,
                line_count,
            } => info!(
                %order_id,
                %reference_code,
                %user_id,
                %grand_total,
                %payment_method,
                %status,
                line_count,
                "Order placed"
            ),
            Event::PaymentConfirmed {
                order_id,
                reference_code,
                paid_at,
            } => info!(%order_id, %reference_code, %paid_at, "Payment confirmed"),
            Event::CartLineAdded {
                cart_line_id,
                user_id,
                destination_id,
            } => info!(%cart_line_id, %user_id, %destination_id, "Cart line added"),
            Event::CartLineRemoved {
                cart_line_id,
                user_id,
            } => info!(%cart_line_id, %user_id, "Cart line removed"),
        }
        Ok(())
    }
}

/// Consumes events until every sender is dropped
pub async fn process_events(rx: mpsc::Receiver<Event>) {
    process_events_with(rx, vec![Arc::new(LoggingEventHandler)]).await
}

pub async fn process_events_with(
    mut rx: mpsc::Receiver<Event>,
    handlers: Vec<Arc<dyn EventHandler>>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("tiketloka.events.processed", 1, "event" => event.name());
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(event = event.name(), error = %e, "Event handler failed");
            }
        }
    }

    info!("Event channel closed; event processing loop finished");
}
