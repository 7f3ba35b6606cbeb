use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, waiting for channel capacity.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a closed channel is logged, never propagated.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Domain events emitted after successful writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderEscalated {
        order_id: Uuid,
        order_number: String,
        placed_at: DateTime<Utc>,
    },

    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    CategoryChanged(Uuid),

    CustomerCreated(Uuid),
    CustomerUpdated(Uuid),

    InventoryAdjusted {
        stock_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },
    StockTransferred {
        product_id: Uuid,
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
        quantity: i32,
    },
    InventoryAllocated {
        order_id: Uuid,
        allocations: Vec<Uuid>,
    },
    InventoryReleased {
        order_id: Uuid,
        quantity: i32,
    },
    InventoryShipped {
        order_id: Uuid,
        quantity: i32,
    },
    StockRestocked {
        stock_id: Uuid,
        product_id: Uuid,
        warehouse_id: Uuid,
        added: i32,
        new_quantity: i32,
    },

    CouponRedeemed {
        code: String,
        discount: Decimal,
    },

    CartUpdated(Uuid),
    CartMerged {
        from_cart_id: Uuid,
        into_cart_id: Uuid,
    },
    CartCheckedOut {
        cart_id: Uuid,
        order_id: Uuid,
    },
    CartAbandoned(Uuid),

    EmailSent {
        email_id: Uuid,
        recipient: String,
    },
    UserTokensRevoked(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "order.created",
            Event::OrderStatusChanged { .. } => "order.status_changed",
            Event::OrderCancelled(_) => "order.cancelled",
            Event::OrderEscalated { .. } => "order.escalated",
            Event::ProductCreated(_) => "product.created",
            Event::ProductUpdated(_) => "product.updated",
            Event::ProductDeleted(_) => "product.deleted",
            Event::CategoryChanged(_) => "category.changed",
            Event::CustomerCreated(_) => "customer.created",
            Event::CustomerUpdated(_) => "customer.updated",
            Event::InventoryAdjusted { .. } => "inventory.adjusted",
            Event::StockTransferred { .. } => "inventory.transferred",
            Event::InventoryAllocated { .. } => "inventory.allocated",
            Event::InventoryReleased { .. } => "inventory.released",
            Event::InventoryShipped { .. } => "inventory.shipped",
            Event::StockRestocked { .. } => "inventory.restocked",
            Event::CouponRedeemed { .. } => "coupon.redeemed",
            Event::CartUpdated(_) => "cart.updated",
            Event::CartMerged { .. } => "cart.merged",
            Event::CartCheckedOut { .. } => "cart.checked_out",
            Event::CartAbandoned(_) => "cart.abandoned",
            Event::EmailSent { .. } => "email.sent",
            Event::UserTokensRevoked(_) => "user.tokens_revoked",
        }
    }
}

/// Creates the bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the channel until every sender is dropped, logging each event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), %payload, "domain event"),
            Err(e) => warn!(event = event.name(), error = %e, "unserializable domain event"),
        }
    }

    info!("Event processing loop stopped");
}
