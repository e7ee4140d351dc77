use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the storefront services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Coupon events
    CouponIssued {
        user_id: Uuid,
        code: String,
    },
    CouponRedeemed {
        user_id: Uuid,
        code: String,
    },

    // Review events
    ReviewCreated {
        review_id: Uuid,
        product_id: Uuid,
    },
    ReviewUpdated {
        review_id: Uuid,
        product_id: Uuid,
    },
    ReviewDeleted {
        review_id: Uuid,
        product_id: Uuid,
    },
    ProductRatingRecomputed {
        product_id: Uuid,
        average_rating: f64,
        num_reviews: i32,
    },

    // Catalog events
    ProductCreated(Uuid),

    // Wishlist and cart events
    WishlistItemAdded {
        user_id: Uuid,
        product_id: Uuid,
    },
    WishlistItemRemoved {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartUpdated(Uuid),
    CartCleared(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::CouponIssued { .. } => "coupon_issued",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::ReviewCreated { .. } => "review_created",
            Event::ReviewUpdated { .. } => "review_updated",
            Event::ReviewDeleted { .. } => "review_deleted",
            Event::ProductRatingRecomputed { .. } => "product_rating_recomputed",
            Event::ProductCreated(_) => "product_created",
            Event::WishlistItemAdded { .. } => "wishlist_item_added",
            Event::WishlistItemRemoved { .. } => "wishlist_item_removed",
            Event::CartUpdated(_) => "cart_updated",
            Event::CartCleared(_) => "cart_cleared",
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

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a closed channel is logged, never surfaced to callers.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("storefront_events_total", 1, "event" => event.name());

        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(%order_id, %user_id, %total_amount, "order created");
            }
            Event::CouponIssued { user_id, code } => {
                info!(%user_id, code = %code, "coupon issued");
            }
            Event::ProductRatingRecomputed {
                product_id,
                average_rating,
                num_reviews,
            } => {
                info!(%product_id, average_rating, num_reviews, "product rating recomputed");
            }
            other => {
                info!(event = other.name(), "event received");
            }
        }
    }

    warn!("Event processing loop has ended");
}
