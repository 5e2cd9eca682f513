//! Checkout notifications and the fire-and-continue publisher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, OrderItemId, ReservationId, SkuId};
use domain::{Aggregate, DomainEvent, InventoryReservation};
use serde::{Deserialize, Serialize};
use store::{EventEnvelope, EventSink};

/// Notifications emitted by the ledger and the checkout commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CheckoutEvent {
    OrderCreated(OrderCreatedData),
    OrderItemAdded(OrderItemData),
    OrderItemRemoved(OrderItemData),
    OrderSubmitted(OrderSubmittedData),
    OrderCancelled(OrderCancelledData),
    OrderFulfilled(OrderFulfilledData),
    InventoryReserved(ReservationData),
    InventoryReleased(ReservationData),
    ReservationExpired(ReservationData),
}

impl DomainEvent for CheckoutEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CheckoutEvent::OrderCreated(_) => "OrderCreated",
            CheckoutEvent::OrderItemAdded(_) => "OrderItemAdded",
            CheckoutEvent::OrderItemRemoved(_) => "OrderItemRemoved",
            CheckoutEvent::OrderSubmitted(_) => "OrderSubmitted",
            CheckoutEvent::OrderCancelled(_) => "OrderCancelled",
            CheckoutEvent::OrderFulfilled(_) => "OrderFulfilled",
            CheckoutEvent::InventoryReserved(_) => "InventoryReserved",
            CheckoutEvent::InventoryReleased(_) => "InventoryReleased",
            CheckoutEvent::ReservationExpired(_) => "ReservationExpired",
        }
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub currency: String,
}

/// Data for item added/removed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemData {
    pub order_id: OrderId,
    pub item_id: OrderItemId,
    pub sku_id: SkuId,
    pub quantity: u32,
}

/// Data for OrderSubmitted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSubmittedData {
    pub order_id: OrderId,
    pub total: Money,
    pub submitted_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: OrderId,
    pub reason: String,
    /// Reservations released by the cancellation.
    pub released: usize,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for OrderFulfilled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFulfilledData {
    pub order_id: OrderId,
    pub fulfilled_at: DateTime<Utc>,
}

/// Data for reservation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationData {
    pub reservation_id: ReservationId,
    pub reservation_ref: String,
    pub sku_id: SkuId,
    pub order_id: OrderId,
    pub quantity: u32,
}

impl From<&InventoryReservation> for ReservationData {
    fn from(reservation: &InventoryReservation) -> Self {
        Self {
            reservation_id: reservation.id(),
            reservation_ref: reservation.reservation_ref().to_string(),
            sku_id: reservation.sku_id().clone(),
            order_id: reservation.order_id(),
            quantity: reservation.quantity(),
        }
    }
}

impl CheckoutEvent {
    /// The record type and identity the event is routed under.
    pub fn aggregate(&self) -> (&'static str, String) {
        match self {
            CheckoutEvent::OrderCreated(d) => ("Order", d.order_id.to_string()),
            CheckoutEvent::OrderItemAdded(d) | CheckoutEvent::OrderItemRemoved(d) => {
                ("Order", d.order_id.to_string())
            }
            CheckoutEvent::OrderSubmitted(d) => ("Order", d.order_id.to_string()),
            CheckoutEvent::OrderCancelled(d) => ("Order", d.order_id.to_string()),
            CheckoutEvent::OrderFulfilled(d) => ("Order", d.order_id.to_string()),
            CheckoutEvent::InventoryReserved(d)
            | CheckoutEvent::InventoryReleased(d)
            | CheckoutEvent::ReservationExpired(d) => {
                ("InventoryReservation", d.reservation_id.to_string())
            }
        }
    }

    /// The order every checkout notification correlates to.
    pub fn order_id(&self) -> OrderId {
        match self {
            CheckoutEvent::OrderCreated(d) => d.order_id,
            CheckoutEvent::OrderItemAdded(d) | CheckoutEvent::OrderItemRemoved(d) => d.order_id,
            CheckoutEvent::OrderSubmitted(d) => d.order_id,
            CheckoutEvent::OrderCancelled(d) => d.order_id,
            CheckoutEvent::OrderFulfilled(d) => d.order_id,
            CheckoutEvent::InventoryReserved(d)
            | CheckoutEvent::InventoryReleased(d)
            | CheckoutEvent::ReservationExpired(d) => d.order_id,
        }
    }

    /// Wraps the event in an envelope for the sink.
    pub fn to_envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        let (aggregate_type, aggregate_id) = self.aggregate();
        let envelope = EventEnvelope::new(self.event_type(), aggregate_type, aggregate_id)
            .with_payload(self)?
            .with_metadata("order_id", self.order_id());
        Ok(match self {
            CheckoutEvent::InventoryReserved(d)
            | CheckoutEvent::InventoryReleased(d)
            | CheckoutEvent::ReservationExpired(d) => {
                envelope.with_metadata("sku_id", d.sku_id.as_str())
            }
            _ => envelope,
        })
    }
}

/// Publishes notifications without ever failing the caller.
///
/// A failed publish is logged and counted; the triggering operation has
/// already committed and carries on.
#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub async fn publish(&self, event: CheckoutEvent) {
        let event_type = event.event_type();
        let envelope = match event.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                metrics::counter!("event_publish_failures_total").increment(1);
                tracing::warn!(event_type, error = %e, "failed to serialize notification");
                return;
            }
        };

        if let Err(e) = self.sink.publish(envelope).await {
            metrics::counter!("event_publish_failures_total").increment(1);
            tracing::warn!(event_type, error = %e, "failed to publish notification");
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher").finish_non_exhaustive()
    }
}
