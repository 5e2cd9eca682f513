//! Checkout state machine commands.
//!
//! Every command runs under the order's lock against a freshly loaded copy of
//! the order, and writes the order back only once every ledger and collaborator
//! step has succeeded. A failed step leaves the stored order untouched; ledger
//! work already committed by the command is undone in reverse order.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OrderItemId, ReservationId, SkuId};
use domain::{
    Address, Aggregate, CustomerInfo, InventoryReservation, Offer, OfferEngine, Order, OrderError,
    OrderItem, OrderStatus, PaymentDetails, PaymentMethod, ReservationStatus, ShippingMethod,
};
use store::{InventoryStore, OrderStore};

use crate::error::{CheckoutError, Result};
use crate::events::{
    CheckoutEvent, EventPublisher, OrderCancelledData, OrderCreatedData, OrderFulfilledData,
    OrderItemData, OrderSubmittedData,
};
use crate::ledger::InventoryLedger;
use crate::locks::KeyedLocks;
use crate::services::{CatalogService, OfferRepository, PaymentService, ShippingService};

/// External collaborators consulted by the checkout commands.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogService>,
    pub offers: Arc<dyn OfferRepository>,
    pub shipping: Arc<dyn ShippingService>,
    pub payment: Arc<dyn PaymentService>,
}

impl Collaborators {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        offers: Arc<dyn OfferRepository>,
        shipping: Arc<dyn ShippingService>,
        payment: Arc<dyn PaymentService>,
    ) -> Self {
        Self {
            catalog,
            offers,
            shipping,
            payment,
        }
    }
}

/// An action undoing a step that already committed.
#[derive(Debug, Clone)]
enum Compensation {
    Release(ReservationId),
    Restore {
        reservation_id: ReservationId,
        quantity: u32,
    },
    Unconfirm {
        reservation_id: ReservationId,
        expires_at: Option<DateTime<Utc>>,
    },
    Deallocate(ReservationId),
    Void(String),
}

/// Drives orders through `PENDING → CUSTOMER_INFO → SHIPPING → PAYMENT →
/// REVIEW → SUBMITTED → FULFILLED`, with `CANCELLED` reachable before
/// submission.
pub struct CheckoutService<S> {
    orders: S,
    ledger: Arc<InventoryLedger<S>>,
    collaborators: Collaborators,
    engine: OfferEngine,
    events: EventPublisher,
    locks: KeyedLocks<OrderId>,
}

impl<S> CheckoutService<S>
where
    S: OrderStore + InventoryStore + 'static,
{
    /// Creates the service. `ledger` should be the instance shared with the
    /// expiry sweeper so both serialize on the same SKU locks.
    pub fn new(
        orders: S,
        ledger: Arc<InventoryLedger<S>>,
        collaborators: Collaborators,
        events: EventPublisher,
    ) -> Self {
        Self {
            orders,
            ledger,
            collaborators,
            engine: OfferEngine::default(),
            events,
            locks: KeyedLocks::new(),
        }
    }

    /// Replaces the default offer engine, e.g. to plug in another eligibility rule.
    pub fn with_offer_engine(mut self, engine: OfferEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger<S>> {
        &self.ledger
    }

    /// Creates an empty order in PENDING.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, customer_id: CustomerId, currency: &str) -> Result<Order> {
        let currency = currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CheckoutError::Validation(format!(
                "'{currency}' is not an ISO 4217 currency code"
            )));
        }

        let mut order = Order::new(customer_id, currency.to_ascii_uppercase());
        self.save(&mut order).await?;

        tracing::info!(order_id = %order.id(), "order created");
        self.events
            .publish(CheckoutEvent::OrderCreated(OrderCreatedData {
                order_id: order.id(),
                customer_id,
                currency: order.currency().to_string(),
            }))
            .await;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.load(order_id).await
    }

    /// Adds `quantity` of a SKU. A SKU already on the order has its line
    /// quantity increased instead.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, order_id: OrderId, sku_id: SkuId, quantity: u32) -> Result<Order> {
        self.command("add_item", order_id, |order| {
            self.add_line(order, &sku_id, quantity)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<Order> {
        self.command("update_item_quantity", order_id, |order| {
            self.change_quantity(order, item_id, quantity)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, order_id: OrderId, item_id: OrderItemId) -> Result<Order> {
        self.command("remove_item", order_id, |order| {
            self.remove_line(order, item_id)
        })
        .await
    }

    /// Stores a coupon code and reprices. Unknown codes are `NotFound`; archived
    /// ones are `Validation`. Either way the order is left as it was.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, order_id: OrderId, code: &str) -> Result<Order> {
        self.command("apply_coupon", order_id, |order| {
            self.attach_coupon(order, code)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, order_id: OrderId) -> Result<Order> {
        self.command("remove_coupon", order_id, |order| self.detach_coupon(order))
            .await
    }

    /// PENDING → CUSTOMER_INFO.
    #[tracing::instrument(skip(self))]
    pub async fn start_checkout(&self, order_id: OrderId) -> Result<Order> {
        self.command("start_checkout", order_id, |order| {
            self.advance(order, Order::start_checkout)
        })
        .await
    }

    /// CUSTOMER_INFO → SHIPPING.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_customer_info(
        &self,
        order_id: OrderId,
        info: CustomerInfo,
    ) -> Result<Order> {
        self.command("confirm_customer_info", order_id, |order| {
            self.advance(order, |o| o.confirm_customer_info(info))
        })
        .await
    }

    /// SHIPPING → PAYMENT: quotes shipping, creates the fulfillment group and
    /// confirms every item's reservation, re-reserving any that lapsed.
    #[tracing::instrument(skip(self))]
    pub async fn select_shipping(
        &self,
        order_id: OrderId,
        address: Address,
        method: ShippingMethod,
    ) -> Result<Order> {
        self.command("select_shipping", order_id, |order| {
            self.choose_shipping(order, address, method)
        })
        .await
    }

    /// PAYMENT → REVIEW: authorizes the order total.
    #[tracing::instrument(skip(self, method))]
    pub async fn select_payment(&self, order_id: OrderId, method: PaymentMethod) -> Result<Order> {
        self.command("select_payment", order_id, |order| {
            self.authorize_payment(order, method)
        })
        .await
    }

    /// REVIEW → SUBMITTED: allocates every item's stock and freezes the order.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self, order_id: OrderId) -> Result<Order> {
        self.command("submit", order_id, |order| self.submit_order(order))
            .await
    }

    /// SUBMITTED → FULFILLED: ships every allocated reservation.
    #[tracing::instrument(skip(self))]
    pub async fn fulfill(&self, order_id: OrderId) -> Result<Order> {
        self.command("fulfill", order_id, |order| self.fulfill_order(order))
            .await
    }

    /// Cancels an unsubmitted order and releases its reservations.
    ///
    /// The status change is saved first; releases and the payment void then
    /// run best-effort, and anything left open is reclaimed by the expiry sweep.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        self.command("cancel", order_id, |order| self.cancel_order(order, reason))
            .await
    }

    // Command bodies

    async fn add_line(&self, mut order: Order, sku_id: &SkuId, quantity: u32) -> Result<Order> {
        order.ensure_editable("add item")?;
        if quantity == 0 {
            return Err(CheckoutError::Validation(
                "quantity must be positive".to_string(),
            ));
        }

        if let Some(existing) = order.item_for_sku(sku_id) {
            let (item_id, current) = (existing.id(), existing.quantity());
            let total = current.checked_add(quantity).ok_or_else(|| {
                CheckoutError::Validation(format!("quantity overflow for {sku_id}"))
            })?;
            return self.change_quantity(order, item_id, total).await;
        }

        let info = self.collaborators.catalog.lookup(sku_id).await?;
        let item_id = order.add_item(info.to_item(quantity))?;
        let reservation = self
            .ledger
            .reserve(sku_id, order.id(), item_id, quantity)
            .await?;
        let undo = vec![Compensation::Release(reservation.id())];

        if let Err(e) = self
            .finish_item_change(&mut order, item_id, Some(reservation.id()))
            .await
        {
            return Err(self.compensate(e, undo).await);
        }

        self.events
            .publish(CheckoutEvent::OrderItemAdded(OrderItemData {
                order_id: order.id(),
                item_id,
                sku_id: sku_id.clone(),
                quantity,
            }))
            .await;
        Ok(order)
    }

    async fn change_quantity(
        &self,
        mut order: Order,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<Order> {
        let item = order
            .item(item_id)
            .cloned()
            .ok_or_else(|| CheckoutError::not_found("Order item", item_id))?;
        order.update_item_quantity(item_id, quantity)?;

        let open = match item.reservation_id() {
            Some(id) => Some(self.ledger.reservation(id).await?).filter(|r| r.is_open()),
            None => None,
        };

        let mut undo = Vec::new();
        let reservation_id = match open {
            Some(reservation) => {
                if reservation.quantity() != quantity {
                    self.ledger.adjust(reservation.id(), quantity).await?;
                    undo.push(Compensation::Restore {
                        reservation_id: reservation.id(),
                        quantity: reservation.quantity(),
                    });
                }
                reservation.id()
            }
            // The previous hold lapsed; take a fresh one for the whole line.
            None => {
                let reservation = self
                    .ledger
                    .reserve(item.sku_id(), order.id(), item_id, quantity)
                    .await?;
                undo.push(Compensation::Release(reservation.id()));
                reservation.id()
            }
        };

        if let Err(e) = self
            .finish_item_change(&mut order, item_id, Some(reservation_id))
            .await
        {
            return Err(self.compensate(e, undo).await);
        }
        Ok(order)
    }

    async fn remove_line(&self, mut order: Order, item_id: OrderItemId) -> Result<Order> {
        let item = order.remove_item(item_id)?;
        self.reprice(&mut order).await?;
        self.save(&mut order).await?;

        if let Some(reservation_id) = item.reservation_id() {
            self.release_best_effort(reservation_id).await;
        }

        self.events
            .publish(CheckoutEvent::OrderItemRemoved(OrderItemData {
                order_id: order.id(),
                item_id,
                sku_id: item.sku_id().clone(),
                quantity: item.quantity(),
            }))
            .await;
        Ok(order)
    }

    async fn attach_coupon(&self, mut order: Order, code: &str) -> Result<Order> {
        order.ensure_editable("apply coupon")?;
        let code = code.trim();
        if code.is_empty() {
            return Err(CheckoutError::Validation(
                "coupon code must not be blank".to_string(),
            ));
        }

        let coupon = self
            .collaborators
            .offers
            .find_by_coupon(code)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Coupon", code))?;
        let offers = self.collaborators.offers.active_offers().await?;

        order.apply_coupon(code)?;
        self.recompute(&mut order, &offers, Some(&coupon))?;
        self.save(&mut order).await?;
        Ok(order)
    }

    async fn detach_coupon(&self, mut order: Order) -> Result<Order> {
        order.remove_coupon()?;
        self.reprice(&mut order).await?;
        self.save(&mut order).await?;
        Ok(order)
    }

    /// Applies a status transition with no ledger work and saves.
    async fn advance<F>(&self, mut order: Order, transition: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> std::result::Result<(), OrderError>,
    {
        transition(&mut order)?;
        self.save(&mut order).await?;
        Ok(order)
    }

    async fn choose_shipping(
        &self,
        mut order: Order,
        address: Address,
        method: ShippingMethod,
    ) -> Result<Order> {
        order.ensure_status(OrderStatus::Shipping, "select shipping")?;
        let cost = self
            .collaborators
            .shipping
            .quote(&order, &address, method)
            .await?;
        order.select_shipping(address, method, cost)?;

        let mut undo = Vec::new();
        if let Err(e) = self.confirm_items(&mut order, &mut undo).await {
            return Err(self.compensate(e, undo).await);
        }
        if let Err(e) = self.save(&mut order).await {
            return Err(self.compensate(e, undo).await);
        }
        Ok(order)
    }

    async fn authorize_payment(&self, mut order: Order, method: PaymentMethod) -> Result<Order> {
        order.ensure_status(OrderStatus::Payment, "select payment")?;

        let amount = order.total();
        let authorization_id = self
            .collaborators
            .payment
            .authorize(order.id(), amount, &method)
            .await?;
        let undo = vec![Compensation::Void(authorization_id.clone())];

        let result = async {
            order.select_payment(PaymentDetails {
                method,
                authorization_id,
                amount,
            })?;
            self.save(&mut order).await
        }
        .await;
        if let Err(e) = result {
            return Err(self.compensate(e, undo).await);
        }
        Ok(order)
    }

    async fn submit_order(&self, mut order: Order) -> Result<Order> {
        let now = Utc::now();
        // Guards are checked before any stock moves.
        order.clone().submit(now)?;

        let mut undo = Vec::new();
        let result = async {
            self.allocate_items(&mut order, &mut undo).await?;
            order.submit(now)?;
            self.save(&mut order).await
        }
        .await;
        if let Err(e) = result {
            return Err(self.compensate(e, undo).await);
        }

        self.release_strays(&order).await;
        self.events
            .publish(CheckoutEvent::OrderSubmitted(OrderSubmittedData {
                order_id: order.id(),
                total: order.total(),
                submitted_at: now,
            }))
            .await;
        Ok(order)
    }

    async fn fulfill_order(&self, mut order: Order) -> Result<Order> {
        order.ensure_status(OrderStatus::Submitted, "fulfill")?;

        // Reservations shipped by an earlier, interrupted attempt are skipped.
        for reservation_id in order.reservation_ids() {
            let reservation = self.ledger.reservation(reservation_id).await?;
            if reservation.status() != ReservationStatus::Fulfilled {
                self.ledger.fulfill(reservation_id).await?;
            }
        }

        order.mark_fulfilled()?;
        self.save(&mut order).await?;
        self.events
            .publish(CheckoutEvent::OrderFulfilled(OrderFulfilledData {
                order_id: order.id(),
                fulfilled_at: Utc::now(),
            }))
            .await;
        Ok(order)
    }

    async fn cancel_order(&self, mut order: Order, reason: &str) -> Result<Order> {
        let now = Utc::now();
        order.cancel(reason, now)?;
        self.save(&mut order).await?;

        let mut reservation_ids = order.reservation_ids();
        match self.ledger.reservations_for_order(order.id()).await {
            Ok(records) => {
                for record in records {
                    if record.is_open() && !reservation_ids.contains(&record.id()) {
                        reservation_ids.push(record.id());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "failed to list order reservations");
            }
        }

        let mut released = 0;
        for reservation_id in reservation_ids {
            if self.release_best_effort(reservation_id).await {
                released += 1;
            }
        }

        if let Some(payment) = order.payment() {
            if let Err(e) = self
                .collaborators
                .payment
                .void(&payment.authorization_id)
                .await
            {
                tracing::warn!(
                    order_id = %order.id(),
                    authorization_id = %payment.authorization_id,
                    error = %e,
                    "failed to void payment authorization"
                );
            }
        }

        self.events
            .publish(CheckoutEvent::OrderCancelled(OrderCancelledData {
                order_id: order.id(),
                reason: reason.to_string(),
                released,
                cancelled_at: now,
            }))
            .await;
        Ok(order)
    }

    // Ledger steps

    /// Makes sure every item holds a confirmed reservation.
    async fn confirm_items(&self, order: &mut Order, undo: &mut Vec<Compensation>) -> Result<()> {
        let items: Vec<OrderItem> = order.items().to_vec();
        for item in &items {
            let reservation = self.confirmed_reservation(order.id(), item, undo).await?;
            if item.reservation_id() != Some(reservation.id()) {
                order.set_item_reservation(item.id(), Some(reservation.id()))?;
            }
        }
        Ok(())
    }

    /// Moves every item's reservation to ALLOCATED.
    async fn allocate_items(&self, order: &mut Order, undo: &mut Vec<Compensation>) -> Result<()> {
        let items: Vec<OrderItem> = order.items().to_vec();
        for item in &items {
            let reservation = self.confirmed_reservation(order.id(), item, undo).await?;
            if item.reservation_id() != Some(reservation.id()) {
                order.set_item_reservation(item.id(), Some(reservation.id()))?;
            }
            if reservation.status() == ReservationStatus::Allocated {
                continue;
            }
            self.ledger.allocate(reservation.id()).await?;
            undo.push(Compensation::Deallocate(reservation.id()));
        }
        Ok(())
    }

    /// Returns the item's confirmed (or allocated) reservation, taking a new
    /// one when the previous hold is gone. Whatever it changes is pushed onto
    /// `undo`: a new reservation is released, a confirmed pending hold goes
    /// back to pending with its old expiry.
    async fn confirmed_reservation(
        &self,
        order_id: OrderId,
        item: &OrderItem,
        undo: &mut Vec<Compensation>,
    ) -> Result<InventoryReservation> {
        if let Some(reservation_id) = item.reservation_id() {
            let current = self.ledger.reservation(reservation_id).await?;
            match current.status() {
                ReservationStatus::Confirmed | ReservationStatus::Allocated => {
                    return Ok(current);
                }
                ReservationStatus::Pending => match self.ledger.confirm(reservation_id).await {
                    Ok(confirmed) => {
                        undo.push(Compensation::Unconfirm {
                            reservation_id,
                            expires_at: current.expires_at(),
                        });
                        return Ok(confirmed);
                    }
                    // Expired between the read and the confirm.
                    Err(CheckoutError::InvalidTransition(_)) => {}
                    Err(e) => return Err(e),
                },
                _ => {}
            }
        }

        let reservation = self
            .ledger
            .reserve(item.sku_id(), order_id, item.id(), item.quantity())
            .await?;
        tracing::info!(item_id = %item.id(), reservation_id = %reservation.id(), "re-reserved lapsed item");
        undo.push(Compensation::Release(reservation.id()));

        self.ledger.confirm(reservation.id()).await
    }

    /// Releases open reservations recorded for the order that no item points at.
    async fn release_strays(&self, order: &Order) {
        let held = order.reservation_ids();
        let records = match self.ledger.reservations_for_order(order.id()).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "failed to list order reservations");
                return;
            }
        };
        for record in records {
            if record.is_open() && !held.contains(&record.id()) {
                self.release_best_effort(record.id()).await;
            }
        }
    }

    /// Returns true if the call released the reservation.
    async fn release_best_effort(&self, reservation_id: ReservationId) -> bool {
        match self.ledger.release(reservation_id).await {
            Ok(outcome) => outcome.was_released(),
            Err(e) => {
                tracing::warn!(
                    %reservation_id,
                    error = %e,
                    "failed to release reservation; the expiry sweep will reclaim it"
                );
                false
            }
        }
    }

    /// Runs `undo` in reverse and returns `err`, paired with the first
    /// compensation failure if any.
    async fn compensate(&self, err: CheckoutError, undo: Vec<Compensation>) -> CheckoutError {
        if undo.is_empty() {
            return err;
        }
        tracing::warn!(error = %err, steps = undo.len(), "checkout step failed, compensating");

        let mut failure = None;
        for action in undo.into_iter().rev() {
            if let Err(e) = self.run_compensation(&action).await {
                tracing::error!(?action, error = %e, "compensating action failed");
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(compensation) => err.with_compensation_failure(compensation),
            None => err,
        }
    }

    async fn run_compensation(&self, action: &Compensation) -> Result<()> {
        match action {
            Compensation::Release(id) => self.ledger.release(*id).await.map(|_| ()),
            Compensation::Restore {
                reservation_id,
                quantity,
            } => self.ledger.adjust(*reservation_id, *quantity).await.map(|_| ()),
            Compensation::Unconfirm {
                reservation_id,
                expires_at,
            } => self
                .ledger
                .unconfirm(*reservation_id, *expires_at)
                .await
                .map(|_| ()),
            Compensation::Deallocate(id) => self.ledger.deallocate(*id).await.map(|_| ()),
            Compensation::Void(authorization_id) => {
                self.collaborators.payment.void(authorization_id).await
            }
        }
    }

    // Pricing and persistence

    async fn finish_item_change(
        &self,
        order: &mut Order,
        item_id: OrderItemId,
        reservation_id: Option<ReservationId>,
    ) -> Result<()> {
        order.set_item_reservation(item_id, reservation_id)?;
        self.reprice(order).await?;
        self.save(order).await
    }

    /// Full recompute against the active offers and the order's coupon.
    ///
    /// A coupon that vanished or was archived since it was applied is ignored.
    async fn reprice(&self, order: &mut Order) -> Result<()> {
        let offers = self.collaborators.offers.active_offers().await?;
        let coupon = match order.coupon_code().map(str::to_owned) {
            Some(code) => match self.collaborators.offers.find_by_coupon(&code).await? {
                Some(offer) if !offer.archived => Some(offer),
                Some(_) => {
                    tracing::warn!(%code, "coupon archived since it was applied; pricing without it");
                    None
                }
                None => {
                    tracing::warn!(%code, "coupon no longer exists; pricing without it");
                    None
                }
            },
            None => None,
        };
        self.recompute(order, &offers, coupon.as_ref())
    }

    fn recompute(&self, order: &mut Order, offers: &[Offer], coupon: Option<&Offer>) -> Result<()> {
        let summary = self.engine.recompute(order, offers, coupon)?;
        metrics::counter!("offers_applied_total").increment(summary.applied.len() as u64);
        tracing::debug!(
            applied = summary.applied.len(),
            discount = %summary.discount_total,
            total = %order.total(),
            "order repriced"
        );
        Ok(())
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))
    }

    async fn save(&self, order: &mut Order) -> Result<()> {
        let version = self.orders.save_order(order).await?;
        order.set_version(version);
        Ok(())
    }

    /// Loads the order under its lock, runs `apply` and records the outcome.
    async fn command<F, Fut>(&self, step: &'static str, order_id: OrderId, apply: F) -> Result<Order>
    where
        F: FnOnce(Order) -> Fut,
        Fut: Future<Output = Result<Order>>,
    {
        let _guard = self.locks.lock(&order_id).await;
        let result = match self.load(order_id).await {
            Ok(order) => apply(order).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_transitions_total", "step" => step).increment(1);
                tracing::info!(
                    step,
                    %order_id,
                    status = %order.status(),
                    total = %order.total(),
                    "checkout command applied"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_command_failures_total", "code" => e.code())
                    .increment(1);
                match e {
                    CheckoutError::Internal(_) | CheckoutError::CompensationFailed { .. } => {
                        tracing::error!(step, %order_id, error = %e, "checkout command failed");
                    }
                    _ => tracing::info!(step, %order_id, code = e.code(), "checkout command rejected"),
                }
            }
        }
        result
    }
}
