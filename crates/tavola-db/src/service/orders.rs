//! # Order Service
//!
//! Creating, editing, advancing and deleting orders.
//!
//! ## Update Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update_order_items(order, [add, update, remove], status?, method?)    │
//! │                                                                         │
//! │  1. order PENDING or PREPARING?          no ──► ORDER_LOCKED           │
//! │  2. apply ops in request order                                         │
//! │       add     ──► price, insert, consume recipe stock                  │
//! │       update  ──► reprice line, consume stock for any increase         │
//! │       remove  ──► delete line (stock stays consumed)                   │
//! │  3. no lines left?                        yes ──► VALIDATION_ERROR     │
//! │  4. order.total = SUM(items.total_price)  (fresh, never patched)       │
//! │  5. status transition / method hint                                    │
//! │                                                                         │
//! │  all in one transaction                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tavola_core::order::{
    check_transition, ensure_deletable, ensure_editable, line_total, validate_new_items,
    validate_ops, AddOnRequest, NewOrderItem, OrderItemOp,
};
use tavola_core::tickets::{group_by_station, Ticket};
use tavola_core::validation::validate_id;
use tavola_core::{
    CoreError, LinkedEntity, LinkedKind, Money, Order, OrderDetail, OrderItem, OrderItemAddOn,
    OrderStatus, OrderType, PaymentMethod, PaymentStatus, ValidationError,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::repository::{OrderRepository, PartyRepository, PaymentRepository};
use crate::service::sessions::SessionManager;
use crate::service::stock::StockLedger;
use crate::service::ServiceContext;

/// Where a new order belongs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderContext {
    pub order_type: OrderType,
    /// Required for dine-in; optional for take-away.
    #[serde(default)]
    pub table_id: Option<String>,
    /// Resolved store for a take-away order without a table.
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl OrderContext {
    pub fn dine_in(table_id: impl Into<String>) -> Self {
        OrderContext {
            order_type: OrderType::DineIn,
            table_id: Some(table_id.into()),
            store_id: None,
            customer_id: None,
            payment_method: None,
        }
    }

    pub fn take_away(store_id: impl Into<String>) -> Self {
        OrderContext {
            order_type: OrderType::TakeAway,
            table_id: None,
            store_id: Some(store_id.into()),
            customer_id: None,
            payment_method: None,
        }
    }
}

/// Placement of a new order after store and session resolution.
pub(crate) struct Placement {
    pub store_id: String,
    pub table_id: Option<String>,
    pub session_id: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub customer_id: Option<String>,
    pub payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone)]
pub struct OrderService {
    ctx: Arc<ServiceContext>,
    sessions: SessionManager,
    stock: StockLedger,
}

impl OrderService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        OrderService {
            sessions: SessionManager::new(ctx.clone()),
            stock: StockLedger::new(ctx.clone()),
            ctx,
        }
    }

    /// Creates a PENDING order, pricing every line from the catalog and
    /// consuming recipe stock. Dine-in orders join (or open) the table's
    /// active session.
    pub async fn create_order(
        &self,
        context: OrderContext,
        items: Vec<NewOrderItem>,
    ) -> EngineResult<OrderDetail> {
        validate_new_items(&items)?;

        let db = &self.ctx.db;
        let (context, items) = (&context, &items);
        db.with_retry("create_order", || async move {
            let mut tx = db.begin_write().await?;
            let order_id = self
                .create_in(tx.conn(), context, items, Utc::now())
                .await?;
            let detail = load_detail(tx.conn(), &order_id).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(detail)
        })
        .await
    }

    /// Applies add/update/remove operations plus an optional status move and
    /// payment-method hint, in one transaction.
    pub async fn update_order_items(
        &self,
        order_id: &str,
        ops: Vec<OrderItemOp>,
        status: Option<OrderStatus>,
        payment_method: Option<PaymentMethod>,
    ) -> EngineResult<OrderDetail> {
        validate_id("orderId", order_id)?;
        validate_ops(&ops)?;
        if ops.is_empty() && status.is_none() && payment_method.is_none() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }

        let db = &self.ctx.db;
        let ops = &ops;
        db.with_retry("update_order_items", || async move {
            let mut tx = db.begin_write().await?;
            self.update_in(tx.conn(), order_id, ops, status, payment_method, Utc::now())
                .await?;
            let detail = load_detail(tx.conn(), order_id).await?;
            tx.commit().await?;
            Ok::<_, EngineError>(detail)
        })
        .await
    }

    /// Deletes a PENDING order. Consumed stock is not returned.
    ///
    /// An open gateway payment on the order locks it; a cancelled one is
    /// removed together with the order.
    pub async fn delete_order(&self, order_id: &str) -> EngineResult<()> {
        validate_id("orderId", order_id)?;

        let db = &self.ctx.db;
        db.with_retry("delete_order", || async move {
            let mut tx = db.begin_write().await?;
            let order = fetch_order(tx.conn(), order_id).await?;
            ensure_deletable(&order.id, order.status)?;
            if let Some(payment) = PaymentRepository::for_order(tx.conn(), order_id).await? {
                let status = match payment.status {
                    PaymentStatus::Cancelled => None,
                    PaymentStatus::Pending => Some("payment pending"),
                    PaymentStatus::Paid | PaymentStatus::Credit => Some("payment settled"),
                };
                if let Some(status) = status {
                    return Err(CoreError::OrderLocked {
                        order_id: order.id.clone(),
                        status: status.to_string(),
                    }
                    .into());
                }
                PaymentRepository::delete(tx.conn(), &payment.id).await?;
            }
            OrderRepository::delete(tx.conn(), order_id).await?;
            tx.commit().await?;

            info!(order_id = %order_id, "Order deleted");
            Ok::<_, EngineError>(())
        })
        .await
    }

    /// Moves an order forward. COMPLETED is refused: only checkout completes.
    pub async fn transition(&self, order_id: &str, to: OrderStatus) -> EngineResult<Order> {
        validate_id("orderId", order_id)?;

        let db = &self.ctx.db;
        db.with_retry("transition_order", || async move {
            let mut tx = db.begin_write().await?;
            let order = fetch_order(tx.conn(), order_id).await?;
            check_transition(&order.id, order.status, to, None)?;
            let now = Utc::now();
            OrderRepository::set_status(tx.conn(), order_id, to, now).await?;
            let order = fetch_order(tx.conn(), order_id).await?;
            tx.commit().await?;

            info!(order_id = %order_id, status = %to, "Order status changed");
            Ok::<_, EngineError>(order)
        })
        .await
    }

    pub async fn get_order(&self, order_id: &str) -> EngineResult<OrderDetail> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        load_detail(&mut conn, order_id).await
    }

    /// Order lines grouped per preparation station, for the ticket printer.
    pub async fn kitchen_tickets(&self, order_id: &str) -> EngineResult<Vec<Ticket>> {
        let detail = self.get_order(order_id).await?;
        Ok(group_by_station(&detail))
    }

    // =========================================================================
    // In-transaction variants
    // =========================================================================

    async fn create_in(
        &self,
        conn: &mut SqliteConnection,
        context: &OrderContext,
        items: &[NewOrderItem],
        now: DateTime<Utc>,
    ) -> EngineResult<String> {
        if let Some(customer_id) = &context.customer_id {
            if PartyRepository::customer(conn, customer_id).await?.is_none() {
                return Err(CoreError::not_found("Customer", customer_id).into());
            }
        }

        let placement = match context.order_type {
            OrderType::DineIn => {
                let table_id = context.table_id.as_deref().ok_or_else(|| {
                    ValidationError::Required {
                        field: "tableId".to_string(),
                    }
                })?;
                let session = self.sessions.get_or_create_in(conn, table_id, now).await?;
                Placement {
                    store_id: session.store_id,
                    table_id: Some(table_id.to_string()),
                    session_id: Some(session.id),
                    order_type: OrderType::DineIn,
                    status: OrderStatus::Pending,
                    customer_id: context.customer_id.clone(),
                    payment_id: None,
                    payment_method: context.payment_method,
                }
            }
            OrderType::TakeAway => {
                let store_id = match (&context.table_id, &context.store_id) {
                    (Some(table_id), _) => self.ctx.stores.store_for_table(conn, table_id).await?,
                    (None, Some(store_id)) if !store_id.trim().is_empty() => store_id.clone(),
                    _ => {
                        return Err(CoreError::StoreResolution(
                            "take-away order names neither a table nor a store".to_string(),
                        )
                        .into())
                    }
                };
                Placement {
                    store_id,
                    table_id: context.table_id.clone(),
                    session_id: None,
                    order_type: OrderType::TakeAway,
                    status: OrderStatus::Pending,
                    customer_id: context.customer_id.clone(),
                    payment_id: None,
                    payment_method: context.payment_method,
                }
            }
        };

        let order_id = self.insert_order_in(conn, placement, items, false, now).await?;

        info!(order_id = %order_id, lines = items.len(), "Order created");
        Ok(order_id)
    }

    /// Inserts an order with its lines and consumes their recipe stock.
    ///
    /// With `comped`, every line is complimentary in full and totals zero.
    pub(crate) async fn insert_order_in(
        &self,
        conn: &mut SqliteConnection,
        placement: Placement,
        items: &[NewOrderItem],
        comped: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<String> {
        let order = Order {
            id: Uuid::new_v4().to_string(),
            store_id: placement.store_id,
            table_id: placement.table_id,
            session_id: placement.session_id,
            order_type: placement.order_type,
            status: placement.status,
            total_cents: 0,
            customer_id: placement.customer_id,
            payment_id: placement.payment_id,
            payment_method: placement.payment_method,
            created_at: now,
            updated_at: now,
        };
        OrderRepository::insert(conn, &order).await?;

        for request in items {
            let complimentary = if comped { request.quantity } else { 0 };
            let item = self
                .price_item(conn, &order, request, complimentary, now)
                .await?;
            OrderRepository::insert_item(conn, &item).await?;
            self.consume_for_new_item(conn, &item, now).await?;
        }

        OrderRepository::recompute_total(conn, &order.id, now).await?;
        Ok(order.id)
    }

    async fn update_in(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
        ops: &[OrderItemOp],
        status: Option<OrderStatus>,
        payment_method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let order = fetch_order(conn, order_id).await?;

        if order.status.is_terminal() {
            return Err(CoreError::OrderLocked {
                order_id: order.id.clone(),
                status: order.status.to_string(),
            }
            .into());
        }

        if !ops.is_empty() {
            ensure_editable(&order.id, order.status)?;

            for op in ops {
                match op {
                    OrderItemOp::Add(request) => {
                        let item = self.price_item(conn, &order, request, 0, now).await?;
                        OrderRepository::insert_item(conn, &item).await?;
                        self.consume_for_new_item(conn, &item, now).await?;
                    }
                    OrderItemOp::Update(update) => {
                        let current = fetch_item(conn, order_id, &update.item_id).await?;
                        let quantity = update.quantity.unwrap_or(current.quantity);
                        let complimentary = current.complimentary_quantity.min(quantity);

                        let add_ons = match &update.add_ons {
                            Some(requests) => {
                                let add_ons = self
                                    .price_add_ons(conn, &order.store_id, &current.id, requests)
                                    .await?;
                                OrderRepository::replace_add_ons(conn, &current.id, &add_ons)
                                    .await?;
                                add_ons
                            }
                            None => current.add_ons.clone(),
                        };

                        let prices: Vec<_> = add_ons
                            .iter()
                            .map(|a| (Money::from_cents(a.unit_price_cents), a.quantity))
                            .collect();
                        let total = line_total(current.unit_price(), quantity, complimentary, &prices);
                        OrderRepository::update_item_pricing(
                            conn,
                            &current.id,
                            quantity,
                            complimentary,
                            total.cents(),
                        )
                        .await?;

                        self.consume_for_growth(conn, &current, quantity, &add_ons, now)
                            .await?;
                    }
                    OrderItemOp::Remove(removal) => {
                        let current = fetch_item(conn, order_id, &removal.item_id).await?;
                        OrderRepository::delete_item(conn, &current.id).await?;
                    }
                }
            }

            if OrderRepository::items(conn, order_id).await?.is_empty() {
                return Err(ValidationError::Conflicting(format!(
                    "order {order_id} would have no items; delete the order instead"
                ))
                .into());
            }
        }

        let total = OrderRepository::recompute_total(conn, order_id, now).await?;

        if let Some(to) = status {
            if to != order.status {
                check_transition(&order.id, order.status, to, None)?;
                OrderRepository::set_status(conn, order_id, to, now).await?;
            }
        }
        if let Some(method) = payment_method {
            OrderRepository::set_payment_method(conn, order_id, method, now).await?;
        }

        info!(order_id = %order_id, ops = ops.len(), total_cents = total, "Order updated");
        Ok(())
    }

    // =========================================================================
    // Pricing & stock helpers
    // =========================================================================

    async fn price_item(
        &self,
        conn: &mut SqliteConnection,
        order: &Order,
        request: &NewOrderItem,
        complimentary: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<OrderItem> {
        let priced = self
            .ctx
            .catalog
            .resolve_target(conn, &order.store_id, &request.target)
            .await?;

        let item_id = Uuid::new_v4().to_string();
        let add_ons = self
            .price_add_ons(conn, &order.store_id, &item_id, &request.add_ons)
            .await?;
        let prices: Vec<_> = add_ons
            .iter()
            .map(|a| (Money::from_cents(a.unit_price_cents), a.quantity))
            .collect();
        let total = line_total(priced.unit_price, request.quantity, complimentary, &prices);

        Ok(OrderItem {
            id: item_id,
            order_id: order.id.clone(),
            target: priced.target,
            name: priced.name,
            quantity: request.quantity,
            unit_price_cents: priced.unit_price.cents(),
            total_price_cents: total.cents(),
            complimentary_quantity: complimentary,
            status: order.status,
            station: priced.station,
            add_ons,
            created_at: now,
        })
    }

    async fn price_add_ons(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        item_id: &str,
        requests: &[AddOnRequest],
    ) -> EngineResult<Vec<OrderItemAddOn>> {
        let mut add_ons = Vec::with_capacity(requests.len());
        for request in requests {
            let priced = self
                .ctx
                .catalog
                .resolve_add_on(conn, store_id, &request.add_on_id)
                .await?;
            add_ons.push(OrderItemAddOn {
                id: Uuid::new_v4().to_string(),
                order_item_id: item_id.to_string(),
                add_on_id: priced.add_on_id,
                name: priced.name,
                unit_price_cents: priced.unit_price.cents(),
                quantity: request.quantity,
            });
        }
        Ok(add_ons)
    }

    async fn consume_for_new_item(
        &self,
        conn: &mut SqliteConnection,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.stock
            .consume_recipe_in(conn, &item.target.as_linked(), item.quantity, Some(&item.id), now)
            .await?;
        for add_on in &item.add_ons {
            self.stock
                .consume_recipe_in(
                    conn,
                    &add_on_entity(&add_on.add_on_id),
                    add_on.quantity,
                    Some(&item.id),
                    now,
                )
                .await?;
        }
        Ok(())
    }

    /// Consumes stock for whatever an update added: extra units of the
    /// target and extra add-on quantity. Decreases give nothing back.
    async fn consume_for_growth(
        &self,
        conn: &mut SqliteConnection,
        before: &OrderItem,
        quantity: i64,
        add_ons: &[OrderItemAddOn],
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.stock
            .consume_recipe_in(
                conn,
                &before.target.as_linked(),
                quantity - before.quantity,
                Some(&before.id),
                now,
            )
            .await?;

        let mut previous: HashMap<&str, i64> = HashMap::new();
        for add_on in &before.add_ons {
            *previous.entry(add_on.add_on_id.as_str()).or_default() += add_on.quantity;
        }
        let mut current: HashMap<&str, i64> = HashMap::new();
        for add_on in add_ons {
            *current.entry(add_on.add_on_id.as_str()).or_default() += add_on.quantity;
        }

        let mut grown: Vec<(&str, i64)> = current
            .into_iter()
            .map(|(id, qty)| (id, qty - previous.get(id).copied().unwrap_or(0)))
            .filter(|(_, delta)| *delta > 0)
            .collect();
        grown.sort();

        for (add_on_id, delta) in grown {
            self.stock
                .consume_recipe_in(conn, &add_on_entity(add_on_id), delta, Some(&before.id), now)
                .await?;
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn add_on_entity(add_on_id: &str) -> LinkedEntity {
    LinkedEntity {
        kind: LinkedKind::AddOn,
        id: add_on_id.to_string(),
    }
}

pub(crate) async fn fetch_order(conn: &mut SqliteConnection, order_id: &str) -> EngineResult<Order> {
    OrderRepository::fetch(conn, order_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Order", order_id).into())
}

async fn fetch_item(
    conn: &mut SqliteConnection,
    order_id: &str,
    item_id: &str,
) -> EngineResult<OrderItem> {
    OrderRepository::item(conn, order_id, item_id)
        .await?
        .ok_or_else(|| CoreError::not_found("OrderItem", item_id).into())
}

pub(crate) async fn load_detail(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> EngineResult<OrderDetail> {
    let order = fetch_order(conn, order_id).await?;
    let items = OrderRepository::items(conn, order_id).await?;
    Ok(OrderDetail { order, items })
}
