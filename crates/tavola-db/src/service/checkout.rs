//! # Checkout Engine
//!
//! Turns a table's open orders (or one take-away order) into a single
//! settled bill.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          checkout(request)                              │
//! │                                                                         │
//! │  1. RESOLVE BILL                                                       │
//! │     session id ──► that session                                        │
//! │     order id   ──► its session (dine-in) or the order (take-away)      │
//! │     table id   ──► active session                                      │
//! │                    └─ none: single open take-away order on the table   │
//! │                       └─ none: latest session (for the paid check)     │
//! │                                                                         │
//! │     existing payment PAID / CREDIT ──► "already paid", nothing written │
//! │     session closed or missing     ──► SESSION_NOT_FOUND                │
//! │                                                                         │
//! │  2. BRANCH ON METHOD FAMILY                                            │
//! │     ExternalGateway ──► payment PENDING + fresh transaction ref,       │
//! │                         request snapshot stored, redirect config out   │
//! │     Immediate(st)   ──► payment st (PAID / CREDIT), then finalize      │
//! │                                                                         │
//! │  3. FINALIZE (same transaction)                                        │
//! │     • complimentary overrides, line + order totals recomputed          │
//! │     • every open order COMPLETED with payment + customer               │
//! │     • extra free items ──► zero-total COMPLETED order                  │
//! │     • session closed with totals, table ACTIVE                         │
//! │     • customer: SALE, PAYMENT_IN (unless CREDIT), loyalty points       │
//! │                                                                         │
//! │  Any error drops the transaction: none of it happened.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Gateway Callbacks
//! The gateway branch writes nothing but the PENDING payment. The callback
//! later calls [`CheckoutEngine::confirm_gateway_payment`], which replays
//! the stored request through the same finalization, or
//! [`CheckoutEngine::cancel_gateway_payment`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tavola_core::order::{check_transition, line_total, validate_complimentary, NewOrderItem};
use tavola_core::payment::loyalty_points;
use tavola_core::validation::{validate_id, validate_payment_amount, validate_quantity, validate_totals};
use tavola_core::{
    CoreError, ItemTarget, LedgerEntryType, LedgerOwner, Money, Order, OrderStatus, OrderType,
    Payment, PaymentFamily, PaymentMethod, PaymentStatus, SessionTotals, TableSession,
    ValidationError,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, EngineError, EngineResult};
use crate::repository::{OrderRepository, PartyRepository, PaymentRepository, TableRepository};
use crate::service::ledger::LedgerEngine;
use crate::service::orders::{fetch_order, OrderService, Placement};
use crate::service::sessions::SessionManager;
use crate::service::ServiceContext;

// =============================================================================
// Request & Outcome
// =============================================================================

/// A complimentary override for an existing order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplimentaryOverride {
    pub order_item_id: String,
    pub quantity: i64,
}

/// Something given away that was never ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraFreeItem {
    pub target: ItemTarget,
    pub quantity: i64,
}

/// Checkout input. Exactly what the front end posts.
///
/// ```json
/// {
///   "tableId": "t-4",
///   "paymentMethod": "CASH",
///   "amount": 60000,
///   "subtotal": 55000,
///   "tax": 5000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Parsed by the engine so unknown methods fail as `INVALID_METHOD`.
    pub payment_method: String,
    pub amount: Money,
    pub subtotal: Money,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub service_charge: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub complimentary_items: Vec<ComplimentaryOverride>,
    #[serde(default)]
    pub extra_free_items: Vec<ExtraFreeItem>,
}

impl CheckoutRequest {
    /// Cash-style request for `table_id` with only subtotal and tax.
    pub fn for_table(
        table_id: impl Into<String>,
        method: PaymentMethod,
        amount: Money,
        subtotal: Money,
        tax: Money,
    ) -> Self {
        CheckoutRequest {
            table_id: Some(table_id.into()),
            session_id: None,
            order_id: None,
            payment_method: method.as_str().to_string(),
            amount,
            subtotal,
            tax,
            service_charge: Money::zero(),
            discount: Money::zero(),
            customer_id: None,
            complimentary_items: Vec::new(),
            extra_free_items: Vec::new(),
        }
    }

    /// The bill this request points at. Session wins over order, order over table.
    pub fn target(&self) -> EngineResult<CheckoutTarget> {
        fn pick(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.trim().is_empty())
        }
        if let Some(id) = pick(&self.session_id) {
            Ok(CheckoutTarget::Session(id.to_string()))
        } else if let Some(id) = pick(&self.order_id) {
            Ok(CheckoutTarget::Order(id.to_string()))
        } else if let Some(id) = pick(&self.table_id) {
            Ok(CheckoutTarget::Table(id.to_string()))
        } else {
            Err(ValidationError::Required {
                field: "tableId, sessionId or orderId".to_string(),
            }
            .into())
        }
    }

    pub fn totals(&self) -> SessionTotals {
        SessionTotals {
            subtotal: self.subtotal,
            discount: self.discount,
            service_charge: self.service_charge,
            tax: self.tax,
        }
    }

    fn validate(&self) -> EngineResult<()> {
        validate_payment_amount(self.amount)?;
        validate_totals(&self.totals())?;
        if let Some(customer_id) = &self.customer_id {
            validate_id("customerId", customer_id)?;
        }
        for comp in &self.complimentary_items {
            validate_id("orderItemId", &comp.order_item_id)?;
            if comp.quantity < 0 {
                return Err(ValidationError::OutOfRange {
                    field: "complimentary quantity".to_string(),
                    min: 0,
                    max: i64::MAX,
                }
                .into());
            }
        }
        for free in &self.extra_free_items {
            validate_id("target id", free.target.id())?;
            validate_quantity(free.quantity)?;
        }
        Ok(())
    }
}

/// What a checkout is settling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    Session(String),
    Table(String),
    Order(String),
}

/// Redirect configuration handed to the payment gateway front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRedirect {
    pub payment_id: String,
    pub transaction_ref: String,
    pub amount: Money,
    pub redirect_url: String,
    pub success_url: String,
    pub failure_url: String,
    pub merchant_code: String,
}

/// Result of a finalized checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub payment: Payment,
    /// Closed session; `None` for take-away bills.
    pub session: Option<TableSession>,
    pub orders: Vec<Order>,
    /// Zero-total order holding the extra free items, if any.
    pub free_order: Option<Order>,
    pub loyalty_points_awarded: i64,
}

#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Settled now.
    Settled(Box<CheckoutReceipt>),
    /// Waiting for the gateway callback.
    Redirect(GatewayRedirect),
}

// =============================================================================
// Bill
// =============================================================================

/// The resolved thing being paid for.
#[derive(Debug)]
enum Bill {
    Session {
        session: TableSession,
        payment: Option<Payment>,
    },
    TakeAway {
        order: Order,
        payment: Option<Payment>,
    },
}

impl Bill {
    fn store_id(&self) -> &str {
        match self {
            Bill::Session { session, .. } => &session.store_id,
            Bill::TakeAway { order, .. } => &order.store_id,
        }
    }

    fn payment(&self) -> Option<&Payment> {
        match self {
            Bill::Session { payment, .. } | Bill::TakeAway { payment, .. } => payment.as_ref(),
        }
    }

    fn label(&self) -> String {
        match self {
            Bill::Session { session, .. } => format!("session {}", session.id),
            Bill::TakeAway { order, .. } => format!("order {}", order.id),
        }
    }

    /// A payment row for this bill, reusing the id of an unsettled attempt.
    fn payment_draft(
        &self,
        method: PaymentMethod,
        amount: Money,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Payment {
        let existing = self.payment();
        let (session_id, order_id) = match self {
            Bill::Session { session, .. } => (Some(session.id.clone()), None),
            Bill::TakeAway { order, .. } => (None, Some(order.id.clone())),
        };
        Payment {
            id: existing
                .map(|p| p.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            store_id: self.store_id().to_string(),
            session_id,
            order_id,
            method,
            amount_cents: amount.cents(),
            status,
            transaction_ref: None,
            checkout_snapshot: None,
            created_at: existing.map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}

fn ensure_unsettled(bill_label: &str, payment: Option<&Payment>) -> EngineResult<()> {
    match payment {
        Some(p) if p.status.is_settled() => Err(CoreError::AlreadyPaid {
            bill: bill_label.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone)]
pub struct CheckoutEngine {
    ctx: Arc<ServiceContext>,
    sessions: SessionManager,
    orders: OrderService,
    ledger: LedgerEngine,
}

impl CheckoutEngine {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        CheckoutEngine {
            sessions: SessionManager::new(ctx.clone()),
            orders: OrderService::new(ctx.clone()),
            ledger: LedgerEngine::new(ctx.clone()),
            ctx,
        }
    }

    /// Settles a bill, or opens a gateway payment for it.
    pub async fn checkout(&self, request: CheckoutRequest) -> EngineResult<CheckoutOutcome> {
        let method: PaymentMethod = request.payment_method.parse()?;
        let target = request.target()?;
        request.validate()?;

        let db = &self.ctx.db;
        let (request, target) = (&request, &target);
        db.with_retry("checkout", || async move {
            let mut tx = db.begin_write().await?;
            let outcome = self
                .checkout_in(tx.conn(), request, target, method, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(outcome)
        })
        .await
    }

    /// Gateway success callback: finalizes the stored checkout as PAID.
    pub async fn confirm_gateway_payment(
        &self,
        transaction_ref: &str,
    ) -> EngineResult<CheckoutReceipt> {
        validate_id("transactionRef", transaction_ref)?;

        let db = &self.ctx.db;
        db.with_retry("confirm_gateway_payment", || async move {
            let mut tx = db.begin_write().await?;
            let receipt = self
                .confirm_in(tx.conn(), transaction_ref, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(receipt)
        })
        .await
    }

    /// Gateway failure callback or operator abort: PENDING → CANCELLED.
    pub async fn cancel_gateway_payment(&self, transaction_ref: &str) -> EngineResult<Payment> {
        validate_id("transactionRef", transaction_ref)?;

        let db = &self.ctx.db;
        db.with_retry("cancel_gateway_payment", || async move {
            let mut tx = db.begin_write().await?;
            let payment = pending_gateway_payment(tx.conn(), transaction_ref).await?;
            let now = Utc::now();
            PaymentRepository::settle_pending(tx.conn(), &payment.id, PaymentStatus::Cancelled, now)
                .await?;
            let payment = PaymentRepository::by_transaction_ref(tx.conn(), transaction_ref)
                .await?
                .ok_or_else(|| CoreError::not_found("Payment", transaction_ref))?;
            tx.commit().await?;

            info!(payment_id = %payment.id, transaction_ref = %transaction_ref, "Gateway payment cancelled");
            Ok::<_, EngineError>(payment)
        })
        .await
    }

    pub async fn payment_for_session(&self, session_id: &str) -> EngineResult<Option<Payment>> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        Ok(PaymentRepository::for_session(&mut conn, session_id).await?)
    }

    // =========================================================================
    // Unit of work
    // =========================================================================

    async fn checkout_in(
        &self,
        conn: &mut SqliteConnection,
        request: &CheckoutRequest,
        target: &CheckoutTarget,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> EngineResult<CheckoutOutcome> {
        let bill = self.resolve_bill(conn, target).await?;

        match method.family() {
            PaymentFamily::ExternalGateway => {
                let redirect = self.open_gateway_payment(conn, &bill, request, method, now).await?;
                Ok(CheckoutOutcome::Redirect(redirect))
            }
            PaymentFamily::Immediate(status) => {
                let payment = bill.payment_draft(method, request.amount, status, now);
                PaymentRepository::upsert(conn, &payment).await?;
                let receipt = self.finalize_in(conn, bill, payment, request, now).await?;
                Ok(CheckoutOutcome::Settled(Box::new(receipt)))
            }
        }
    }

    async fn resolve_bill(
        &self,
        conn: &mut SqliteConnection,
        target: &CheckoutTarget,
    ) -> EngineResult<Bill> {
        match target {
            CheckoutTarget::Session(session_id) => self.session_bill(conn, session_id).await,
            CheckoutTarget::Order(order_id) => {
                let order = fetch_order(conn, order_id).await?;
                match (&order.order_type, &order.session_id) {
                    (OrderType::DineIn, Some(session_id)) => {
                        let session_id = session_id.clone();
                        self.session_bill(conn, &session_id).await
                    }
                    _ => self.take_away_bill(conn, order).await,
                }
            }
            CheckoutTarget::Table(table_id) => {
                let store = self.ctx.stores.store_for_table(conn, table_id).await?;

                if let Some(session) = TableRepository::active_session(conn, table_id).await? {
                    return self.session_bill(conn, &session.id).await;
                }

                let mut open = OrderRepository::open_take_away_for_table(conn, table_id).await?;
                match open.len() {
                    0 => {}
                    1 => {
                        let order = open.remove(0);
                        return self.take_away_bill(conn, order).await;
                    }
                    n => {
                        return Err(ValidationError::Conflicting(format!(
                            "table {table_id} has {n} open take-away orders; check out by orderId"
                        ))
                        .into())
                    }
                }

                // Nothing open: a repeat checkout must still say "already paid".
                if let Some(latest) = TableRepository::latest_session(conn, table_id).await? {
                    let payment = PaymentRepository::for_session(conn, &latest.id).await?;
                    ensure_unsettled(&format!("session {}", latest.id), payment.as_ref())?;
                }

                warn!(table_id = %table_id, store_id = %store, "Checkout found no open bill");
                Err(CoreError::SessionNotFound(format!("table {table_id}")).into())
            }
        }
    }

    async fn session_bill(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> EngineResult<Bill> {
        let session = TableRepository::fetch_session(conn, session_id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(format!("session {session_id}")))?;

        let payment = PaymentRepository::for_session(conn, session_id).await?;
        ensure_unsettled(&format!("session {session_id}"), payment.as_ref())?;

        if !session.is_active {
            return Err(CoreError::SessionNotFound(format!("session {session_id}")).into());
        }

        self.ctx.stores.store_for_session(conn, session_id).await?;
        Ok(Bill::Session { session, payment })
    }

    async fn take_away_bill(&self, conn: &mut SqliteConnection, order: Order) -> EngineResult<Bill> {
        let payment = PaymentRepository::for_order(conn, &order.id).await?;
        ensure_unsettled(&format!("order {}", order.id), payment.as_ref())?;

        if order.status.is_terminal() {
            return Err(CoreError::OrderLocked {
                order_id: order.id.clone(),
                status: order.status.to_string(),
            }
            .into());
        }
        if order.store_id.trim().is_empty() {
            return Err(CoreError::StoreResolution(format!("order {} has no store", order.id)).into());
        }
        Ok(Bill::TakeAway { order, payment })
    }

    async fn open_gateway_payment(
        &self,
        conn: &mut SqliteConnection,
        bill: &Bill,
        request: &CheckoutRequest,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> EngineResult<GatewayRedirect> {
        let mut payment = bill.payment_draft(method, request.amount, PaymentStatus::Pending, now);
        let transaction_ref = Uuid::new_v4().to_string();
        payment.transaction_ref = Some(transaction_ref.clone());
        payment.checkout_snapshot = Some(serde_json::to_string(request)?);
        PaymentRepository::upsert(conn, &payment).await?;

        info!(
            payment_id = %payment.id,
            transaction_ref = %transaction_ref,
            bill = %bill.label(),
            amount = %request.amount,
            "Gateway payment opened"
        );

        let gateway = &self.ctx.settings.gateway;
        Ok(GatewayRedirect {
            payment_id: payment.id,
            transaction_ref,
            amount: request.amount,
            redirect_url: gateway.redirect_url.clone(),
            success_url: gateway.success_url.clone(),
            failure_url: gateway.failure_url.clone(),
            merchant_code: gateway.merchant_code.clone(),
        })
    }

    async fn confirm_in(
        &self,
        conn: &mut SqliteConnection,
        transaction_ref: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<CheckoutReceipt> {
        let pending = pending_gateway_payment(conn, transaction_ref).await?;
        let snapshot = pending.checkout_snapshot.as_deref().ok_or_else(|| {
            DbError::Internal(format!("payment {} has no checkout snapshot", pending.id))
        })?;
        let request: CheckoutRequest = serde_json::from_str(snapshot)?;

        let bill = self.resolve_bill(conn, &request.target()?).await?;
        match bill.payment() {
            Some(p) if p.id == pending.id => {}
            _ => {
                return Err(ValidationError::Conflicting(format!(
                    "transaction {transaction_ref} no longer matches its bill"
                ))
                .into())
            }
        }

        let mut payment = bill.payment_draft(pending.method, request.amount, PaymentStatus::Paid, now);
        payment.transaction_ref = pending.transaction_ref.clone();
        payment.checkout_snapshot = pending.checkout_snapshot.clone();
        PaymentRepository::upsert(conn, &payment).await?;

        self.finalize_in(conn, bill, payment, &request, now).await
    }

    /// Completes orders, closes the session and posts ledger effects.
    async fn finalize_in(
        &self,
        conn: &mut SqliteConnection,
        bill: Bill,
        payment: Payment,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<CheckoutReceipt> {
        let customer_id = request.customer_id.as_deref();
        if let Some(id) = customer_id {
            if PartyRepository::customer(conn, id).await?.is_none() {
                return Err(CoreError::not_found("Customer", id).into());
            }
        }

        let (session, orders) = match &bill {
            Bill::Session { session, .. } => (
                Some(session.clone()),
                OrderRepository::for_session(conn, &session.id).await?,
            ),
            Bill::TakeAway { order, .. } => (None, vec![order.clone()]),
        };

        self.apply_complimentary(conn, &orders, &request.complimentary_items, now)
            .await?;

        let mut completed = Vec::with_capacity(orders.len());
        for order in &orders {
            if order.status.is_terminal() {
                continue;
            }
            check_transition(&order.id, order.status, OrderStatus::Completed, Some(&payment.id))?;
            OrderRepository::recompute_total(conn, &order.id, now).await?;
            OrderRepository::complete(conn, &order.id, &payment.id, customer_id, now).await?;
            completed.push(fetch_order(conn, &order.id).await?);
        }

        let free_order = if request.extra_free_items.is_empty() {
            None
        } else {
            let placement = Placement {
                store_id: bill.store_id().to_string(),
                table_id: match &bill {
                    Bill::Session { session, .. } => Some(session.table_id.clone()),
                    Bill::TakeAway { order, .. } => order.table_id.clone(),
                },
                session_id: session.as_ref().map(|s| s.id.clone()),
                order_type: match &bill {
                    Bill::Session { .. } => OrderType::DineIn,
                    Bill::TakeAway { .. } => OrderType::TakeAway,
                },
                status: OrderStatus::Completed,
                customer_id: customer_id.map(str::to_string),
                payment_id: Some(payment.id.clone()),
                payment_method: Some(payment.method),
            };
            let items: Vec<NewOrderItem> = request
                .extra_free_items
                .iter()
                .map(|free| NewOrderItem {
                    target: free.target.clone(),
                    quantity: free.quantity,
                    add_ons: Vec::new(),
                })
                .collect();
            let order_id = self
                .orders
                .insert_order_in(conn, placement, &items, true, now)
                .await?;
            Some(fetch_order(conn, &order_id).await?)
        };

        let closed = match &session {
            Some(s) => Some(
                self.sessions
                    .close_in(conn, &s.id, &request.totals(), now)
                    .await?,
            ),
            None => None,
        };

        let mut points = 0;
        if let Some(id) = customer_id {
            points = self.post_customer_effects(conn, id, &payment, now).await?;
        }

        info!(
            payment_id = %payment.id,
            bill = %bill.label(),
            method = %payment.method,
            amount = %payment.amount(),
            orders = completed.len(),
            "Checkout finalized"
        );

        Ok(CheckoutReceipt {
            payment,
            session: closed,
            orders: completed,
            free_order,
            loyalty_points_awarded: points,
        })
    }

    async fn apply_complimentary(
        &self,
        conn: &mut SqliteConnection,
        orders: &[Order],
        overrides: &[ComplimentaryOverride],
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if overrides.is_empty() {
            return Ok(());
        }

        let wanted: HashMap<&str, i64> = overrides
            .iter()
            .map(|o| (o.order_item_id.as_str(), o.quantity))
            .collect();
        let mut applied: HashSet<&str> = HashSet::new();

        for order in orders.iter().filter(|o| !o.status.is_terminal()) {
            let mut touched = false;
            for item in OrderRepository::items(conn, &order.id).await? {
                let Some((&item_id, &complimentary)) = wanted.get_key_value(item.id.as_str())
                else {
                    continue;
                };
                validate_complimentary(item.quantity, complimentary)?;
                let total = line_total(
                    item.unit_price(),
                    item.quantity,
                    complimentary,
                    &item.add_on_prices(),
                );
                OrderRepository::update_item_pricing(
                    conn,
                    &item.id,
                    item.quantity,
                    complimentary,
                    total.cents(),
                )
                .await?;
                applied.insert(item_id);
                touched = true;
            }
            if touched {
                OrderRepository::recompute_total(conn, &order.id, now).await?;
            }
        }

        if let Some(missing) = wanted.keys().find(|id| !applied.contains(*id)) {
            return Err(CoreError::not_found("OrderItem", *missing).into());
        }
        Ok(())
    }

    /// SALE, then PAYMENT_IN unless on credit, then loyalty. Returns points awarded.
    async fn post_customer_effects(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> EngineResult<i64> {
        let amount = payment.amount();
        if !amount.is_positive() {
            return Ok(0);
        }

        let owner = LedgerOwner::customer(customer_id);
        self.ledger
            .post_in(conn, &owner, LedgerEntryType::Sale, amount, Some(&payment.id), now)
            .await?;
        if payment.method.records_payment_in() {
            self.ledger
                .post_in(conn, &owner, LedgerEntryType::PaymentIn, amount, Some(&payment.id), now)
                .await?;
        }

        let points = loyalty_points(amount, self.ctx.settings.cents_per_loyalty_point);
        if points > 0 {
            PartyRepository::add_loyalty_points(conn, customer_id, points).await?;
        }
        Ok(points)
    }
}

/// The PENDING gateway payment behind a transaction reference.
async fn pending_gateway_payment(
    conn: &mut SqliteConnection,
    transaction_ref: &str,
) -> EngineResult<Payment> {
    let payment = PaymentRepository::by_transaction_ref(conn, transaction_ref)
        .await?
        .ok_or_else(|| CoreError::not_found("Payment", transaction_ref))?;

    match payment.status {
        PaymentStatus::Pending => Ok(payment),
        PaymentStatus::Paid | PaymentStatus::Credit => Err(CoreError::AlreadyPaid {
            bill: payment
                .session_id
                .clone()
                .or_else(|| payment.order_id.clone())
                .unwrap_or_default(),
        }
        .into()),
        PaymentStatus::Cancelled => Err(ValidationError::Conflicting(format!(
            "gateway payment {transaction_ref} was cancelled"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{code, count, dish, services, stock_qty, table_status};
    use crate::service::{OrderContext, Services};

    fn cash(table_id: &str, amount: i64, subtotal: i64, tax: i64) -> CheckoutRequest {
        CheckoutRequest::for_table(
            table_id,
            PaymentMethod::Cash,
            Money::from_cents(amount),
            Money::from_cents(subtotal),
            Money::from_cents(tax),
        )
    }

    fn settled(outcome: CheckoutOutcome) -> CheckoutReceipt {
        match outcome {
            CheckoutOutcome::Settled(receipt) => *receipt,
            CheckoutOutcome::Redirect(r) => panic!("expected settlement, got redirect {r:?}"),
        }
    }

    async fn two_colas(services: &Services, table_id: &str) -> Order {
        services
            .orders
            .create_order(OrderContext::dine_in(table_id), vec![dish("d-cola", 2)])
            .await
            .unwrap()
            .order
    }

    #[tokio::test]
    async fn test_cash_checkout_settles_table() {
        let (db, services) = services().await;
        let order = two_colas(&services, "t1").await;
        assert_eq!(order.total_cents, 600);
        assert_eq!(table_status(&db, "t1").await, "occupied");

        let receipt = settled(services.checkout.checkout(cash("t1", 600, 550, 50)).await.unwrap());

        assert_eq!(receipt.payment.status, PaymentStatus::Paid);
        assert_eq!(receipt.payment.amount_cents, 600);
        assert_eq!(receipt.orders.len(), 1);
        assert_eq!(receipt.orders[0].status, OrderStatus::Completed);
        assert_eq!(receipt.orders[0].payment_id.as_deref(), Some(receipt.payment.id.as_str()));
        let session = receipt.session.unwrap();
        assert!(!session.is_active);
        assert_eq!(session.grand_total_cents, 600);
        assert_eq!(table_status(&db, "t1").await, "active");
    }

    #[tokio::test]
    async fn test_repeat_checkout_is_already_paid() {
        let (db, services) = services().await;
        two_colas(&services, "t1").await;
        let mut request = cash("t1", 600, 550, 50);
        request.customer_id = Some("cu1".to_string());

        services.checkout.checkout(request.clone()).await.unwrap();
        let entries = count(&db, "SELECT COUNT(*) FROM ledger_entries").await;
        assert_eq!(entries, 2);

        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "ALREADY_PAID");
        assert_eq!(err.to_string(), "already paid");
        assert_eq!(count(&db, "SELECT COUNT(*) FROM ledger_entries").await, entries);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM payments").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_settle_once() {
        let (db, services) = services().await;
        two_colas(&services, "t1").await;

        let a = services.checkout.clone();
        let b = services.checkout.clone();
        let first = tokio::spawn(async move { a.checkout(cash("t1", 600, 600, 0)).await });
        let second = tokio::spawn(async move { b.checkout(cash("t1", 600, 600, 0)).await });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(code(err), "ALREADY_PAID");
        assert_eq!(count(&db, "SELECT COUNT(*) FROM payments").await, 1);
    }

    #[tokio::test]
    async fn test_customer_effects_cash_and_credit() {
        let (db, services) = services().await;
        let customer = LedgerOwner::customer("cu1");

        two_colas(&services, "t1").await;
        let mut request = cash("t1", 25_000, 25_000, 0);
        request.customer_id = Some("cu1".to_string());
        let receipt = settled(services.checkout.checkout(request).await.unwrap());
        assert_eq!(receipt.loyalty_points_awarded, 250);
        assert_eq!(receipt.orders[0].customer_id.as_deref(), Some("cu1"));
        assert_eq!(services.ledger.due_amount(&customer).await.unwrap().cents(), 0);

        two_colas(&services, "t2").await;
        let mut request = cash("t2", 600, 600, 0);
        request.payment_method = "credit".to_string();
        request.customer_id = Some("cu1".to_string());
        let receipt = settled(services.checkout.checkout(request).await.unwrap());
        assert_eq!(receipt.payment.status, PaymentStatus::Credit);
        assert_eq!(receipt.loyalty_points_awarded, 6);

        let entries = services.ledger.entries(&customer).await.unwrap();
        let types: Vec<LedgerEntryType> = entries.iter().map(|e| e.entry_type).collect();
        assert_eq!(
            types,
            vec![LedgerEntryType::Sale, LedgerEntryType::PaymentIn, LedgerEntryType::Sale]
        );
        assert_eq!(services.ledger.due_amount(&customer).await.unwrap().cents(), 600);
        assert_eq!(
            count(&db, "SELECT loyalty_points FROM customers WHERE id = 'cu1'").await,
            256
        );
    }

    #[tokio::test]
    async fn test_loyalty_one_point_per_hundred() {
        let (db, services) = services().await;
        two_colas(&services, "t1").await;
        let mut request = cash("t1", 600, 550, 50);
        request.customer_id = Some("cu1".to_string());

        let receipt = settled(services.checkout.checkout(request).await.unwrap());

        assert_eq!(receipt.loyalty_points_awarded, 6);
        assert_eq!(
            count(&db, "SELECT loyalty_points FROM customers WHERE id = 'cu1'").await,
            6
        );
    }

    #[tokio::test]
    async fn test_complimentary_and_free_items() {
        let (db, services) = services().await;
        let detail = services
            .orders
            .create_order(OrderContext::dine_in("t1"), vec![dish("d-burger", 2)])
            .await
            .unwrap();
        let burger_line = detail.items[0].id.clone();

        let mut request = cash("t1", 1200, 1200, 0);
        request.complimentary_items = vec![ComplimentaryOverride {
            order_item_id: burger_line,
            quantity: 1,
        }];
        request.extra_free_items = vec![ExtraFreeItem {
            target: ItemTarget::Dish("d-cola".to_string()),
            quantity: 1,
        }];
        let receipt = settled(services.checkout.checkout(request).await.unwrap());

        assert_eq!(receipt.orders[0].total_cents, 1200);
        let free = receipt.free_order.unwrap();
        assert_eq!(free.total_cents, 0);
        assert_eq!(free.status, OrderStatus::Completed);
        assert_eq!(free.payment_id.as_deref(), Some(receipt.payment.id.as_str()));
        assert_eq!(free.session_id, receipt.session.map(|s| s.id));
        assert_eq!(stock_qty(&db, "st-syrup").await, 90);
    }

    #[tokio::test]
    async fn test_complimentary_skips_cancelled_orders() {
        let (db, services) = services().await;
        let kept = services
            .orders
            .create_order(OrderContext::dine_in("t1"), vec![dish("d-burger", 1)])
            .await
            .unwrap();
        let cancelled = services
            .orders
            .create_order(OrderContext::dine_in("t1"), vec![dish("d-cola", 1)])
            .await
            .unwrap();
        services
            .orders
            .transition(&cancelled.order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let mut request = cash("t1", 1200, 1200, 0);
        request.complimentary_items = vec![ComplimentaryOverride {
            order_item_id: cancelled.items[0].id.clone(),
            quantity: 1,
        }];
        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "NOT_FOUND");
        let line = &services.orders.get_order(&cancelled.order.id).await.unwrap().items[0];
        assert_eq!(line.complimentary_quantity, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM payments").await, 0);

        let mut request = cash("t1", 0, 0, 0);
        request.complimentary_items = vec![ComplimentaryOverride {
            order_item_id: kept.items[0].id.clone(),
            quantity: 1,
        }];
        let receipt = settled(services.checkout.checkout(request).await.unwrap());
        assert_eq!(receipt.orders.len(), 1);
        assert_eq!(receipt.orders[0].id, kept.order.id);
        assert_eq!(receipt.orders[0].total_cents, 0);
    }

    #[tokio::test]
    async fn test_failed_checkout_changes_nothing() {
        let (db, services) = services().await;
        let order = two_colas(&services, "t1").await;

        let mut request = cash("t1", 600, 600, 0);
        request.complimentary_items = vec![ComplimentaryOverride {
            order_item_id: "no-such-line".to_string(),
            quantity: 1,
        }];
        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "NOT_FOUND");

        let order = services.orders.get_order(&order.id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM payments").await, 0);
        assert_eq!(table_status(&db, "t1").await, "occupied");
        assert!(services.sessions.active_session_for_table("t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_request_rejections() {
        let (_db, services) = services().await;
        two_colas(&services, "t1").await;

        let mut request = cash("t1", 600, 600, 0);
        request.payment_method = "BITCOIN".to_string();
        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "INVALID_METHOD");

        let mut request = cash("t1", 600, 600, 0);
        request.table_id = None;
        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        let err = services.checkout.checkout(cash("t1", -1, 600, 0)).await.unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        let err = services.checkout.checkout(cash("t2", 600, 600, 0)).await.unwrap_err();
        assert_eq!(code(&err), "SESSION_NOT_FOUND");

        let mut request = cash("t1", 600, 600, 0);
        request.customer_id = Some("ghost".to_string());
        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_oversized_totals_change_nothing() {
        let (db, services) = services().await;
        let order = two_colas(&services, "t1").await;

        let err = services
            .checkout
            .checkout(cash("t1", 600, i64::MAX, 1))
            .await
            .unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        let err = services
            .checkout
            .checkout(cash("t1", i64::MAX, 600, 0))
            .await
            .unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        let order = services.orders.get_order(&order.id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM payments").await, 0);
        assert_eq!(table_status(&db, "t1").await, "occupied");
    }

    #[tokio::test]
    async fn test_take_away_checkout_by_order_and_by_table() {
        let (_db, services) = services().await;

        let by_order = services
            .orders
            .create_order(OrderContext::take_away("s1"), vec![dish("d-cola", 1)])
            .await
            .unwrap()
            .order;
        let mut request = cash("unused", 300, 300, 0);
        request.table_id = None;
        request.order_id = Some(by_order.id.clone());
        let receipt = settled(services.checkout.checkout(request.clone()).await.unwrap());
        assert!(receipt.session.is_none());
        assert_eq!(receipt.payment.order_id.as_deref(), Some(by_order.id.as_str()));
        assert_eq!(receipt.orders[0].status, OrderStatus::Completed);

        let err = services.checkout.checkout(request).await.unwrap_err();
        assert_eq!(code(&err), "ALREADY_PAID");

        let mut at_table = OrderContext::take_away("s1");
        at_table.table_id = Some("t2".to_string());
        let by_table = services
            .orders
            .create_order(at_table, vec![dish("d-cola", 1)])
            .await
            .unwrap()
            .order;
        let receipt = settled(services.checkout.checkout(cash("t2", 300, 300, 0)).await.unwrap());
        assert_eq!(receipt.orders[0].id, by_table.id);
    }

    #[tokio::test]
    async fn test_gateway_confirm() {
        let (db, services) = services().await;
        two_colas(&services, "t1").await;
        let mut request = cash("t1", 600, 600, 0);
        request.payment_method = "GATEWAY".to_string();

        let redirect = match services.checkout.checkout(request.clone()).await.unwrap() {
            CheckoutOutcome::Redirect(redirect) => redirect,
            CheckoutOutcome::Settled(_) => panic!("gateway must not settle immediately"),
        };
        assert_eq!(redirect.amount.cents(), 600);
        assert_eq!(table_status(&db, "t1").await, "occupied");
        let pending = services
            .checkout
            .payment_for_session(&services.sessions.active_session_for_table("t1").await.unwrap().unwrap().id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);

        // A retry before the callback hands out a fresh reference on the same payment.
        let retry = match services.checkout.checkout(request).await.unwrap() {
            CheckoutOutcome::Redirect(redirect) => redirect,
            CheckoutOutcome::Settled(_) => panic!("gateway must not settle immediately"),
        };
        assert_eq!(retry.payment_id, redirect.payment_id);
        assert_ne!(retry.transaction_ref, redirect.transaction_ref);

        let err = services
            .checkout
            .confirm_gateway_payment(&redirect.transaction_ref)
            .await
            .unwrap_err();
        assert_eq!(code(&err), "NOT_FOUND");

        let receipt = services
            .checkout
            .confirm_gateway_payment(&retry.transaction_ref)
            .await
            .unwrap();
        assert_eq!(receipt.payment.status, PaymentStatus::Paid);
        assert_eq!(receipt.payment.method, PaymentMethod::Gateway);
        assert_eq!(receipt.orders[0].status, OrderStatus::Completed);
        assert_eq!(table_status(&db, "t1").await, "active");

        let err = services
            .checkout
            .confirm_gateway_payment(&retry.transaction_ref)
            .await
            .unwrap_err();
        assert_eq!(code(&err), "ALREADY_PAID");
    }

    #[tokio::test]
    async fn test_gateway_cancel_then_pay_cash() {
        let (_db, services) = services().await;
        two_colas(&services, "t1").await;
        let mut request = cash("t1", 600, 600, 0);
        request.payment_method = "GATEWAY".to_string();

        let CheckoutOutcome::Redirect(redirect) = services.checkout.checkout(request).await.unwrap()
        else {
            panic!("expected redirect");
        };

        let cancelled = services
            .checkout
            .cancel_gateway_payment(&redirect.transaction_ref)
            .await
            .unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);

        let err = services
            .checkout
            .confirm_gateway_payment(&redirect.transaction_ref)
            .await
            .unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        let receipt = settled(services.checkout.checkout(cash("t1", 600, 600, 0)).await.unwrap());
        assert_eq!(receipt.payment.id, redirect.payment_id);
        assert_eq!(receipt.payment.status, PaymentStatus::Paid);
        assert_eq!(receipt.payment.method, PaymentMethod::Cash);
    }

    #[test]
    fn test_request_target_priority() {
        let mut request = cash("t1", 0, 0, 0);
        assert_eq!(request.target().unwrap(), CheckoutTarget::Table("t1".into()));
        request.order_id = Some("o1".into());
        assert_eq!(request.target().unwrap(), CheckoutTarget::Order("o1".into()));
        request.session_id = Some("s-9".into());
        assert_eq!(request.target().unwrap(), CheckoutTarget::Session("s-9".into()));
        request.session_id = Some("  ".into());
        assert_eq!(request.target().unwrap(), CheckoutTarget::Order("o1".into()));
        request.order_id = None;
        request.table_id = Some(String::new());
        assert!(request.target().is_err());
    }

    #[test]
    fn test_request_wire_shape() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{
                "tableId": "t1",
                "paymentMethod": "CASH",
                "amount": 60000,
                "subtotal": 55000,
                "tax": 5000,
                "extraFreeItems": [{ "target": { "kind": "dish", "id": "d-cola" }, "quantity": 1 }]
            }"#,
        )
        .unwrap();

        assert_eq!(request.totals().grand_total().cents(), 60000);
        assert!(request.service_charge.is_zero());
        assert_eq!(request.extra_free_items[0].target, ItemTarget::Dish("d-cola".into()));
    }
}
