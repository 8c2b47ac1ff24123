//! # Domain Types
//!
//! Records shared by the order, stock, checkout and ledger flows.
//!
//! ## Entity Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Store ──┬── DiningTable ──< TableSession ──< Order ──< OrderItem       │
//! │          │        (≤1 active session)          │          │             │
//! │          │                                     │          └─< add-ons   │
//! │          │                                     ▼                        │
//! │          │                                  Payment (1 per session)     │
//! │          │                                                              │
//! │          ├── Dish / Combo / AddOn ──< RecipeLine ──► StockItem          │
//! │          │                                             │                │
//! │          │                                   StockConsumption           │
//! │          │                                                              │
//! │          ├── Supplier ──< Purchase ──< PurchaseItem ──► StockItem       │
//! │          │                                                              │
//! │          └── Customer / Supplier ──< LedgerEntry                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::order::{OrderStatus, OrderType};
use crate::payment::{PaymentMethod, PaymentStatus};

// =============================================================================
// Tables & Sessions
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    /// Free for new guests.
    Active,
    /// Has an open session.
    Occupied,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DiningTable {
    pub id: String,
    /// Owning store; tables imported without one fail store resolution.
    pub store_id: Option<String>,
    pub name: String,
    pub capacity: i64,
    pub status: TableStatus,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// The open tab of a dine-in table.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TableSession {
    pub id: String,
    pub table_id: String,
    pub store_id: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub service_charge_cents: i64,
    pub tax_cents: i64,
    pub grand_total_cents: i64,
}

impl TableSession {
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }
}

/// Figures persisted on a session when it is closed.
///
/// Tax and service charge are computed by the caller; this type only
/// carries them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub subtotal: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub service_charge: Money,
    #[serde(default)]
    pub tax: Money,
}

impl SessionTotals {
    /// `subtotal − discount + service_charge + tax`
    pub fn grand_total(&self) -> Money {
        self.subtotal - self.discount + self.service_charge + self.tax
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// What an order line points at: a dish or a combo.
///
/// Both price and consume stock the same way; storage and lookup differ.
///
/// ```json
/// { "kind": "dish", "id": "2f6c..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemTarget {
    Dish(String),
    Combo(String),
}

impl ItemTarget {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        match kind {
            TargetKind::Dish => ItemTarget::Dish(id.into()),
            TargetKind::Combo => ItemTarget::Combo(id.into()),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            ItemTarget::Dish(_) => TargetKind::Dish,
            ItemTarget::Combo(_) => TargetKind::Combo,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ItemTarget::Dish(id) | ItemTarget::Combo(id) => id,
        }
    }

    /// The same entity seen as a stock-consumption link.
    pub fn as_linked(&self) -> LinkedEntity {
        LinkedEntity {
            kind: match self {
                ItemTarget::Dish(_) => LinkedKind::Dish,
                ItemTarget::Combo(_) => LinkedKind::Combo,
            },
            id: self.id().to_string(),
        }
    }
}

impl fmt::Display for ItemTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Storage discriminant of [`ItemTarget`].
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Dish,
    Combo,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Dish => f.write_str("Dish"),
            TargetKind::Combo => f.write_str("Combo"),
        }
    }
}

/// Where a line is prepared. Routes tickets only.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Station {
    Kitchen,
    Bar,
}

/// A catalog target resolved to what an order line needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedTarget {
    pub target: ItemTarget,
    pub name: String,
    pub unit_price: Money,
    pub station: Station,
}

/// A resolved add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedAddOn {
    pub add_on_id: String,
    pub name: String,
    pub unit_price: Money,
}

/// Raw material used per unit of a dish, combo or add-on.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLine {
    pub stock_id: String,
    pub quantity: i64,
}

// =============================================================================
// Orders
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub store_id: String,
    pub table_id: Option<String>,
    pub session_id: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Always the sum of the items' totals.
    pub total_cents: i64,
    pub customer_id: Option<String>,
    pub payment_id: Option<String>,
    /// Method the guest intends to pay with; settlement records the real one.
    pub payment_method: Option<PaymentMethod>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub target: ItemTarget,
    /// Name snapshot at the time the line was added.
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub complimentary_quantity: i64,
    pub status: OrderStatus,
    pub station: Station,
    pub add_ons: Vec<OrderItemAddOn>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    /// `(unit_price, quantity)` pairs for [`crate::order::line_total`].
    pub fn add_on_prices(&self) -> Vec<(Money, i64)> {
        self.add_ons
            .iter()
            .map(|a| (Money::from_cents(a.unit_price_cents), a.quantity))
            .collect()
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemAddOn {
    pub id: String,
    pub order_item_id: String,
    pub add_on_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

/// An order with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Stock
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub id: String,
    pub store_id: String,
    pub name: String,
    /// Base unit of `quantity` (g, ml, pcs).
    pub unit: String,
    /// Never negative.
    pub quantity: i64,
    /// Book value of what is on hand.
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Book value of `quantity` units at the average cost on hand, floored.
    ///
    /// Taking everything on hand takes the whole value.
    pub fn value_of(&self, quantity: i64) -> Money {
        if quantity <= 0 || self.quantity <= 0 || self.amount_cents <= 0 {
            return Money::zero();
        }
        if quantity >= self.quantity {
            return Money::from_cents(self.amount_cents);
        }
        let share =
            i128::from(self.amount_cents) * i128::from(quantity) / i128::from(self.quantity);
        Money::from_cents(i64::try_from(share).unwrap_or(self.amount_cents))
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LinkedKind {
    Dish,
    Combo,
    AddOn,
}

/// Catalog entity a stock consumption is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEntity {
    pub kind: LinkedKind,
    pub id: String,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockConsumption {
    pub id: String,
    pub stock_id: String,
    pub quantity: i64,
    pub linked_kind: LinkedKind,
    pub linked_id: String,
    /// Set when the consumption came from an order line's recipe.
    pub order_item_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchases
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub store_id: String,
    pub supplier_id: String,
    pub total_cents: i64,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Purchase {
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub stock_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

impl PurchaseItem {
    pub fn line_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// A line of a purchase being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLine {
    pub stock_id: String,
    pub quantity: i64,
    pub unit_cost: Money,
}

// =============================================================================
// Parties
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub loyalty_points: i64,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: String,
    pub store_id: String,
    pub name: String,
}

// =============================================================================
// Payments
// =============================================================================

/// The single settlement record of a session (or of a take-away order).
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub store_id: String,
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    /// Gateway transaction reference, fresh per redirect.
    pub transaction_ref: Option<String>,
    /// Deferred checkout request replayed by the gateway callback.
    #[serde(skip)]
    pub checkout_snapshot: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_target_wire_format() {
        let target = ItemTarget::Combo("c-9".to_string());
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"kind":"combo","id":"c-9"}"#);

        let back: ItemTarget = serde_json::from_str(r#"{"kind":"dish","id":"d-1"}"#).unwrap();
        assert_eq!(back.kind(), TargetKind::Dish);
        assert_eq!(back.id(), "d-1");
    }

    #[test]
    fn test_item_target_as_linked() {
        let linked = ItemTarget::Dish("d-1".into()).as_linked();
        assert_eq!(linked.kind, LinkedKind::Dish);
        assert_eq!(linked.id, "d-1");
    }

    #[test]
    fn test_session_grand_total() {
        let totals = SessionTotals {
            subtotal: Money::from_cents(60000),
            discount: Money::from_cents(5000),
            service_charge: Money::from_cents(5500),
            tax: Money::from_cents(7865),
        };
        assert_eq!(totals.grand_total().cents(), 68365);
    }

    #[test]
    fn test_stock_value_of() {
        let bun = StockItem {
            id: "st-bun".into(),
            store_id: "s1".into(),
            name: "Bun".into(),
            unit: "pcs".into(),
            quantity: 3,
            amount_cents: 1000,
            updated_at: Utc::now(),
        };
        assert_eq!(bun.value_of(1).cents(), 333);
        assert_eq!(bun.value_of(3).cents(), 1000);
        assert_eq!(bun.value_of(0).cents(), 0);

        let big = StockItem {
            quantity: 1_000_000_000,
            amount_cents: 1_000_000_000_000,
            ..bun
        };
        assert_eq!(big.value_of(999_999_999).cents(), 999_999_999_000);
    }

    #[test]
    fn test_session_totals_defaults() {
        let totals: SessionTotals = serde_json::from_str(r#"{"subtotal":600}"#).unwrap();
        assert_eq!(totals.grand_total().cents(), 600);
    }
}
