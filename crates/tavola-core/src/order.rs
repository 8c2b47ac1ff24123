//! # Order State Machine
//!
//! Status transitions, edit guards and line pricing for restaurant orders.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Order Lifecycle                                  │
//! │                                                                         │
//! │  PENDING ──► PREPARING ──► READYTOPICK ──► SERVED ──► COMPLETED        │
//! │     │                                                   (checkout      │
//! │     │                                                    only, needs   │
//! │     ▼                                                    a payment)    │
//! │  CANCELLED                                                             │
//! │                                                                         │
//! │  • Forward-only; skipping ahead is allowed (take-away: PENDING→SERVED) │
//! │  • CANCELLED only from PENDING                                         │
//! │  • Lines editable while PENDING or PREPARING                           │
//! │  • Delete only while PENDING                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Item status mirrors the order. The kitchen/bar station tag routes
//! tickets only and never affects transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::ItemTarget;
use crate::validation::{validate_quantity, ValidationResult};
use crate::MAX_ORDER_ITEMS;

// =============================================================================
// Order Type
// =============================================================================

/// Dine-in orders belong to a table session; take-away orders do not.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    DineIn,
    TakeAway,
}

// =============================================================================
// Order Status
// =============================================================================

/// Status of an order (and, mirrored, of its items).
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    #[serde(rename = "READYTOPICK")]
    ReadyToPick,
    Served,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Position on the forward path. CANCELLED sits off the path.
    fn rank(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Preparing => Some(1),
            OrderStatus::ReadyToPick => Some(2),
            OrderStatus::Served => Some(3),
            OrderStatus::Completed => Some(4),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyToPick => "READYTOPICK",
            OrderStatus::Served => "SERVED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED and CANCELLED admit no further change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Lines may be added, changed or removed.
    pub fn is_editable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Preparing)
    }

    /// Returns true if `next` is a legal move from `self`.
    ///
    /// ```rust
    /// use tavola_core::OrderStatus;
    ///
    /// assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Served));
    /// assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
    /// assert!(!OrderStatus::Served.can_transition_to(OrderStatus::Preparing));
    /// assert!(!OrderStatus::Preparing.can_transition_to(OrderStatus::Cancelled));
    /// ```
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(_), None) => self == OrderStatus::Pending,
            (Some(from), Some(to)) => to > from,
            (None, _) => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "READYTOPICK" => Ok(OrderStatus::ReadyToPick),
            "SERVED" => Ok(OrderStatus::Served),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec![
                    "PENDING".into(),
                    "PREPARING".into(),
                    "READYTOPICK".into(),
                    "SERVED".into(),
                    "COMPLETED".into(),
                    "CANCELLED".into(),
                ],
            }
            .into()),
        }
    }
}

// =============================================================================
// Guards
// =============================================================================

/// Checks a requested status move.
///
/// COMPLETED needs the payment that settles the order; only checkout has one.
pub fn check_transition(
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    payment_id: Option<&str>,
) -> CoreResult<()> {
    if to == OrderStatus::Completed && payment_id.is_none() {
        return Err(CoreError::PaymentRequired {
            order_id: order_id.to_string(),
        });
    }
    if !from.can_transition_to(to) {
        return Err(CoreError::InvalidTransition {
            order_id: order_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// Fails with `OrderLocked` unless lines may still change.
pub fn ensure_editable(order_id: &str, status: OrderStatus) -> CoreResult<()> {
    if status.is_editable() {
        Ok(())
    } else {
        Err(CoreError::OrderLocked {
            order_id: order_id.to_string(),
            status: status.to_string(),
        })
    }
}

/// Fails with `OrderLocked` unless the order is still PENDING.
pub fn ensure_deletable(order_id: &str, status: OrderStatus) -> CoreResult<()> {
    if status == OrderStatus::Pending {
        Ok(())
    } else {
        Err(CoreError::OrderLocked {
            order_id: order_id.to_string(),
            status: status.to_string(),
        })
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// Total for one order line.
///
/// `unit_price × (quantity − complimentary) + Σ(add_on.unit_price × add_on.quantity)`.
/// A fully complimentary line is free including its add-ons.
///
/// ```rust
/// use tavola_core::money::Money;
/// use tavola_core::order::line_total;
///
/// let addons = [(Money::from_cents(50), 2)];
/// assert_eq!(line_total(Money::from_cents(300), 2, 0, &addons).cents(), 700);
/// assert_eq!(line_total(Money::from_cents(300), 2, 1, &addons).cents(), 400);
/// assert_eq!(line_total(Money::from_cents(300), 2, 2, &addons).cents(), 0);
/// ```
pub fn line_total(
    unit_price: Money,
    quantity: i64,
    complimentary: i64,
    add_ons: &[(Money, i64)],
) -> Money {
    let billed = (quantity - complimentary).max(0);
    if billed == 0 {
        return Money::zero();
    }
    let add_on_total: Money = add_ons
        .iter()
        .map(|(price, qty)| price.multiply_quantity(*qty))
        .sum();
    unit_price.multiply_quantity(billed) + add_on_total
}

/// Checks a complimentary override against the line quantity.
pub fn validate_complimentary(quantity: i64, complimentary: i64) -> ValidationResult<()> {
    if complimentary < 0 || complimentary > quantity {
        return Err(ValidationError::OutOfRange {
            field: "complimentary quantity".to_string(),
            min: 0,
            max: quantity,
        });
    }
    Ok(())
}

// =============================================================================
// Order Requests
// =============================================================================

/// An add-on requested on a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AddOnRequest {
    pub add_on_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// A line to add to a new or existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub target: ItemTarget,
    pub quantity: i64,
    #[serde(default)]
    pub add_ons: Vec<AddOnRequest>,
}

/// Change to an existing line. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub item_id: String,
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Replaces the whole add-on set when present.
    #[serde(default)]
    pub add_ons: Option<Vec<AddOnRequest>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemRemoval {
    pub item_id: String,
}

/// One operation of an order mutation request, tagged by `action`.
///
/// ```json
/// { "action": "add", "target": { "kind": "dish", "id": "..." }, "quantity": 2 }
/// { "action": "update", "itemId": "...", "quantity": 3 }
/// { "action": "remove", "itemId": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OrderItemOp {
    Add(NewOrderItem),
    Update(ItemUpdate),
    Remove(ItemRemoval),
}

/// Validates lines for a new order: non-empty, bounded, sane quantities.
pub fn validate_new_items(items: &[NewOrderItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if items.len() > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }
    for item in items {
        validate_item(item)?;
    }
    Ok(())
}

/// Validates a single new line and its add-ons.
pub fn validate_item(item: &NewOrderItem) -> ValidationResult<()> {
    if item.target.id().trim().is_empty() {
        return Err(ValidationError::Required {
            field: "target id".to_string(),
        });
    }
    validate_quantity(item.quantity)?;
    validate_add_ons(&item.add_ons)
}

pub fn validate_add_ons(add_ons: &[AddOnRequest]) -> ValidationResult<()> {
    for add_on in add_ons {
        if add_on.add_on_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "addOnId".to_string(),
            });
        }
        validate_quantity(add_on.quantity)?;
    }
    Ok(())
}

/// Validates the shape of a mutation request before any row is touched.
pub fn validate_ops(ops: &[OrderItemOp]) -> ValidationResult<()> {
    if ops.len() > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 0,
            max: MAX_ORDER_ITEMS as i64,
        });
    }
    for op in ops {
        match op {
            OrderItemOp::Add(item) => validate_item(item)?,
            OrderItemOp::Update(update) => {
                if update.quantity.is_none() && update.add_ons.is_none() {
                    return Err(ValidationError::Conflicting(format!(
                        "update of item {} changes nothing",
                        update.item_id
                    )));
                }
                if let Some(qty) = update.quantity {
                    validate_quantity(qty)?;
                }
                if let Some(add_ons) = &update.add_ons {
                    validate_add_ons(add_ons)?;
                }
            }
            OrderItemOp::Remove(_) => {}
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(ReadyToPick));
        assert!(ReadyToPick.can_transition_to(Served));
        assert!(Served.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Served));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        use OrderStatus::*;
        assert!(!Served.can_transition_to(Pending));
        assert!(!Preparing.can_transition_to(Preparing));
        assert!(!Completed.can_transition_to(Served));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Served.can_transition_to(Cancelled));
    }

    #[test]
    fn test_completion_needs_payment() {
        let err = check_transition("o1", OrderStatus::Served, OrderStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentRequired { .. }));
        assert!(
            check_transition("o1", OrderStatus::Served, OrderStatus::Completed, Some("p1"))
                .is_ok()
        );
    }

    #[test]
    fn test_edit_and_delete_guards() {
        assert!(ensure_editable("o1", OrderStatus::Preparing).is_ok());
        assert!(matches!(
            ensure_editable("o1", OrderStatus::Served),
            Err(CoreError::OrderLocked { .. })
        ));
        assert!(ensure_deletable("o1", OrderStatus::Pending).is_ok());
        assert!(matches!(
            ensure_deletable("o1", OrderStatus::Preparing),
            Err(CoreError::OrderLocked { .. })
        ));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("READYTOPICK".parse::<OrderStatus>().unwrap(), OrderStatus::ReadyToPick);
        assert_eq!("ready_to_pick".parse::<OrderStatus>().unwrap(), OrderStatus::ReadyToPick);
        assert_eq!("served".parse::<OrderStatus>().unwrap(), OrderStatus::Served);
        assert!("eaten".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_wire_name() {
        let json = serde_json::to_string(&OrderStatus::ReadyToPick).unwrap();
        assert_eq!(json, "\"READYTOPICK\"");
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(Money::from_cents(300), 2, 0, &[]).cents(), 600);
        let addons = [(Money::from_cents(40), 1), (Money::from_cents(25), 2)];
        assert_eq!(line_total(Money::from_cents(300), 1, 0, &addons).cents(), 390);
    }

    #[test]
    fn test_validate_complimentary() {
        assert!(validate_complimentary(3, 0).is_ok());
        assert!(validate_complimentary(3, 3).is_ok());
        assert!(validate_complimentary(3, 4).is_err());
        assert!(validate_complimentary(3, -1).is_err());
    }

    #[test]
    fn test_validate_new_items() {
        assert!(validate_new_items(&[]).is_err());

        let good = NewOrderItem {
            target: ItemTarget::Dish("momo".into()),
            quantity: 2,
            add_ons: vec![],
        };
        assert!(validate_new_items(&[good.clone()]).is_ok());

        let zero = NewOrderItem {
            quantity: 0,
            ..good
        };
        assert!(validate_new_items(&[zero]).is_err());
    }

    #[test]
    fn test_item_op_wire_format() {
        let json = r#"[
            {"action":"add","target":{"kind":"combo","id":"c1"},"quantity":1},
            {"action":"update","itemId":"i1","quantity":3},
            {"action":"remove","itemId":"i2"}
        ]"#;
        let ops: Vec<OrderItemOp> = serde_json::from_str(json).unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], OrderItemOp::Add(i) if i.target == ItemTarget::Combo("c1".into())));
        assert!(matches!(&ops[1], OrderItemOp::Update(u) if u.quantity == Some(3)));
        assert!(validate_ops(&ops).is_ok());
    }

    #[test]
    fn test_empty_update_rejected() {
        let ops = vec![OrderItemOp::Update(ItemUpdate {
            item_id: "i1".into(),
            quantity: None,
            add_ons: None,
        })];
        assert!(validate_ops(&ops).is_err());
    }
}
