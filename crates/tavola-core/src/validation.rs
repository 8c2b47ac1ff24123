//! # Validation Module
//!
//! Input checks that run before any row is read or written.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: pos-server (serde)                                           │
//! │  └── Shape: required fields, enum spellings                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Values: quantities, amounts, ids                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  └── CHECK (quantity >= 0), UNIQUE, FOREIGN KEY                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PurchaseLine, SessionTotals};
use crate::{MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY, MAX_STOCK_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates an order-line quantity: `1..=MAX_ITEM_QUANTITY`.
///
/// ```rust
/// use tavola_core::validation::validate_quantity;
///
/// assert!(validate_quantity(2).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a raw-material quantity (grams, millilitres, pieces):
/// `1..=MAX_STOCK_QUANTITY`.
pub fn validate_stock_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "stock quantity".to_string(),
        });
    }
    if qty > MAX_STOCK_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "stock quantity".to_string(),
            min: 1,
            max: MAX_STOCK_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a non-negative money input: `0..=MAX_AMOUNT_CENTS`.
///
/// ```rust
/// use tavola_core::validation::validate_amount;
/// use tavola_core::Money;
///
/// assert!(validate_amount("tax", Money::zero()).is_ok());
/// assert!(validate_amount("tax", Money::from_cents(i64::MAX)).is_err());
/// ```
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() || amount.cents() > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates a settlement amount. Zero is allowed (fully comped bills).
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    validate_amount("amount", amount)
}

/// Validates checkout totals: every component within `0..=MAX_AMOUNT_CENTS`.
pub fn validate_totals(totals: &SessionTotals) -> ValidationResult<()> {
    let parts = [
        ("subtotal", totals.subtotal),
        ("discount", totals.discount),
        ("serviceCharge", totals.service_charge),
        ("tax", totals.tax),
    ];
    for (field, value) in parts {
        validate_amount(field, value)?;
    }
    Ok(())
}

/// Validates purchase lines: at least one, bounded quantities and costs,
/// and a purchase total no larger than `MAX_AMOUNT_CENTS`.
pub fn validate_purchase_lines(lines: &[PurchaseLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }
    let total_out_of_range = || ValidationError::OutOfRange {
        field: "purchase total".to_string(),
        min: 0,
        max: MAX_AMOUNT_CENTS,
    };
    let mut total = Money::zero();
    for line in lines {
        validate_id("stockId", &line.stock_id)?;
        validate_stock_quantity(line.quantity)?;
        validate_amount("unitCost", line.unit_cost)?;
        total = line
            .unit_cost
            .checked_multiply_quantity(line.quantity)
            .and_then(|cost| total.checked_add(cost))
            .filter(|sum| sum.cents() <= MAX_AMOUNT_CENTS)
            .ok_or_else(total_out_of_range)?;
    }
    Ok(())
}

/// Validates a non-empty identifier of bounded length.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }
    Ok(())
}

/// Validates a UUID string format.
///
/// ```rust
/// use tavola_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_totals() {
        let mut totals = SessionTotals {
            subtotal: Money::from_cents(600),
            ..Default::default()
        };
        assert!(validate_totals(&totals).is_ok());
        totals.discount = Money::from_cents(-1);
        assert!(validate_totals(&totals).is_err());

        let huge = SessionTotals {
            subtotal: Money::from_cents(i64::MAX),
            tax: Money::from_cents(1),
            ..Default::default()
        };
        assert!(matches!(
            validate_totals(&huge),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "subtotal"
        ));
        let at_limit = SessionTotals {
            subtotal: Money::from_cents(MAX_AMOUNT_CENTS),
            tax: Money::from_cents(MAX_AMOUNT_CENTS),
            ..Default::default()
        };
        assert!(validate_totals(&at_limit).is_ok());
    }

    #[test]
    fn test_validate_purchase_lines() {
        assert!(validate_purchase_lines(&[]).is_err());
        let line = PurchaseLine {
            stock_id: "milk".into(),
            quantity: 1000,
            unit_cost: Money::from_cents(2),
        };
        assert!(validate_purchase_lines(&[line.clone()]).is_ok());
        let free = PurchaseLine {
            unit_cost: Money::zero(),
            ..line.clone()
        };
        assert!(validate_purchase_lines(&[free]).is_ok());
        let empty = PurchaseLine {
            quantity: 0,
            ..line.clone()
        };
        assert!(validate_purchase_lines(&[empty]).is_err());

        let overflowing = PurchaseLine {
            quantity: MAX_STOCK_QUANTITY,
            unit_cost: Money::from_cents(MAX_AMOUNT_CENTS),
            ..line.clone()
        };
        assert!(validate_purchase_lines(&[overflowing]).is_err());
        let too_many = PurchaseLine {
            quantity: MAX_STOCK_QUANTITY + 1,
            ..line.clone()
        };
        assert!(validate_purchase_lines(&[too_many]).is_err());
        let half = PurchaseLine {
            quantity: 1,
            unit_cost: Money::from_cents(MAX_AMOUNT_CENTS / 2 + 1),
            ..line
        };
        assert!(validate_purchase_lines(&[half.clone()]).is_ok());
        assert!(validate_purchase_lines(&[half.clone(), half]).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("tableId", "t-1").is_ok());
        assert!(validate_id("tableId", "  ").is_err());
        assert!(validate_id("tableId", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(Money::zero()).is_ok());
        assert!(validate_payment_amount(Money::from_cents(-1)).is_err());
        assert!(validate_payment_amount(Money::from_cents(MAX_AMOUNT_CENTS)).is_ok());
        assert!(validate_payment_amount(Money::from_cents(MAX_AMOUNT_CENTS + 1)).is_err());
        assert!(validate_payment_amount(Money::from_cents(i64::MAX)).is_err());
    }
}
