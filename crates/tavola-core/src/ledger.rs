//! # Running-Balance Ledger
//!
//! Sign convention, entry validation and the balance fold for customer and
//! supplier ledgers.
//!
//! ## Balance Meaning
//! The balance is what is outstanding with the counterparty:
//! - customer: what the customer owes the restaurant
//! - supplier: what the restaurant owes the supplier
//!
//! ## Sign Convention
//! ```text
//! ┌──────────────────┬──────────────────────────────┬────────────────────┐
//! │ Entry type       │ Effect on balance            │ Owners             │
//! ├──────────────────┼──────────────────────────────┼────────────────────┤
//! │ OPENING_BALANCE  │ + signed amount              │ customer, supplier │
//! │ SALE             │ + amount                     │ customer           │
//! │ PURCHASE         │ + amount                     │ supplier           │
//! │ PAYMENT_IN       │ − amount                     │ customer           │
//! │ PAYMENT_OUT      │ − amount                     │ supplier           │
//! │ PAYMENT          │ − amount                     │ customer, supplier │
//! │ RETURN           │ − amount                     │ customer, supplier │
//! │ ADJUSTMENT       │ + signed amount              │ customer, supplier │
//! └──────────────────┴──────────────────────────────┴────────────────────┘
//! ```
//! Paying a supplier is always PAYMENT_OUT and always reduces the payable.
//! Money coming back from a supplier is an ADJUSTMENT with a negative amount.
//!
//! ## Fold vs. Cache
//! Each entry stores `closing_balance` = previous closing + effect. That
//! column is a cache; the due amount is always the fold over every entry.
//! [`audit`] compares the two and reports where they diverge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::MAX_AMOUNT_CENTS;

// =============================================================================
// Owner
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerKind {
    Customer,
    Supplier,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Customer => "customer",
            OwnerKind::Supplier => "supplier",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().trim_end_matches('s') {
            "customer" => Ok(OwnerKind::Customer),
            "supplier" => Ok(OwnerKind::Supplier),
            _ => Err(ValidationError::NotAllowed {
                field: "owner kind".to_string(),
                allowed: vec!["customer".into(), "supplier".into()],
            }
            .into()),
        }
    }
}

/// The party a ledger belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerOwner {
    pub kind: OwnerKind,
    pub id: String,
}

impl LedgerOwner {
    pub fn customer(id: impl Into<String>) -> Self {
        LedgerOwner {
            kind: OwnerKind::Customer,
            id: id.into(),
        }
    }

    pub fn supplier(id: impl Into<String>) -> Self {
        LedgerOwner {
            kind: OwnerKind::Supplier,
            id: id.into(),
        }
    }
}

impl fmt::Display for LedgerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// =============================================================================
// Entry Type
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    OpeningBalance,
    Sale,
    Purchase,
    PaymentIn,
    PaymentOut,
    Payment,
    Return,
    Adjustment,
}

impl LedgerEntryType {
    /// Signed types take the amount as given; the rest require a positive amount.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            LedgerEntryType::OpeningBalance | LedgerEntryType::Adjustment
        )
    }

    /// Whether this type may be posted on a ledger of `kind`.
    pub fn applies_to(&self, kind: OwnerKind) -> bool {
        match self {
            LedgerEntryType::Sale | LedgerEntryType::PaymentIn => kind == OwnerKind::Customer,
            LedgerEntryType::Purchase | LedgerEntryType::PaymentOut => {
                kind == OwnerKind::Supplier
            }
            LedgerEntryType::OpeningBalance
            | LedgerEntryType::Payment
            | LedgerEntryType::Return
            | LedgerEntryType::Adjustment => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::OpeningBalance => "OPENING_BALANCE",
            LedgerEntryType::Sale => "SALE",
            LedgerEntryType::Purchase => "PURCHASE",
            LedgerEntryType::PaymentIn => "PAYMENT_IN",
            LedgerEntryType::PaymentOut => "PAYMENT_OUT",
            LedgerEntryType::Payment => "PAYMENT",
            LedgerEntryType::Return => "RETURN",
            LedgerEntryType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect of an entry on the running balance.
///
/// ```rust
/// use tavola_core::ledger::{effect, LedgerEntryType};
/// use tavola_core::Money;
///
/// assert_eq!(effect(LedgerEntryType::Sale, Money::from_cents(600)).cents(), 600);
/// assert_eq!(effect(LedgerEntryType::PaymentIn, Money::from_cents(600)).cents(), -600);
/// assert_eq!(effect(LedgerEntryType::Adjustment, Money::from_cents(-25)).cents(), -25);
/// ```
pub fn effect(entry_type: LedgerEntryType, amount: Money) -> Money {
    match entry_type {
        LedgerEntryType::OpeningBalance
        | LedgerEntryType::Sale
        | LedgerEntryType::Purchase
        | LedgerEntryType::Adjustment => amount,
        LedgerEntryType::PaymentIn
        | LedgerEntryType::PaymentOut
        | LedgerEntryType::Payment
        | LedgerEntryType::Return => -amount,
    }
}

/// Validates a posting before it is written.
pub fn check_entry(kind: OwnerKind, entry_type: LedgerEntryType, amount: Money) -> CoreResult<()> {
    if !entry_type.applies_to(kind) {
        return Err(CoreError::InvalidLedgerEntry(format!(
            "{} cannot be posted to a {} ledger",
            entry_type, kind
        )));
    }
    if amount.cents() < -MAX_AMOUNT_CENTS || amount.cents() > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: format!("{} amount", entry_type),
            min: -MAX_AMOUNT_CENTS,
            max: MAX_AMOUNT_CENTS,
        }
        .into());
    }
    if entry_type.is_signed() {
        if amount.is_zero() {
            return Err(CoreError::InvalidLedgerEntry(format!(
                "{} amount must not be zero",
                entry_type
            )));
        }
    } else if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: format!("{} amount", entry_type),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Entry
// =============================================================================

/// One append-only ledger row.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub owner_kind: OwnerKind,
    pub owner_id: String,
    /// Per-owner creation order, starting at 1.
    pub sequence: i64,
    pub entry_type: LedgerEntryType,
    /// As posted: signed for OPENING_BALANCE/ADJUSTMENT, positive otherwise.
    pub amount_cents: i64,
    /// Cached running balance after this entry.
    pub closing_balance_cents: i64,
    pub reference_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    pub fn closing_balance(&self) -> Money {
        Money::from_cents(self.closing_balance_cents)
    }

    pub fn effect(&self) -> Money {
        effect(self.entry_type, self.amount())
    }
}

// =============================================================================
// Fold & Audit
// =============================================================================

/// Due amount: the fold of every entry's effect.
pub fn fold_balance(entries: &[LedgerEntry]) -> Money {
    entries.iter().map(LedgerEntry::effect).sum()
}

/// An entry whose cached closing balance disagrees with the fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    pub entry_id: String,
    pub sequence: i64,
    pub cached: Money,
    pub expected: Money,
}

/// Result of comparing cached closing balances with the fold.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    pub owner: LedgerOwner,
    /// Fold over all entries.
    pub due: Money,
    /// Closing balance cached on the latest entry, if any.
    pub cached: Option<Money>,
    pub divergences: Vec<Divergence>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Walks entries in creation order and reports every cached balance that
/// disagrees with the running fold.
pub fn audit(owner: LedgerOwner, entries: &[LedgerEntry]) -> LedgerAudit {
    let mut ordered: Vec<&LedgerEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.sequence);

    let mut running = Money::zero();
    let mut divergences = Vec::new();
    for entry in &ordered {
        running += entry.effect();
        if entry.closing_balance() != running {
            divergences.push(Divergence {
                entry_id: entry.id.clone(),
                sequence: entry.sequence,
                cached: entry.closing_balance(),
                expected: running,
            });
        }
    }

    LedgerAudit {
        owner,
        due: running,
        cached: ordered.last().map(|e| e.closing_balance()),
        divergences,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
