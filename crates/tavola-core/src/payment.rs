//! # Payment Methods
//!
//! Closed set of payment methods and the settlement family each one
//! belongs to.
//!
//! ## Family Dispatch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PaymentMethod        family()                 effect at checkout       │
//! │  ─────────────        ──────────────────       ───────────────────────  │
//! │  CASH  ─┐                                                               │
//! │  CARD  ─┼──────────►  Immediate(PAID)    ──►  finalize now             │
//! │  QR    ─┘                                                               │
//! │  CREDIT ──────────►   Immediate(CREDIT)  ──►  finalize now, no         │
//! │                                                PAYMENT_IN entry         │
//! │  GATEWAY ─────────►   ExternalGateway    ──►  PENDING payment +        │
//! │                                                redirect config;         │
//! │                                                callback finalizes       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Adding a method means one new variant and one arm in [`PaymentMethod::family`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Qr,
    /// Sale on account; the customer pays later.
    Credit,
    /// Redirect-based online processor.
    Gateway,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Qr,
        PaymentMethod::Credit,
        PaymentMethod::Gateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Qr => "QR",
            PaymentMethod::Credit => "CREDIT",
            PaymentMethod::Gateway => "GATEWAY",
        }
    }

    /// Settlement family of this method.
    pub fn family(&self) -> PaymentFamily {
        match self {
            PaymentMethod::Cash | PaymentMethod::Card | PaymentMethod::Qr => {
                PaymentFamily::Immediate(PaymentStatus::Paid)
            }
            PaymentMethod::Credit => PaymentFamily::Immediate(PaymentStatus::Credit),
            PaymentMethod::Gateway => PaymentFamily::ExternalGateway,
        }
    }

    /// Whether settling with this method also records money received.
    ///
    /// Credit sales leave the SALE entry open on the customer ledger.
    pub fn records_payment_in(&self) -> bool {
        !matches!(self, PaymentMethod::Credit)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| CoreError::InvalidMethod(s.to_string()))
    }
}

// =============================================================================
// Family
// =============================================================================

/// How a checkout with a given method settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFamily {
    /// Settled in the checkout call; the payment lands in this status.
    Immediate(PaymentStatus),
    /// Settled later by a gateway callback.
    ExternalGateway,
}

// =============================================================================
// Payment Status
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Gateway redirect issued, callback not yet received.
    Pending,
    Paid,
    /// Settled on account.
    Credit,
    /// Gateway attempt abandoned by an explicit cancel.
    Cancelled,
}

impl PaymentStatus {
    /// PAID and CREDIT both close the bill; a second checkout is refused.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Credit)
    }
}

// =============================================================================
// Loyalty
// =============================================================================

/// Loyalty points earned on a settled amount: `floor(amount / cents_per_point)`.
///
/// ```rust
/// use tavola_core::money::Money;
/// use tavola_core::payment::loyalty_points;
///
/// assert_eq!(loyalty_points(Money::from_cents(600), 100), 6);
/// assert_eq!(loyalty_points(Money::from_cents(99), 100), 0);
/// ```
pub fn loyalty_points(amount: Money, cents_per_point: i64) -> i64 {
    amount.whole_units_of(cents_per_point)
}

// =============================================================================
// Unit Tests
// =============================================================================
