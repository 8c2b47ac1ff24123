//! # tavola-core: Pure Domain Logic for Tavola POS
//!
//! Everything the checkout engine decides without touching storage lives
//! here: what an order line costs, which status moves are legal, how a
//! ledger entry moves a balance, which settlement path a payment method
//! takes.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tavola POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/pos-server (axum HTTP)                     │   │
//! │  │   /orders   /checkout   /stock/consume   /ledger   /purchases   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tavola-db (repositories + transactional services)      │   │
//! │  │  SessionManager  OrderService  StockLedger  LedgerEngine  ...   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tavola-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  order  │ │ ledger  │ │ payment │ │ tickets │  │   │
//! │  │   │ Table   │ │ Status  │ │ Sign    │ │ Method  │ │  KOT    │  │   │
//! │  │   │ Session │ │ Pricing │ │ Fold    │ │ Family  │ │ groups  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Tables, sessions, orders, stock, purchases, customers
//! - [`order`] - Order status machine and line pricing
//! - [`ledger`] - Ledger entry types, sign convention, balance fold
//! - [`payment`] - Payment methods, settlement families, loyalty points
//! - [`tickets`] - Kitchen/bar ticket grouping
//! - [`money`] - Integer money
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tavola_core::money::Money;
//! use tavola_core::order::line_total;
//!
//! // 2 x 300 with no add-ons
//! let total = line_total(Money::from_cents(300), 2, 0, &[]);
//! assert_eq!(total.cents(), 600);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod order;
pub mod payment;
pub mod tickets;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use ledger::{LedgerEntry, LedgerEntryType, LedgerOwner, OwnerKind};
pub use money::Money;
pub use order::{OrderStatus, OrderType};
pub use payment::{PaymentFamily, PaymentMethod, PaymentStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines accepted in a single order request.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum quantity of a single order line (and of a single add-on).
///
/// Catches fat-finger entries such as 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest money amount accepted on any input, in cents.
///
/// Ten billion currency units. A handful of these summed stays inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Largest raw-material quantity accepted on a single stock movement.
pub const MAX_STOCK_QUANTITY: i64 = 1_000_000_000;

/// Default loyalty divisor: one point per 100 of the settled amount.
pub const DEFAULT_CENTS_PER_LOYALTY_POINT: i64 = 100;
