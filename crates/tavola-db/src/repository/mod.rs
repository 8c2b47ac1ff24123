//! # Repository Module
//!
//! SQL for every table the services touch.
//!
//! ## Connection-Scoped Repositories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories Run Inside a Unit of Work               │
//! │                                                                         │
//! │  Service (e.g. CheckoutEngine)                                         │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin_write().await?;                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OrderRepository::fetch(tx.conn(), id)                                 │
//! │  PaymentRepository::upsert(tx.conn(), &payment)                        │
//! │  TableRepository::close_session(tx.conn(), ...)                        │
//! │       │                                                                 │
//! │       │  every call borrows the same connection                        │
//! │       ▼                                                                 │
//! │  tx.commit()  ── or drop ──► rollback, nothing visible                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories are stateless; each function takes the connection it runs
//! on, so a service can compose several of them in one transaction. Reads
//! outside a transaction pass a pooled connection the same way.
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`] - Dishes, combos, add-ons and recipes (read-only)
//! - [`TableRepository`] - Dining tables and table sessions
//! - [`OrderRepository`] - Orders, items and item add-ons
//! - [`StockRepository`] - Stock levels and consumption history
//! - [`PurchaseRepository`] - Supplier purchases
//! - [`PaymentRepository`] - Session / order payments
//! - [`LedgerRepository`] - Customer and supplier ledger entries
//! - [`PartyRepository`] - Customers and suppliers

pub mod catalog;
pub mod ledger;
pub mod orders;
pub mod parties;
pub mod payments;
pub mod purchases;
pub mod stock;
pub mod tables;

pub use catalog::CatalogRepository;
pub use ledger::LedgerRepository;
pub use orders::OrderRepository;
pub use parties::PartyRepository;
pub use payments::PaymentRepository;
pub use purchases::PurchaseRepository;
pub use stock::StockRepository;
pub use tables::TableRepository;
