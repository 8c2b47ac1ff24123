//! # tavola-db: Persistence and Transactional Services for Tavola POS
//!
//! SQLite storage plus the services that change it: table sessions, order
//! lifecycle, stock movements, customer/supplier ledgers and checkout.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tavola POS Data Flow                             │
//! │                                                                         │
//! │  pos-server route (POST /checkout)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tavola-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌───────────────┐    │   │
//! │  │   │   Services    │   │ Repositories  │   │   Database    │    │   │
//! │  │   │               │   │               │   │               │    │   │
//! │  │   │ CheckoutEngine│──►│ OrderRepo     │──►│ SqlitePool    │    │   │
//! │  │   │ OrderService  │   │ PaymentRepo   │   │ write gate    │    │   │
//! │  │   │ SessionManager│   │ LedgerRepo    │   │ retry/backoff │    │   │
//! │  │   │ StockLedger   │   │ StockRepo ... │   │ migrations    │    │   │
//! │  │   │ LedgerEngine  │   │               │   │               │    │   │
//! │  │   └───────────────┘   └───────────────┘   └───────────────┘    │   │
//! │  │          │                                                      │   │
//! │  │          ▼                                                      │   │
//! │  │   CatalogLookup / StoreResolver (collaborators)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, write gate, transient-error retry
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and engine error types
//! - [`repository`] - SQL per table family, all taking `&mut SqliteConnection`
//! - [`collaborators`] - Catalog lookup and store resolution seams
//! - [`service`] - Units of work, each one transaction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tavola_db::{CheckoutRequest, Database, DbConfig, ServiceContext, Services};
//!
//! let db = Database::new(DbConfig::new("tavola.db")).await?;
//! let services = Services::new(ServiceContext::new(db));
//!
//! let outcome = services.checkout.checkout(request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use collaborators::{CatalogLookup, SqliteCatalog, SqliteStoreResolver, StoreResolver};
pub use error::{DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig, RetryPolicy, WriteTx};
pub use service::{
    CheckoutEngine, CheckoutOutcome, CheckoutReceipt, CheckoutRequest, CheckoutTarget,
    ComplimentaryOverride, EngineSettings, ExtraFreeItem, GatewayRedirect, GatewaySettings,
    LedgerEngine, OrderContext, OrderService, ServiceContext, Services, SessionManager,
    StockLedger,
};
