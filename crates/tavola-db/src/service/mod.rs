//! # Transactional Services
//!
//! The units of work of the order lifecycle. Each public method is one
//! atomic unit: it takes the write gate, opens a transaction, runs the
//! repositories on that transaction's connection, and commits. Any error
//! drops the transaction, which rolls everything back.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CheckoutEngine ──┬──► SessionManager   (close session, free table)    │
//! │                   ├──► OrderService     (complete orders, free items)  │
//! │                   ├──► StockLedger      (recipe stock of free items)   │
//! │                   └──► LedgerEngine     (SALE / PAYMENT_IN, loyalty)   │
//! │                                                                         │
//! │  OrderService ────┬──► SessionManager   (dine-in session on create)    │
//! │                   └──► StockLedger      (recipe stock on add / grow)   │
//! │                                                                         │
//! │  StockLedger ─────────► LedgerEngine    (PURCHASE / RETURN)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Composed calls use the `*_in` variants, which run on the caller's
//! connection and never open their own transaction.

pub mod checkout;
pub mod ledger;
pub mod orders;
pub mod sessions;
pub mod stock;

use std::sync::Arc;

use tavola_core::DEFAULT_CENTS_PER_LOYALTY_POINT;

use crate::collaborators::{CatalogLookup, SqliteCatalog, SqliteStoreResolver, StoreResolver};
use crate::pool::Database;

pub use checkout::{
    CheckoutEngine, CheckoutOutcome, CheckoutReceipt, CheckoutRequest, CheckoutTarget,
    ComplimentaryOverride, ExtraFreeItem, GatewayRedirect,
};
pub use ledger::LedgerEngine;
pub use orders::{OrderContext, OrderService};
pub use sessions::SessionManager;
pub use stock::StockLedger;

// =============================================================================
// Settings
// =============================================================================

/// Where the external gateway sends the guest, and as whom we present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewaySettings {
    pub redirect_url: String,
    pub success_url: String,
    pub failure_url: String,
    pub merchant_code: String,
}

/// Tunables of the services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Settled amount (in cents) that earns one loyalty point.
    pub cents_per_loyalty_point: i64,
    pub gateway: GatewaySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            cents_per_loyalty_point: DEFAULT_CENTS_PER_LOYALTY_POINT,
            gateway: GatewaySettings::default(),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Everything a service needs: the database and the collaborators.
pub struct ServiceContext {
    pub db: Database,
    pub catalog: Arc<dyn CatalogLookup>,
    pub stores: Arc<dyn StoreResolver>,
    pub settings: EngineSettings,
}

impl ServiceContext {
    /// Context with the SQLite-backed collaborators and default settings.
    pub fn new(db: Database) -> Self {
        ServiceContext {
            db,
            catalog: Arc::new(SqliteCatalog),
            stores: Arc::new(SqliteStoreResolver),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_store_resolver(mut self, stores: Arc<dyn StoreResolver>) -> Self {
        self.stores = stores;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("db", &self.db)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// All services over one shared context.
#[derive(Debug, Clone)]
pub struct Services {
    pub sessions: SessionManager,
    pub orders: OrderService,
    pub stock: StockLedger,
    pub ledger: LedgerEngine,
    pub checkout: CheckoutEngine,
}

impl Services {
    pub fn new(ctx: ServiceContext) -> Self {
        let ctx = Arc::new(ctx);
        Services {
            sessions: SessionManager::new(ctx.clone()),
            orders: OrderService::new(ctx.clone()),
            stock: StockLedger::new(ctx.clone()),
            ledger: LedgerEngine::new(ctx.clone()),
            checkout: CheckoutEngine::new(ctx),
        }
    }
}
