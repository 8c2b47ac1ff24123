//! # Stock Ledger
//!
//! Raw-material movements: recipe consumption, supplier purchases and
//! purchase reversal.
//!
//! ## Movements
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  consume(milk, 200, dish latte)                                        │
//! │     quantity 300 ──► 100        + stock_consumptions row               │
//! │                                                                         │
//! │  consume(milk, 500, dish latte)                                        │
//! │     quantity 100 ──► 100        INSUFFICIENT_STOCK, no row written     │
//! │                                                                         │
//! │  record_purchase(supplier, [milk × 1000 @ 2])                          │
//! │     quantity 100 ──► 1100, value +2000, supplier PURCHASE +2000        │
//! │                                                                         │
//! │  reverse(purchase)                                                     │
//! │     quantity 1100 ──► 100, value −2000, supplier RETURN −2000,         │
//! │     purchase flagged deleted                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Consumption is never undone by order edits. Only purchase reversal gives
//! stock back to the supplier.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::validation::{validate_id, validate_purchase_lines, validate_stock_quantity};
use tavola_core::{
    CoreError, LedgerEntryType, LedgerOwner, LinkedEntity, Money, Purchase, PurchaseItem,
    PurchaseLine, StockConsumption, StockItem,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::repository::{PartyRepository, PurchaseRepository, StockRepository};
use crate::service::ledger::LedgerEngine;
use crate::service::ServiceContext;

#[derive(Debug, Clone)]
pub struct StockLedger {
    ctx: Arc<ServiceContext>,
    ledger: LedgerEngine,
}

impl StockLedger {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        StockLedger {
            ledger: LedgerEngine::new(ctx.clone()),
            ctx,
        }
    }

    /// Consumes `quantity` of a stock item on behalf of a catalog entity.
    ///
    /// Fails `InsufficientStock` without writing anything when less than
    /// `quantity` is on hand.
    pub async fn consume(
        &self,
        stock_id: &str,
        quantity: i64,
        linked: LinkedEntity,
    ) -> EngineResult<StockConsumption> {
        validate_id("stockId", stock_id)?;
        validate_stock_quantity(quantity)?;

        let db = &self.ctx.db;
        let linked = &linked;
        db.with_retry("consume_stock", || async move {
            let mut tx = db.begin_write().await?;
            let consumption = self
                .consume_in(tx.conn(), stock_id, quantity, linked, None, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(consumption)
        })
        .await
    }

    /// Books a supplier delivery: stock up, value up, supplier PURCHASE entry.
    pub async fn record_purchase(
        &self,
        supplier_id: &str,
        lines: Vec<PurchaseLine>,
    ) -> EngineResult<Purchase> {
        validate_id("supplierId", supplier_id)?;
        validate_purchase_lines(&lines)?;

        let db = &self.ctx.db;
        let lines = &lines;
        db.with_retry("record_purchase", || async move {
            let mut tx = db.begin_write().await?;
            let purchase = self
                .record_purchase_in(tx.conn(), supplier_id, lines, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(purchase)
        })
        .await
    }

    /// Undoes a purchase: stock down by the purchased quantities, purchase
    /// flagged deleted, supplier RETURN entry referencing the purchase.
    pub async fn reverse(&self, purchase_id: &str) -> EngineResult<Purchase> {
        validate_id("purchaseId", purchase_id)?;

        let db = &self.ctx.db;
        db.with_retry("reverse_purchase", || async move {
            let mut tx = db.begin_write().await?;
            let purchase = self
                .reverse_in(tx.conn(), purchase_id, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(purchase)
        })
        .await
    }

    pub async fn stock_item(&self, stock_id: &str) -> EngineResult<StockItem> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        StockRepository::fetch(&mut conn, stock_id)
            .await?
            .ok_or_else(|| CoreError::not_found("StockItem", stock_id).into())
    }

    pub async fn consumptions(&self, stock_id: &str) -> EngineResult<Vec<StockConsumption>> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        Ok(StockRepository::consumptions(&mut conn, stock_id).await?)
    }

    // =========================================================================
    // In-transaction variants
    // =========================================================================

    pub(crate) async fn consume_in(
        &self,
        conn: &mut SqliteConnection,
        stock_id: &str,
        quantity: i64,
        linked: &LinkedEntity,
        order_item_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<StockConsumption> {
        validate_stock_quantity(quantity)?;

        if !self.ctx.catalog.exists(conn, linked).await? {
            return Err(CoreError::ItemNotFound {
                kind: format!("{:?}", linked.kind),
                id: linked.id.clone(),
            }
            .into());
        }

        let stock = StockRepository::fetch(conn, stock_id)
            .await?
            .ok_or_else(|| CoreError::not_found("StockItem", stock_id))?;

        let value = stock.value_of(quantity);
        if !StockRepository::try_withdraw(conn, stock_id, quantity, value.cents(), now).await? {
            return Err(CoreError::InsufficientStock {
                stock_id: stock_id.to_string(),
                available: stock.quantity,
                requested: quantity,
            }
            .into());
        }

        let consumption = StockConsumption {
            id: Uuid::new_v4().to_string(),
            stock_id: stock_id.to_string(),
            quantity,
            linked_kind: linked.kind,
            linked_id: linked.id.clone(),
            order_item_id: order_item_id.map(str::to_string),
            created_at: now,
        };
        StockRepository::insert_consumption(conn, &consumption).await?;

        Ok(consumption)
    }

    /// Consumes the recipe of `linked` for `units` units.
    pub(crate) async fn consume_recipe_in(
        &self,
        conn: &mut SqliteConnection,
        linked: &LinkedEntity,
        units: i64,
        order_item_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if units <= 0 {
            return Ok(());
        }
        let recipe = self.ctx.catalog.recipe(conn, linked).await?;
        for line in recipe {
            self.consume_in(
                conn,
                &line.stock_id,
                line.quantity * units,
                linked,
                order_item_id,
                now,
            )
            .await?;
        }
        Ok(())
    }

    async fn record_purchase_in(
        &self,
        conn: &mut SqliteConnection,
        supplier_id: &str,
        lines: &[PurchaseLine],
        now: DateTime<Utc>,
    ) -> EngineResult<Purchase> {
        let supplier = PartyRepository::supplier(conn, supplier_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Supplier", supplier_id))?;

        let purchase_id = Uuid::new_v4().to_string();
        let items: Vec<PurchaseItem> = lines
            .iter()
            .map(|line| PurchaseItem {
                id: Uuid::new_v4().to_string(),
                purchase_id: purchase_id.clone(),
                stock_id: line.stock_id.clone(),
                quantity: line.quantity,
                unit_cost_cents: line.unit_cost.cents(),
            })
            .collect();
        let total: Money = items.iter().map(PurchaseItem::line_cost).sum();

        let purchase = Purchase {
            id: purchase_id,
            store_id: supplier.store_id,
            supplier_id: supplier.id,
            total_cents: total.cents(),
            is_deleted: false,
            created_at: now,
            deleted_at: None,
        };
        for item in &items {
            let received = StockRepository::receive(
                conn,
                &item.stock_id,
                item.quantity,
                item.line_cost().cents(),
                now,
            )
            .await?;
            if !received {
                return Err(CoreError::not_found("StockItem", &item.stock_id).into());
            }
        }
        PurchaseRepository::insert(conn, &purchase, &items).await?;

        if total.is_positive() {
            self.ledger
                .post_in(
                    conn,
                    &LedgerOwner::supplier(&purchase.supplier_id),
                    LedgerEntryType::Purchase,
                    total,
                    Some(&purchase.id),
                    now,
                )
                .await?;
        }

        info!(purchase_id = %purchase.id, supplier_id = %purchase.supplier_id, total = %total, "Purchase recorded");
        Ok(purchase)
    }

    async fn reverse_in(
        &self,
        conn: &mut SqliteConnection,
        purchase_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Purchase> {
        let purchase = PurchaseRepository::fetch(conn, purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Purchase", purchase_id))?;

        if purchase.is_deleted {
            return Err(CoreError::PurchaseAlreadyReversed(purchase_id.to_string()).into());
        }

        let items = PurchaseRepository::items(conn, purchase_id).await?;
        for item in &items {
            let withdrawn = StockRepository::try_withdraw(
                conn,
                &item.stock_id,
                item.quantity,
                item.line_cost().cents(),
                now,
            )
            .await?;
            if !withdrawn {
                let available = StockRepository::fetch(conn, &item.stock_id)
                    .await?
                    .map(|s| s.quantity)
                    .unwrap_or(0);
                return Err(CoreError::InsufficientStock {
                    stock_id: item.stock_id.clone(),
                    available,
                    requested: item.quantity,
                }
                .into());
            }
        }

        if !PurchaseRepository::mark_deleted(conn, purchase_id, now).await? {
            return Err(CoreError::PurchaseAlreadyReversed(purchase_id.to_string()).into());
        }

        if purchase.total().is_positive() {
            self.ledger
                .post_in(
                    conn,
                    &LedgerOwner::supplier(&purchase.supplier_id),
                    LedgerEntryType::Return,
                    purchase.total(),
                    Some(purchase_id),
                    now,
                )
                .await?;
        }

        info!(purchase_id = %purchase_id, total = %purchase.total(), "Purchase reversed");

        PurchaseRepository::fetch(conn, purchase_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Purchase", purchase_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{code, count, services, stock_qty};
    use tavola_core::LinkedKind;

    fn cola() -> LinkedEntity {
        LinkedEntity {
            kind: LinkedKind::Dish,
            id: "d-cola".to_string(),
        }
    }

    fn bun_line(quantity: i64, unit_cost: i64) -> PurchaseLine {
        PurchaseLine {
            stock_id: "st-bun".to_string(),
            quantity,
            unit_cost: Money::from_cents(unit_cost),
        }
    }

    #[tokio::test]
    async fn test_consume_decrements_and_records() {
        let (db, services) = services().await;

        let consumption = services.stock.consume("st-syrup", 30, cola()).await.unwrap();

        assert_eq!(consumption.quantity, 30);
        assert_eq!(consumption.linked_id, "d-cola");
        assert_eq!(stock_qty(&db, "st-syrup").await, 70);
        assert_eq!(services.stock.consumptions("st-syrup").await.unwrap().len(), 1);
        assert_eq!(
            services.stock.stock_item("st-syrup").await.unwrap().amount_cents,
            350
        );
    }

    #[tokio::test]
    async fn test_consume_withdraws_proportional_value() {
        let (_db, services) = services().await;
        let burger = LinkedEntity {
            kind: LinkedKind::Dish,
            id: "d-burger".to_string(),
        };

        services.stock.consume("st-bun", 4, burger.clone()).await.unwrap();
        let bun = services.stock.stock_item("st-bun").await.unwrap();
        assert_eq!((bun.quantity, bun.amount_cents), (6, 600));

        services.stock.consume("st-bun", 6, burger).await.unwrap();
        let bun = services.stock.stock_item("st-bun").await.unwrap();
        assert_eq!((bun.quantity, bun.amount_cents), (0, 0));
    }

    #[tokio::test]
    async fn test_consume_beyond_stock_writes_nothing() {
        let (db, services) = services().await;

        let err = services.stock.consume("st-syrup", 101, cola()).await.unwrap_err();

        assert_eq!(code(&err), "INSUFFICIENT_STOCK");
        assert_eq!(stock_qty(&db, "st-syrup").await, 100);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM stock_consumptions").await, 0);
    }

    #[tokio::test]
    async fn test_consume_for_unknown_entity() {
        let (_db, services) = services().await;
        let ghost = LinkedEntity {
            kind: LinkedKind::AddOn,
            id: "a-ghost".to_string(),
        };

        let err = services.stock.consume("st-syrup", 1, ghost).await.unwrap_err();
        assert_eq!(code(&err), "ITEM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_purchase_then_reverse() {
        let (db, services) = services().await;
        let supplier = LedgerOwner::supplier("su1");

        let purchase = services
            .stock
            .record_purchase("su1", vec![bun_line(10, 50)])
            .await
            .unwrap();
        assert_eq!(purchase.total_cents, 500);
        assert_eq!(stock_qty(&db, "st-bun").await, 20);
        assert_eq!(
            services.stock.stock_item("st-bun").await.unwrap().amount_cents,
            1500
        );
        assert_eq!(services.ledger.due_amount(&supplier).await.unwrap().cents(), 500);

        let reversed = services.stock.reverse(&purchase.id).await.unwrap();
        assert!(reversed.is_deleted);
        assert!(reversed.deleted_at.is_some());
        assert_eq!(stock_qty(&db, "st-bun").await, 10);
        assert_eq!(services.ledger.due_amount(&supplier).await.unwrap().cents(), 0);

        let entries = services.ledger.entries(&supplier).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].entry_type, LedgerEntryType::Return);
        assert_eq!(entries[1].reference_id.as_deref(), Some(purchase.id.as_str()));

        let err = services.stock.reverse(&purchase.id).await.unwrap_err();
        assert_eq!(code(&err), "PURCHASE_ALREADY_REVERSED");
        assert_eq!(stock_qty(&db, "st-bun").await, 10);
    }

    #[tokio::test]
    async fn test_purchase_cost_overflow_is_rejected() {
        let (db, services) = services().await;
        let supplier = LedgerOwner::supplier("su1");

        let err = services
            .stock
            .record_purchase("su1", vec![bun_line(1_000_000_000, 1_000_000_000_000)])
            .await
            .unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        let err = services
            .stock
            .record_purchase("su1", vec![bun_line(2, i64::MAX)])
            .await
            .unwrap_err();
        assert_eq!(code(&err), "VALIDATION_ERROR");

        assert_eq!(stock_qty(&db, "st-bun").await, 10);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM purchases").await, 0);
        assert_eq!(services.ledger.due_amount(&supplier).await.unwrap().cents(), 0);
    }

    #[tokio::test]
    async fn test_reverse_after_stock_used_up() {
        let (db, services) = services().await;
        let purchase = services
            .stock
            .record_purchase("su1", vec![bun_line(5, 10)])
            .await
            .unwrap();

        let burger = LinkedEntity {
            kind: LinkedKind::Dish,
            id: "d-burger".to_string(),
        };
        services.stock.consume("st-bun", 12, burger).await.unwrap();

        let err = services.stock.reverse(&purchase.id).await.unwrap_err();
        assert_eq!(code(&err), "INSUFFICIENT_STOCK");
        assert_eq!(stock_qty(&db, "st-bun").await, 3);
        assert!(services.stock.reverse(&purchase.id).await.is_err());
    }

    #[tokio::test]
    async fn test_purchase_with_unknown_stock_rolls_back() {
        let (db, services) = services().await;
        let lines = vec![
            bun_line(4, 10),
            PurchaseLine {
                stock_id: "st-ghost".to_string(),
                quantity: 1,
                unit_cost: Money::from_cents(10),
            },
        ];

        let err = services.stock.record_purchase("su1", lines).await.unwrap_err();

        assert_eq!(code(&err), "NOT_FOUND");
        assert_eq!(stock_qty(&db, "st-bun").await, 10);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM purchases").await, 0);
    }

    #[tokio::test]
    async fn test_zero_cost_purchase_posts_nothing() {
        let (_db, services) = services().await;

        services.stock.record_purchase("su1", vec![bun_line(2, 0)]).await.unwrap();

        let entries = services.ledger.entries(&LedgerOwner::supplier("su1")).await.unwrap();
        assert!(entries.is_empty());
    }
}
