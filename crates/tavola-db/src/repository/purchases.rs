//! # Purchase Repository
//!
//! Supplier purchases and their lines. Reversal is a soft delete: the row
//! stays for the supplier ledger's reference and is flagged `is_deleted`.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::{Purchase, PurchaseItem};
use tracing::debug;

use crate::error::DbResult;

/// Repository for purchases.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurchaseRepository;

impl PurchaseRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        purchase: &Purchase,
        items: &[PurchaseItem],
    ) -> DbResult<()> {
        debug!(purchase_id = %purchase.id, supplier_id = %purchase.supplier_id, lines = items.len(), "Inserting purchase");

        sqlx::query(
            "INSERT INTO purchases (id, store_id, supplier_id, total_cents, is_deleted, created_at) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&purchase.id)
        .bind(&purchase.store_id)
        .bind(&purchase.supplier_id)
        .bind(purchase.total_cents)
        .bind(purchase.created_at)
        .execute(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                "INSERT INTO purchase_items (id, purchase_id, stock_id, quantity, unit_cost_cents) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&item.id)
            .bind(&item.purchase_id)
            .bind(&item.stock_id)
            .bind(item.quantity)
            .bind(item.unit_cost_cents)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>(
            "SELECT id, store_id, supplier_id, total_cents, is_deleted, created_at, deleted_at \
             FROM purchases WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(purchase)
    }

    pub async fn items(
        conn: &mut SqliteConnection,
        purchase_id: &str,
    ) -> DbResult<Vec<PurchaseItem>> {
        let items = sqlx::query_as::<_, PurchaseItem>(
            "SELECT id, purchase_id, stock_id, quantity, unit_cost_cents \
             FROM purchase_items WHERE purchase_id = ? ORDER BY rowid",
        )
        .bind(purchase_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }

    /// Flags a live purchase deleted. Returns false if it already was.
    pub async fn mark_deleted(
        conn: &mut SqliteConnection,
        purchase_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE purchases SET is_deleted = 1, deleted_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(now)
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
