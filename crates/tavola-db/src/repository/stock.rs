//! # Stock Repository
//!
//! Raw-material levels and the consumption history.
//!
//! ## Check-then-Decrement
//! ```text
//! UPDATE stock_items
//!    SET quantity = quantity - :q
//!  WHERE id = :id AND quantity >= :q      ◄── check and act in one statement
//!
//! rows_affected = 1  → consumed
//! rows_affected = 0  → not enough on hand (or unknown id); nothing written
//! ```
//! The `CHECK (quantity >= 0)` column constraint backs this up.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::{StockConsumption, StockItem};
use tracing::debug;

use crate::error::DbResult;

/// Repository for stock items and consumption records.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockRepository;

impl StockRepository {
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StockItem>> {
        let item = sqlx::query_as::<_, StockItem>(
            "SELECT id, store_id, name, unit, quantity, amount_cents, updated_at \
             FROM stock_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(item)
    }

    /// Decrements quantity and book value together, only if enough is on hand.
    /// Returns whether it did.
    pub async fn try_withdraw(
        conn: &mut SqliteConnection,
        stock_id: &str,
        quantity: i64,
        value_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE stock_items SET quantity = quantity - ?, \
                 amount_cents = MAX(amount_cents - ?, 0), updated_at = ? \
             WHERE id = ? AND quantity >= ?",
        )
        .bind(quantity)
        .bind(value_cents)
        .bind(now)
        .bind(stock_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Adds purchased quantity and its value.
    pub async fn receive(
        conn: &mut SqliteConnection,
        stock_id: &str,
        quantity: i64,
        value_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(stock_id = %stock_id, quantity, value_cents, "Receiving stock");

        let result = sqlx::query(
            "UPDATE stock_items SET quantity = quantity + ?, amount_cents = amount_cents + ?, \
                 updated_at = ? WHERE id = ?",
        )
        .bind(quantity)
        .bind(value_cents)
        .bind(now)
        .bind(stock_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_consumption(
        conn: &mut SqliteConnection,
        consumption: &StockConsumption,
    ) -> DbResult<()> {
        debug!(
            stock_id = %consumption.stock_id,
            quantity = consumption.quantity,
            linked_id = %consumption.linked_id,
            "Recording stock consumption"
        );

        sqlx::query(
            "INSERT INTO stock_consumptions \
                 (id, stock_id, quantity, linked_kind, linked_id, order_item_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&consumption.id)
        .bind(&consumption.stock_id)
        .bind(consumption.quantity)
        .bind(consumption.linked_kind)
        .bind(&consumption.linked_id)
        .bind(&consumption.order_item_id)
        .bind(consumption.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn consumptions(
        conn: &mut SqliteConnection,
        stock_id: &str,
    ) -> DbResult<Vec<StockConsumption>> {
        let rows = sqlx::query_as::<_, StockConsumption>(
            "SELECT id, stock_id, quantity, linked_kind, linked_id, order_item_id, created_at \
             FROM stock_consumptions WHERE stock_id = ? ORDER BY created_at, rowid",
        )
        .bind(stock_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }
}
