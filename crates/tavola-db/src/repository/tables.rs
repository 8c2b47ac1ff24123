//! # Table Repository
//!
//! Dining tables and their sessions.
//!
//! ## Session Rows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  table_sessions (table_id = T)                                          │
//! │                                                                         │
//! │  s1  is_active=0  started 12:01  ended 12:55   ◄── closed by checkout  │
//! │  s2  is_active=0  started 13:10  ended 14:02                           │
//! │  s3  is_active=1  started 19:30  ended NULL    ◄── at most one (index) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::{DiningTable, SessionTotals, TableSession, TableStatus};
use tracing::debug;

use crate::error::DbResult;

const SESSION_COLUMNS: &str = "id, table_id, store_id, is_active, started_at, ended_at, \
     total_cents, discount_cents, service_charge_cents, tax_cents, grand_total_cents";

/// Repository for tables and table sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableRepository;

impl TableRepository {
    pub async fn fetch_table(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>(
            "SELECT id, store_id, name, capacity, status, updated_at \
             FROM dining_tables WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(table)
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        table_id: &str,
        status: TableStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(table_id = %table_id, ?status, "Setting table status");

        sqlx::query("UPDATE dining_tables SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(table_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn fetch_session(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<TableSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM table_sessions WHERE id = ?");
        let session = sqlx::query_as::<_, TableSession>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(session)
    }

    pub async fn active_session(
        conn: &mut SqliteConnection,
        table_id: &str,
    ) -> DbResult<Option<TableSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM table_sessions WHERE table_id = ? AND is_active = 1"
        );
        let session = sqlx::query_as::<_, TableSession>(&sql)
            .bind(table_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(session)
    }

    /// Most recently started session of a table, active or not.
    pub async fn latest_session(
        conn: &mut SqliteConnection,
        table_id: &str,
    ) -> DbResult<Option<TableSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM table_sessions WHERE table_id = ? \
             ORDER BY started_at DESC, rowid DESC LIMIT 1"
        );
        let session = sqlx::query_as::<_, TableSession>(&sql)
            .bind(table_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(session)
    }

    /// Inserts a session. A second active session for the same table fails
    /// with a unique violation on `idx_sessions_one_active`.
    pub async fn insert_session(
        conn: &mut SqliteConnection,
        session: &TableSession,
    ) -> DbResult<()> {
        debug!(session_id = %session.id, table_id = %session.table_id, "Inserting session");

        sqlx::query(
            "INSERT INTO table_sessions (id, table_id, store_id, is_active, started_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.table_id)
        .bind(&session.store_id)
        .bind(session.is_active)
        .bind(session.started_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Closes a session if it is still active. Returns whether a row changed.
    pub async fn close_session(
        conn: &mut SqliteConnection,
        session_id: &str,
        totals: &SessionTotals,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(session_id = %session_id, grand_total = %totals.grand_total(), "Closing session");

        let result = sqlx::query(
            "UPDATE table_sessions SET is_active = 0, ended_at = ?, \
                 total_cents = ?, discount_cents = ?, service_charge_cents = ?, \
                 tax_cents = ?, grand_total_cents = ? \
             WHERE id = ? AND is_active = 1",
        )
        .bind(now)
        .bind(totals.subtotal.cents())
        .bind(totals.discount.cents())
        .bind(totals.service_charge.cents())
        .bind(totals.tax.cents())
        .bind(totals.grand_total().cents())
        .bind(session_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
