//! # Ledger Repository
//!
//! Append-only customer and supplier ledgers.
//!
//! `sequence` orders entries per owner. `(owner_kind, owner_id, sequence)`
//! is UNIQUE, so two postings computed from the same previous entry cannot
//! both land; the loser gets a unique violation and is retried.

use sqlx::SqliteConnection;
use tavola_core::{LedgerEntry, LedgerOwner};
use tracing::debug;

use crate::error::DbResult;

const ENTRY_COLUMNS: &str = "id, owner_kind, owner_id, sequence, entry_type, amount_cents, \
     closing_balance_cents, reference_id, created_at";

/// Repository for ledger entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerRepository;

impl LedgerRepository {
    /// The owner's most recent entry by sequence.
    pub async fn latest(
        conn: &mut SqliteConnection,
        owner: &LedgerOwner,
    ) -> DbResult<Option<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE owner_kind = ? AND owner_id = ? ORDER BY sequence DESC LIMIT 1"
        );
        let entry = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(owner.kind)
            .bind(&owner.id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(entry)
    }

    /// Every entry of the owner in creation order.
    pub async fn entries(
        conn: &mut SqliteConnection,
        owner: &LedgerOwner,
    ) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE owner_kind = ? AND owner_id = ? ORDER BY sequence"
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(owner.kind)
            .bind(&owner.id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(entries)
    }

    pub async fn insert(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<()> {
        debug!(
            owner_kind = %entry.owner_kind,
            owner_id = %entry.owner_id,
            sequence = entry.sequence,
            entry_type = %entry.entry_type,
            amount = entry.amount_cents,
            closing = entry.closing_balance_cents,
            "Appending ledger entry"
        );

        sqlx::query(
            "INSERT INTO ledger_entries (id, owner_kind, owner_id, sequence, entry_type, \
                 amount_cents, closing_balance_cents, reference_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.owner_kind)
        .bind(&entry.owner_id)
        .bind(entry.sequence)
        .bind(entry.entry_type)
        .bind(entry.amount_cents)
        .bind(entry.closing_balance_cents)
        .bind(&entry.reference_id)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Overwrites the cached closing balance of one entry (reconciliation).
    pub async fn set_closing_balance(
        conn: &mut SqliteConnection,
        entry_id: &str,
        closing_balance_cents: i64,
    ) -> DbResult<()> {
        sqlx::query("UPDATE ledger_entries SET closing_balance_cents = ? WHERE id = ?")
            .bind(closing_balance_cents)
            .bind(entry_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
