//! # Payment Repository
//!
//! One payment per session (dine-in) or per order (take-away). Both keys are
//! UNIQUE in the schema; writes go through [`PaymentRepository::upsert`] so a
//! PENDING gateway attempt can be overwritten by the next checkout.

use sqlx::SqliteConnection;
use tavola_core::{Payment, PaymentStatus};
use tracing::debug;

use crate::error::DbResult;

const PAYMENT_COLUMNS: &str = "id, store_id, session_id, order_id, method, amount_cents, status, \
     transaction_ref, checkout_snapshot, created_at, updated_at";

/// Repository for payments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentRepository;

impl PaymentRepository {
    pub async fn for_session(
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE session_id = ?");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(session_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(payment)
    }

    pub async fn for_order(
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = ?");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(payment)
    }

    pub async fn by_transaction_ref(
        conn: &mut SqliteConnection,
        transaction_ref: &str,
    ) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_ref = ?");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(transaction_ref)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(payment)
    }

    /// Inserts the payment, or overwrites the existing row with the same id.
    ///
    /// Callers reuse the id of an earlier unsettled attempt so the session
    /// keeps exactly one payment row.
    pub async fn upsert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(
            payment_id = %payment.id,
            method = %payment.method,
            status = ?payment.status,
            amount = payment.amount_cents,
            "Upserting payment"
        );

        sqlx::query(
            "INSERT INTO payments (id, store_id, session_id, order_id, method, amount_cents, \
                 status, transaction_ref, checkout_snapshot, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 method = excluded.method, \
                 amount_cents = excluded.amount_cents, \
                 status = excluded.status, \
                 transaction_ref = excluded.transaction_ref, \
                 checkout_snapshot = excluded.checkout_snapshot, \
                 updated_at = excluded.updated_at",
        )
        .bind(&payment.id)
        .bind(&payment.store_id)
        .bind(&payment.session_id)
        .bind(&payment.order_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(payment.status)
        .bind(&payment.transaction_ref)
        .bind(&payment.checkout_snapshot)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Moves a payment out of PENDING. Returns false if it was not pending.
    pub async fn settle_pending(
        conn: &mut SqliteConnection,
        payment_id: &str,
        status: PaymentStatus,
        now: chrono::DateTime<chrono::Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status)
        .bind(now)
        .bind(payment_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Removes an abandoned payment so its order can be deleted.
    pub async fn delete(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<bool> {
        debug!(payment_id = %payment_id, "Deleting payment");

        let result = sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(payment_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
