//! # Table Session Manager
//!
//! Owns "at most one active session per table".
//!
//! ```text
//! Table ACTIVE ──first dine-in order──► session opened, Table OCCUPIED
//!                                            │
//!                          more orders join the same session
//!                                            │
//! Table ACTIVE ◄────────checkout───────── session closed (once)
//! ```
//!
//! Creation happens under the write gate and inside the caller's
//! transaction; the partial unique index on `table_sessions(table_id)
//! WHERE is_active = 1` rejects a second active row from anywhere else.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::validation::validate_totals;
use tavola_core::{CoreError, SessionTotals, TableSession, TableStatus};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::repository::TableRepository;
use crate::service::ServiceContext;

#[derive(Debug, Clone)]
pub struct SessionManager {
    ctx: Arc<ServiceContext>,
}

impl SessionManager {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        SessionManager { ctx }
    }

    /// Returns the table's active session, opening one if there is none.
    pub async fn get_or_create_active_session(&self, table_id: &str) -> EngineResult<TableSession> {
        let db = &self.ctx.db;
        db.with_retry("get_or_create_active_session", || async move {
            let mut tx = db.begin_write().await?;
            let session = self
                .get_or_create_in(tx.conn(), table_id, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(session)
        })
        .await
    }

    /// Closes an active session with its final totals and frees the table.
    pub async fn close_session(
        &self,
        session_id: &str,
        totals: SessionTotals,
    ) -> EngineResult<TableSession> {
        validate_totals(&totals)?;

        let db = &self.ctx.db;
        let totals = &totals;
        db.with_retry("close_session", || async move {
            let mut tx = db.begin_write().await?;
            let session = self
                .close_in(tx.conn(), session_id, totals, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(session)
        })
        .await
    }

    pub async fn active_session_for_table(
        &self,
        table_id: &str,
    ) -> EngineResult<Option<TableSession>> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        Ok(TableRepository::active_session(&mut conn, table_id).await?)
    }

    pub async fn get_session(&self, session_id: &str) -> EngineResult<TableSession> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        TableRepository::fetch_session(&mut conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Session", session_id).into())
    }

    // =========================================================================
    // In-transaction variants
    // =========================================================================

    pub(crate) async fn get_or_create_in(
        &self,
        conn: &mut SqliteConnection,
        table_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<TableSession> {
        if let Some(session) = TableRepository::active_session(conn, table_id).await? {
            return Ok(session);
        }

        // Unknown table → NotFound, storeless table → StoreResolution.
        let store_id = self.ctx.stores.store_for_table(conn, table_id).await?;

        let session = TableSession {
            id: Uuid::new_v4().to_string(),
            table_id: table_id.to_string(),
            store_id,
            is_active: true,
            started_at: now,
            ended_at: None,
            total_cents: 0,
            discount_cents: 0,
            service_charge_cents: 0,
            tax_cents: 0,
            grand_total_cents: 0,
        };

        TableRepository::insert_session(conn, &session).await?;
        TableRepository::set_status(conn, table_id, TableStatus::Occupied, now).await?;

        info!(session_id = %session.id, table_id = %table_id, "Table session opened");
        Ok(session)
    }

    pub(crate) async fn close_in(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
        totals: &SessionTotals,
        now: DateTime<Utc>,
    ) -> EngineResult<TableSession> {
        let session = TableRepository::fetch_session(conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Session", session_id))?;

        if !session.is_active
            || !TableRepository::close_session(conn, session_id, totals, now).await?
        {
            return Err(CoreError::SessionNotActive(session_id.to_string()).into());
        }

        TableRepository::set_status(conn, &session.table_id, TableStatus::Active, now).await?;

        info!(
            session_id = %session_id,
            table_id = %session.table_id,
            grand_total = %totals.grand_total(),
            "Table session closed"
        );

        TableRepository::fetch_session(conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Session", session_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{code, count, services, table_status};
    use tavola_core::Money;

    #[tokio::test]
    async fn test_session_opens_once_and_occupies_table() {
        let (db, services) = services().await;

        let first = services.sessions.get_or_create_active_session("t1").await.unwrap();
        let again = services.sessions.get_or_create_active_session("t1").await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(first.store_id, "s1");
        assert!(first.is_active);
        assert_eq!(table_status(&db, "t1").await, "occupied");
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_active_session() {
        let (db, services) = services().await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sessions = services.sessions.clone();
            handles.push(tokio::spawn(async move {
                sessions.get_or_create_active_session("t1").await
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(
            count(&db, "SELECT COUNT(*) FROM table_sessions WHERE table_id = 't1' AND is_active = 1").await,
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_and_storeless_tables() {
        let (_db, services) = services().await;

        let err = services.sessions.get_or_create_active_session("nope").await.unwrap_err();
        assert_eq!(code(&err), "NOT_FOUND");

        let err = services.sessions.get_or_create_active_session("t-orphan").await.unwrap_err();
        assert_eq!(code(&err), "STORE_RESOLUTION_FAILED");
    }

    #[tokio::test]
    async fn test_close_records_totals_and_frees_table() {
        let (db, services) = services().await;
        let session = services.sessions.get_or_create_active_session("t1").await.unwrap();

        let totals = SessionTotals {
            subtotal: Money::from_cents(5000),
            discount: Money::from_cents(500),
            service_charge: Money::from_cents(250),
            tax: Money::from_cents(400),
        };
        let closed = services.sessions.close_session(&session.id, totals).await.unwrap();

        assert!(!closed.is_active);
        assert!(closed.ended_at.is_some());
        assert_eq!(closed.grand_total_cents, 5150);
        assert_eq!(table_status(&db, "t1").await, "active");

        let err = services.sessions.close_session(&session.id, totals).await.unwrap_err();
        assert_eq!(code(&err), "SESSION_NOT_ACTIVE");

        let next = services.sessions.get_or_create_active_session("t1").await.unwrap();
        assert_ne!(next.id, session.id);
    }
}
