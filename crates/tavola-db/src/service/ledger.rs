//! # Ledger Engine
//!
//! Posting, folding, auditing and reconciling customer and supplier ledgers.
//!
//! ## Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  post_entry(customer C, SALE, 600)                                      │
//! │                                                                         │
//! │  latest entry of C ──► seq 1, closing 100                              │
//! │  new entry         ──► seq 2, closing 100 + 600 = 700                  │
//! │                                                                         │
//! │  Two writers both reading seq 1 would both try seq 2; UNIQUE           │
//! │  (owner_kind, owner_id, sequence) rejects the second, which retries    │
//! │  and posts seq 3 from closing 700.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The due amount is always the fold over every entry. Closing balances are
//! a cache: [`LedgerEngine::verify`] reports where they drift and
//! [`LedgerEngine::reconcile`] rewrites them from the fold.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::ledger::{audit, check_entry, effect, fold_balance, LedgerAudit};
use tavola_core::{CoreError, LedgerEntry, LedgerEntryType, LedgerOwner, Money, OwnerKind};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::repository::{LedgerRepository, PartyRepository};
use crate::service::ServiceContext;

#[derive(Debug, Clone)]
pub struct LedgerEngine {
    ctx: Arc<ServiceContext>,
}

impl LedgerEngine {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        LedgerEngine { ctx }
    }

    /// Appends an entry computed from the owner's latest closing balance.
    pub async fn post_entry(
        &self,
        owner: &LedgerOwner,
        entry_type: LedgerEntryType,
        amount: Money,
        reference_id: Option<&str>,
    ) -> EngineResult<LedgerEntry> {
        check_entry(owner.kind, entry_type, amount)?;

        let db = &self.ctx.db;
        db.with_retry("post_ledger_entry", || async move {
            let mut tx = db.begin_write().await?;
            let entry = self
                .post_in(tx.conn(), owner, entry_type, amount, reference_id, Utc::now())
                .await?;
            tx.commit().await?;
            Ok::<_, EngineError>(entry)
        })
        .await
    }

    /// Outstanding balance: the fold of every entry in creation order.
    pub async fn due_amount(&self, owner: &LedgerOwner) -> EngineResult<Money> {
        let entries = self.entries(owner).await?;
        Ok(fold_balance(&entries))
    }

    /// Compares each cached closing balance with the running fold.
    pub async fn verify(&self, owner: &LedgerOwner) -> EngineResult<LedgerAudit> {
        let entries = self.entries(owner).await?;
        Ok(audit(owner.clone(), &entries))
    }

    /// Rewrites every diverging closing balance from the fold.
    ///
    /// Returns the audit taken before the rewrite, listing what was corrected.
    pub async fn reconcile(&self, owner: &LedgerOwner) -> EngineResult<LedgerAudit> {
        let db = &self.ctx.db;
        db.with_retry("reconcile_ledger", || async move {
            let mut tx = db.begin_write().await?;
            let entries = LedgerRepository::entries(tx.conn(), owner).await?;
            let report = audit(owner.clone(), &entries);

            for divergence in &report.divergences {
                LedgerRepository::set_closing_balance(
                    tx.conn(),
                    &divergence.entry_id,
                    divergence.expected.cents(),
                )
                .await?;
            }
            tx.commit().await?;

            if report.is_consistent() {
                info!(owner = %owner, due = %report.due, "Ledger already consistent");
            } else {
                warn!(
                    owner = %owner,
                    corrected = report.divergences.len(),
                    due = %report.due,
                    "Ledger closing balances rewritten from fold"
                );
            }
            Ok::<_, EngineError>(report)
        })
        .await
    }

    pub async fn entries(&self, owner: &LedgerOwner) -> EngineResult<Vec<LedgerEntry>> {
        let mut conn = self.ctx.db.pool().acquire().await?;
        Ok(LedgerRepository::entries(&mut conn, owner).await?)
    }

    // =========================================================================
    // In-transaction variant
    // =========================================================================

    pub(crate) async fn post_in(
        &self,
        conn: &mut SqliteConnection,
        owner: &LedgerOwner,
        entry_type: LedgerEntryType,
        amount: Money,
        reference_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> EngineResult<LedgerEntry> {
        check_entry(owner.kind, entry_type, amount)?;
        ensure_owner_exists(conn, owner).await?;

        let previous = LedgerRepository::latest(conn, owner).await?;
        let (sequence, opening) = match &previous {
            Some(prev) => (prev.sequence + 1, prev.closing_balance()),
            None => (1, Money::zero()),
        };
        let closing = opening
            .checked_add(effect(entry_type, amount))
            .ok_or_else(|| {
                CoreError::InvalidLedgerEntry(format!("closing balance of {} out of range", owner))
            })?;

        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            owner_kind: owner.kind,
            owner_id: owner.id.clone(),
            sequence,
            entry_type,
            amount_cents: amount.cents(),
            closing_balance_cents: closing.cents(),
            reference_id: reference_id.map(str::to_string),
            created_at: now,
        };
        LedgerRepository::insert(conn, &entry).await?;

        Ok(entry)
    }
}

async fn ensure_owner_exists(conn: &mut SqliteConnection, owner: &LedgerOwner) -> EngineResult<()> {
    let exists = match owner.kind {
        OwnerKind::Customer => PartyRepository::customer(conn, &owner.id).await?.is_some(),
        OwnerKind::Supplier => PartyRepository::supplier(conn, &owner.id).await?.is_some(),
    };
    if exists {
        Ok(())
    } else {
        let entity = match owner.kind {
            OwnerKind::Customer => "Customer",
            OwnerKind::Supplier => "Supplier",
        };
        Err(CoreError::not_found(entity, &owner.id).into())
    }
}
