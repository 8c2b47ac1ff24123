//! # External Collaborators
//!
//! Seams for the services this engine consumes but does not own: catalog
//! pricing and store resolution.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OrderService ──► dyn CatalogLookup ──► SqliteCatalog (catalog tables)  │
//! │  CheckoutEngine ─► dyn StoreResolver ─► SqliteStoreResolver            │
//! │                                                                         │
//! │  Both take the caller's connection: lookups read inside the same        │
//! │  transaction that writes, so prices and stores can't shift mid-unit.    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tavola_core::{
    CoreError, ItemTarget, LinkedEntity, Money, PricedAddOn, PricedTarget, RecipeLine,
};

use crate::error::EngineResult;
use crate::repository::{CatalogRepository, TableRepository};

// =============================================================================
// Catalog
// =============================================================================

/// Prices order targets and add-ons and reports their recipes.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Fails `ItemNotFound` for unknown targets and `PriceMissing` for
    /// targets without a price.
    async fn resolve_target(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        target: &ItemTarget,
    ) -> EngineResult<PricedTarget>;

    async fn resolve_add_on(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        add_on_id: &str,
    ) -> EngineResult<PricedAddOn>;

    /// Stock used per unit of `entity`. Empty if it has no recipe.
    async fn recipe(
        &self,
        conn: &mut SqliteConnection,
        entity: &LinkedEntity,
    ) -> EngineResult<Vec<RecipeLine>>;

    async fn exists(&self, conn: &mut SqliteConnection, entity: &LinkedEntity)
        -> EngineResult<bool>;
}

/// Catalog backed by the `dishes`, `combos`, `add_ons` and `recipe_lines` tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCatalog;

#[async_trait]
impl CatalogLookup for SqliteCatalog {
    async fn resolve_target(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        target: &ItemTarget,
    ) -> EngineResult<PricedTarget> {
        let row = CatalogRepository::target(conn, store_id, target.kind(), target.id())
            .await?
            .ok_or_else(|| CoreError::ItemNotFound {
                kind: target.kind().to_string(),
                id: target.id().to_string(),
            })?;

        let price = row.price_cents.ok_or_else(|| CoreError::PriceMissing {
            kind: target.kind().to_string(),
            id: target.id().to_string(),
        })?;

        Ok(PricedTarget {
            target: target.clone(),
            name: row.name,
            unit_price: Money::from_cents(price),
            station: row.station,
        })
    }

    async fn resolve_add_on(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        add_on_id: &str,
    ) -> EngineResult<PricedAddOn> {
        let row = CatalogRepository::add_on(conn, store_id, add_on_id)
            .await?
            .ok_or_else(|| CoreError::ItemNotFound {
                kind: "AddOn".to_string(),
                id: add_on_id.to_string(),
            })?;

        let price = row.price_cents.ok_or_else(|| CoreError::PriceMissing {
            kind: "AddOn".to_string(),
            id: add_on_id.to_string(),
        })?;

        Ok(PricedAddOn {
            add_on_id: row.id,
            name: row.name,
            unit_price: Money::from_cents(price),
        })
    }

    async fn recipe(
        &self,
        conn: &mut SqliteConnection,
        entity: &LinkedEntity,
    ) -> EngineResult<Vec<RecipeLine>> {
        Ok(CatalogRepository::recipe(conn, entity).await?)
    }

    async fn exists(
        &self,
        conn: &mut SqliteConnection,
        entity: &LinkedEntity,
    ) -> EngineResult<bool> {
        Ok(CatalogRepository::exists(conn, entity).await?)
    }
}

// =============================================================================
// Store Resolution
// =============================================================================

/// Maps a table or a session to its owning store.
#[async_trait]
pub trait StoreResolver: Send + Sync {
    async fn store_for_table(
        &self,
        conn: &mut SqliteConnection,
        table_id: &str,
    ) -> EngineResult<String>;

    async fn store_for_session(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> EngineResult<String>;
}

/// Resolves stores from the `store_id` columns of tables and sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStoreResolver;

#[async_trait]
impl StoreResolver for SqliteStoreResolver {
    async fn store_for_table(
        &self,
        conn: &mut SqliteConnection,
        table_id: &str,
    ) -> EngineResult<String> {
        let table = TableRepository::fetch_table(conn, table_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Table", table_id))?;

        table
            .store_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                CoreError::StoreResolution(format!("table {table_id} has no store")).into()
            })
    }

    async fn store_for_session(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> EngineResult<String> {
        let session = TableRepository::fetch_session(conn, session_id)
            .await?
            .ok_or_else(|| CoreError::StoreResolution(format!("session {session_id} is unknown")))?;

        if session.store_id.trim().is_empty() {
            return Err(
                CoreError::StoreResolution(format!("session {session_id} has no store")).into(),
            );
        }
        Ok(session.store_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::{OrderContext, ServiceContext, Services};
    use crate::test_support::{dish, seeded_db};

    /// Half price on every dish and combo; add-ons and recipes unchanged.
    struct HappyHour;

    #[async_trait]
    impl CatalogLookup for HappyHour {
        async fn resolve_target(
            &self,
            conn: &mut SqliteConnection,
            store_id: &str,
            target: &ItemTarget,
        ) -> EngineResult<PricedTarget> {
            let mut priced = SqliteCatalog.resolve_target(conn, store_id, target).await?;
            priced.unit_price = Money::from_cents(priced.unit_price.cents() / 2);
            Ok(priced)
        }

        async fn resolve_add_on(
            &self,
            conn: &mut SqliteConnection,
            store_id: &str,
            add_on_id: &str,
        ) -> EngineResult<PricedAddOn> {
            SqliteCatalog.resolve_add_on(conn, store_id, add_on_id).await
        }

        async fn recipe(
            &self,
            conn: &mut SqliteConnection,
            entity: &LinkedEntity,
        ) -> EngineResult<Vec<RecipeLine>> {
            SqliteCatalog.recipe(conn, entity).await
        }

        async fn exists(
            &self,
            conn: &mut SqliteConnection,
            entity: &LinkedEntity,
        ) -> EngineResult<bool> {
            SqliteCatalog.exists(conn, entity).await
        }
    }

    #[tokio::test]
    async fn test_orders_are_priced_through_the_catalog_seam() {
        let db = seeded_db().await;
        let services = Services::new(ServiceContext::new(db).with_catalog(Arc::new(HappyHour)));

        let detail = services
            .orders
            .create_order(OrderContext::dine_in("t1"), vec![dish("d-burger", 2)])
            .await
            .unwrap();

        assert_eq!(detail.items[0].unit_price_cents, 600);
        assert_eq!(detail.order.total_cents, 1200);
    }

    #[tokio::test]
    async fn test_sqlite_store_resolver() {
        let db = seeded_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let store = SqliteStoreResolver.store_for_table(&mut conn, "t1").await.unwrap();
        assert_eq!(store, "s1");

        let err = SqliteStoreResolver
            .store_for_table(&mut conn, "t-orphan")
            .await
            .unwrap_err();
        assert_eq!(crate::test_support::code(&err), "STORE_RESOLUTION_FAILED");

        let err = SqliteStoreResolver
            .store_for_session(&mut conn, "no-such-session")
            .await
            .unwrap_err();
        assert_eq!(crate::test_support::code(&err), "STORE_RESOLUTION_FAILED");
    }
}
