//! # Catalog Repository
//!
//! Read-only access to dishes, combos, add-ons and recipe lines. The
//! catalog is maintained elsewhere; this crate only prices and consumes it.

use sqlx::SqliteConnection;
use tavola_core::{LinkedEntity, LinkedKind, RecipeLine, Station, TargetKind};

use crate::error::DbResult;

/// A priced catalog row. `price_cents` is `None` when no price was set.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogRow {
    pub id: String,
    pub name: String,
    pub price_cents: Option<i64>,
    pub station: Station,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AddOnRow {
    pub id: String,
    pub name: String,
    pub price_cents: Option<i64>,
}

/// Repository for catalog lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogRepository;

impl CatalogRepository {
    /// Active dish or combo by id within a store.
    pub async fn target(
        conn: &mut SqliteConnection,
        store_id: &str,
        kind: TargetKind,
        id: &str,
    ) -> DbResult<Option<CatalogRow>> {
        let sql = match kind {
            TargetKind::Dish => {
                "SELECT id, name, price_cents, station FROM dishes \
                 WHERE id = ? AND store_id = ? AND is_active = 1"
            }
            TargetKind::Combo => {
                "SELECT id, name, price_cents, station FROM combos \
                 WHERE id = ? AND store_id = ? AND is_active = 1"
            }
        };

        let row = sqlx::query_as::<_, CatalogRow>(sql)
            .bind(id)
            .bind(store_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    pub async fn add_on(
        conn: &mut SqliteConnection,
        store_id: &str,
        id: &str,
    ) -> DbResult<Option<AddOnRow>> {
        let row = sqlx::query_as::<_, AddOnRow>(
            "SELECT id, name, price_cents FROM add_ons \
             WHERE id = ? AND store_id = ? AND is_active = 1",
        )
        .bind(id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Raw material used by one unit of `entity`.
    pub async fn recipe(
        conn: &mut SqliteConnection,
        entity: &LinkedEntity,
    ) -> DbResult<Vec<RecipeLine>> {
        let lines = sqlx::query_as::<_, RecipeLine>(
            "SELECT stock_id, quantity FROM recipe_lines \
             WHERE linked_kind = ? AND linked_id = ? ORDER BY stock_id",
        )
        .bind(entity.kind)
        .bind(&entity.id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(lines)
    }

    /// Whether the linked entity exists at all (active or not).
    pub async fn exists(conn: &mut SqliteConnection, entity: &LinkedEntity) -> DbResult<bool> {
        let sql = match entity.kind {
            LinkedKind::Dish => "SELECT COUNT(*) FROM dishes WHERE id = ?",
            LinkedKind::Combo => "SELECT COUNT(*) FROM combos WHERE id = ?",
            LinkedKind::AddOn => "SELECT COUNT(*) FROM add_ons WHERE id = ?",
        };
        let count: i64 = sqlx::query_scalar(sql)
            .bind(&entity.id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count > 0)
    }
}
