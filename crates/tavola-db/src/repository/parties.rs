//! # Party Repository
//!
//! Customers and suppliers: the owners of ledgers.

use sqlx::SqliteConnection;
use tavola_core::{Customer, Supplier};
use tracing::debug;

use crate::error::DbResult;

/// Repository for customers and suppliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartyRepository;

impl PartyRepository {
    pub async fn customer(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, store_id, name, loyalty_points FROM customers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(customer)
    }

    pub async fn supplier(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Supplier>> {
        let supplier =
            sqlx::query_as::<_, Supplier>("SELECT id, store_id, name FROM suppliers WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(supplier)
    }

    pub async fn add_loyalty_points(
        conn: &mut SqliteConnection,
        customer_id: &str,
        points: i64,
    ) -> DbResult<()> {
        debug!(customer_id = %customer_id, points, "Awarding loyalty points");

        sqlx::query("UPDATE customers SET loyalty_points = loyalty_points + ? WHERE id = ?")
            .bind(points)
            .bind(customer_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
