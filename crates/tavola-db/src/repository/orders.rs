//! # Order Repository
//!
//! Orders, order items and item add-ons.
//!
//! ## Storage of the Item Target
//! ```text
//! OrderItem.target = ItemTarget::Combo("c-9")
//!            │
//!            ▼
//! order_items.target_kind = 'combo', order_items.target_id = 'c-9'
//! ```
//! The pair is folded back into [`ItemTarget`] on read, so callers never see
//! the two loose columns.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tavola_core::{
    ItemTarget, Order, OrderItem, OrderItemAddOn, OrderStatus, PaymentMethod, Station, TargetKind,
};
use tracing::debug;

use crate::error::DbResult;

const ORDER_COLUMNS: &str = "id, store_id, table_id, session_id, order_type, status, total_cents, \
     customer_id, payment_id, payment_method, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, target_kind, target_id, name, quantity, \
     unit_price_cents, total_price_cents, complimentary_quantity, status, station, created_at";

/// Flat `order_items` row before the add-ons are attached.
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: String,
    order_id: String,
    target_kind: TargetKind,
    target_id: String,
    name: String,
    quantity: i64,
    unit_price_cents: i64,
    total_price_cents: i64,
    complimentary_quantity: i64,
    status: OrderStatus,
    station: Station,
    created_at: DateTime<Utc>,
}

impl OrderItemRow {
    fn into_item(self, add_ons: Vec<OrderItemAddOn>) -> OrderItem {
        OrderItem {
            id: self.id,
            order_id: self.order_id,
            target: ItemTarget::new(self.target_kind, self.target_id),
            name: self.name,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            total_price_cents: self.total_price_cents,
            complimentary_quantity: self.complimentary_quantity,
            status: self.status,
            station: self.station,
            add_ons,
            created_at: self.created_at,
        }
    }
}

/// Repository for orders and their lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRepository;

impl OrderRepository {
    // =========================================================================
    // Orders
    // =========================================================================

    pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(order_id = %order.id, order_type = ?order.order_type, "Inserting order");

        sqlx::query(
            "INSERT INTO orders (id, store_id, table_id, session_id, order_type, status, \
                 total_cents, customer_id, payment_id, payment_method, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&order.store_id)
        .bind(&order.table_id)
        .bind(&order.session_id)
        .bind(order.order_type)
        .bind(order.status)
        .bind(order.total_cents)
        .bind(&order.customer_id)
        .bind(&order.payment_id)
        .bind(order.payment_method)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(order)
    }

    /// Non-cancelled orders of a session, oldest first.
    pub async fn for_session(
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE session_id = ? AND status != 'cancelled' ORDER BY created_at, rowid"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(session_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(orders)
    }

    /// Take-away orders parked on a table that are neither completed nor cancelled.
    pub async fn open_take_away_for_table(
        conn: &mut SqliteConnection,
        table_id: &str,
    ) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE table_id = ? AND order_type = 'take_away' \
               AND status NOT IN ('completed', 'cancelled') \
             ORDER BY created_at, rowid"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(table_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(orders)
    }

    /// Sets the order status and mirrors it on every item.
    pub async fn set_status(
        conn: &mut SqliteConnection,
        order_id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(order_id = %order_id, status = %status, "Setting order status");

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE order_items SET status = ? WHERE order_id = ?")
            .bind(status)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn set_payment_method(
        conn: &mut SqliteConnection,
        order_id: &str,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE orders SET payment_method = ?, updated_at = ? WHERE id = ?")
            .bind(method)
            .bind(now)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Marks an order COMPLETED under a payment (checkout only).
    pub async fn complete(
        conn: &mut SqliteConnection,
        order_id: &str,
        payment_id: &str,
        customer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(order_id = %order_id, payment_id = %payment_id, "Completing order");

        sqlx::query(
            "UPDATE orders SET status = 'completed', payment_id = ?, \
                 customer_id = COALESCE(?, customer_id), updated_at = ? \
             WHERE id = ?",
        )
        .bind(payment_id)
        .bind(customer_id)
        .bind(now)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
        sqlx::query("UPDATE order_items SET status = 'completed' WHERE order_id = ?")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Rewrites `orders.total_cents` as the sum of the surviving items and
    /// returns the new total.
    pub async fn recompute_total(
        conn: &mut SqliteConnection,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        sqlx::query(
            "UPDATE orders SET total_cents = \
                 (SELECT COALESCE(SUM(total_price_cents), 0) FROM order_items WHERE order_id = ?), \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(order_id)
        .bind(now)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT total_cents FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(total)
    }

    /// Deletes an order; items and add-ons cascade.
    pub async fn delete(conn: &mut SqliteConnection, order_id: &str) -> DbResult<bool> {
        debug!(order_id = %order_id, "Deleting order");

        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Inserts an item together with its add-ons.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
        debug!(item_id = %item.id, order_id = %item.order_id, target = %item.target, "Inserting order item");

        sqlx::query(
            "INSERT INTO order_items (id, order_id, target_kind, target_id, name, quantity, \
                 unit_price_cents, total_price_cents, complimentary_quantity, status, station, \
                 created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(item.target.kind())
        .bind(item.target.id())
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.total_price_cents)
        .bind(item.complimentary_quantity)
        .bind(item.status)
        .bind(item.station)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        for add_on in &item.add_ons {
            Self::insert_add_on(conn, add_on).await?;
        }
        Ok(())
    }

    async fn insert_add_on(conn: &mut SqliteConnection, add_on: &OrderItemAddOn) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO order_item_add_ons \
                 (id, order_item_id, add_on_id, name, unit_price_cents, quantity) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&add_on.id)
        .bind(&add_on.order_item_id)
        .bind(&add_on.add_on_id)
        .bind(&add_on.name)
        .bind(add_on.unit_price_cents)
        .bind(add_on.quantity)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Items of an order with their add-ons, in insertion order.
    pub async fn items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ? ORDER BY created_at, rowid"
        );
        let rows = sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;

        let add_ons = sqlx::query_as::<_, OrderItemAddOn>(
            "SELECT a.id, a.order_item_id, a.add_on_id, a.name, a.unit_price_cents, a.quantity \
             FROM order_item_add_ons a \
             JOIN order_items i ON i.id = a.order_item_id \
             WHERE i.order_id = ? ORDER BY a.rowid",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| {
                let own: Vec<OrderItemAddOn> = add_ons
                    .iter()
                    .filter(|a| a.order_item_id == row.id)
                    .cloned()
                    .collect();
                row.into_item(own)
            })
            .collect();
        Ok(items)
    }

    /// One item of an order, or `None` if it belongs elsewhere or is gone.
    pub async fn item(
        conn: &mut SqliteConnection,
        order_id: &str,
        item_id: &str,
    ) -> DbResult<Option<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = ? AND order_id = ?");
        let row = sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(item_id)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let add_ons = sqlx::query_as::<_, OrderItemAddOn>(
            "SELECT id, order_item_id, add_on_id, name, unit_price_cents, quantity \
             FROM order_item_add_ons WHERE order_item_id = ? ORDER BY rowid",
        )
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(row.into_item(add_ons)))
    }

    /// Writes quantity, complimentary quantity and the recomputed line total.
    pub async fn update_item_pricing(
        conn: &mut SqliteConnection,
        item_id: &str,
        quantity: i64,
        complimentary_quantity: i64,
        total_price_cents: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE order_items SET quantity = ?, complimentary_quantity = ?, \
                 total_price_cents = ? WHERE id = ?",
        )
        .bind(quantity)
        .bind(complimentary_quantity)
        .bind(total_price_cents)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Replaces the add-on set of an item.
    pub async fn replace_add_ons(
        conn: &mut SqliteConnection,
        item_id: &str,
        add_ons: &[OrderItemAddOn],
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM order_item_add_ons WHERE order_item_id = ?")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        for add_on in add_ons {
            Self::insert_add_on(conn, add_on).await?;
        }
        Ok(())
    }

    pub async fn delete_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<()> {
        debug!(item_id = %item_id, "Deleting order item");

        sqlx::query("DELETE FROM order_items WHERE id = ?")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
