//! Seeded in-memory database for service tests.
//!
//! ```text
//! store s1
//!   tables   t1, t2 (store s1)         t-orphan (no store)
//!   dishes   d-burger 1200 kitchen     d-cola 300 bar     d-unpriced (no price)
//!   combos   c-meal 2000 kitchen
//!   add-ons  a-cheese 150
//!   stock    st-bun 10   st-patty 5   st-syrup 100   st-cheese 20
//!   recipes  d-burger: bun 1, patty 1   d-cola: syrup 10
//!            c-meal: bun 1, patty 1, syrup 10   a-cheese: cheese 1
//!   parties  customer cu1, supplier su1
//! ```

use tavola_core::order::{AddOnRequest, NewOrderItem};
use tavola_core::ItemTarget;

use crate::pool::{Database, DbConfig};
use crate::service::{ServiceContext, Services};

const SEED: &[&str] = &[
    "INSERT INTO stores (id, name) VALUES ('s1', 'Main Street')",
    "INSERT INTO dining_tables (id, store_id, name) VALUES ('t1', 's1', 'Table 1')",
    "INSERT INTO dining_tables (id, store_id, name) VALUES ('t2', 's1', 'Table 2')",
    "INSERT INTO dining_tables (id, store_id, name) VALUES ('t-orphan', NULL, 'Patio')",
    "INSERT INTO dishes (id, store_id, name, price_cents, station) VALUES ('d-burger', 's1', 'Burger', 1200, 'kitchen')",
    "INSERT INTO dishes (id, store_id, name, price_cents, station) VALUES ('d-cola', 's1', 'Cola', 300, 'bar')",
    "INSERT INTO dishes (id, store_id, name, price_cents, station) VALUES ('d-unpriced', 's1', 'Special', NULL, 'kitchen')",
    "INSERT INTO combos (id, store_id, name, price_cents, station) VALUES ('c-meal', 's1', 'Meal Deal', 2000, 'kitchen')",
    "INSERT INTO add_ons (id, store_id, name, price_cents) VALUES ('a-cheese', 's1', 'Cheese', 150)",
    "INSERT INTO stock_items (id, store_id, name, quantity, amount_cents) VALUES ('st-bun', 's1', 'Bun', 10, 1000)",
    "INSERT INTO stock_items (id, store_id, name, quantity, amount_cents) VALUES ('st-patty', 's1', 'Patty', 5, 2500)",
    "INSERT INTO stock_items (id, store_id, name, unit, quantity, amount_cents) VALUES ('st-syrup', 's1', 'Syrup', 'ml', 100, 500)",
    "INSERT INTO stock_items (id, store_id, name, quantity, amount_cents) VALUES ('st-cheese', 's1', 'Cheese slice', 20, 400)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r1', 'dish', 'd-burger', 'st-bun', 1)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r2', 'dish', 'd-burger', 'st-patty', 1)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r3', 'dish', 'd-cola', 'st-syrup', 10)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r4', 'combo', 'c-meal', 'st-bun', 1)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r5', 'combo', 'c-meal', 'st-patty', 1)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r6', 'combo', 'c-meal', 'st-syrup', 10)",
    "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r7', 'add_on', 'a-cheese', 'st-cheese', 1)",
    "INSERT INTO customers (id, store_id, name) VALUES ('cu1', 's1', 'Ayesha')",
    "INSERT INTO suppliers (id, store_id, name) VALUES ('su1', 's1', 'Fresh Farms')",
];

/// Migrated and seeded in-memory database.
pub(crate) async fn seeded_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    for statement in SEED {
        sqlx::query(statement).execute(db.pool()).await.unwrap();
    }
    db
}

/// Services over a seeded database, plus a handle on that database.
pub(crate) async fn services() -> (Database, Services) {
    let db = seeded_db().await;
    let services = Services::new(ServiceContext::new(db.clone()));
    (db, services)
}

pub(crate) fn dish(id: &str, quantity: i64) -> NewOrderItem {
    NewOrderItem {
        target: ItemTarget::Dish(id.to_string()),
        quantity,
        add_ons: Vec::new(),
    }
}

pub(crate) fn with_cheese(mut item: NewOrderItem, quantity: i64) -> NewOrderItem {
    item.add_ons.push(AddOnRequest {
        add_on_id: "a-cheese".to_string(),
        quantity,
    });
    item
}

pub(crate) async fn stock_qty(db: &Database, stock_id: &str) -> i64 {
    sqlx::query_scalar("SELECT quantity FROM stock_items WHERE id = ?")
        .bind(stock_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

pub(crate) async fn table_status(db: &Database, table_id: &str) -> String {
    sqlx::query_scalar("SELECT status FROM dining_tables WHERE id = ?")
        .bind(table_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

pub(crate) async fn count(db: &Database, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(db.pool()).await.unwrap()
}

/// Reason code of a domain error, `"DB"` for storage failures.
pub(crate) fn code(err: &crate::error::EngineError) -> &'static str {
    err.as_domain().map(|e| e.code()).unwrap_or("DB")
}
