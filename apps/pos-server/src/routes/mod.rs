//! HTTP routes.
//!
//! | Method | Path                                           | Handler                 |
//! |--------|------------------------------------------------|-------------------------|
//! | POST   | /checkout                                      | checkout::checkout      |
//! | POST   | /payments/gateway/{transaction_ref}/confirm    | checkout::confirm       |
//! | POST   | /payments/gateway/{transaction_ref}/cancel     | checkout::cancel        |
//! | POST   | /orders                                        | orders::create          |
//! | GET    | /orders/{id}                                   | orders::get             |
//! | PATCH  | /orders/{id}                                   | orders::update          |
//! | DELETE | /orders/{id}                                   | orders::delete          |
//! | GET    | /orders/{id}/tickets                           | orders::tickets         |
//! | POST   | /stock/consume                                 | stock::consume          |
//! | POST   | /purchases                                     | stock::record_purchase  |
//! | DELETE | /purchases/{id}                                | stock::reverse_purchase |
//! | GET    | /ledger/{owner_kind}/{owner_id}                | ledger::get             |
//! | POST   | /ledger/{owner_kind}/{owner_id}/entries        | ledger::post_entry      |
//! | POST   | /ledger/{owner_kind}/{owner_id}/reconcile      | ledger::reconcile       |
//! | GET    | /health                                        | health::health          |

pub mod checkout;
pub mod health;
pub mod ledger;
pub mod orders;
pub mod stock;

use axum::extract::rejection::JsonRejection;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/checkout", post(checkout::checkout))
        .route(
            "/payments/gateway/{transaction_ref}/confirm",
            post(checkout::confirm),
        )
        .route(
            "/payments/gateway/{transaction_ref}/cancel",
            post(checkout::cancel),
        )
        .route("/orders", post(orders::create))
        .route(
            "/orders/{id}",
            get(orders::get).patch(orders::update).delete(orders::delete),
        )
        .route("/orders/{id}/tickets", get(orders::tickets))
        .route("/stock/consume", post(stock::consume))
        .route("/purchases", post(stock::record_purchase))
        .route("/purchases/{id}", delete(stock::reverse_purchase))
        .route("/ledger/{owner_kind}/{owner_id}", get(ledger::get))
        .route(
            "/ledger/{owner_kind}/{owner_id}/entries",
            post(ledger::post_entry),
        )
        .route(
            "/ledger/{owner_kind}/{owner_id}/reconcile",
            post(ledger::reconcile),
        )
        .route("/health", get(health::health))
        .with_state(state)
}

// =============================================================================
// Envelope
// =============================================================================

/// Success body. Failures are rendered by [`ApiError`].
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<T>,
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn data(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Envelope {
            success: true,
            data: Some(data),
            config: None,
            message: message.into(),
        })
    }

    pub fn config(config: T, message: impl Into<String>) -> Json<Self> {
        Json(Envelope {
            success: true,
            data: None,
            config: Some(config),
            message: message.into(),
        })
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Envelope {
            success: true,
            data: None,
            config: None,
            message: message.into(),
        })
    }
}

/// Malformed bodies answer with the envelope rather than axum's plain text.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// Unwraps a JSON body extracted as `Result<Json<T>, JsonRejection>`.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(ApiError::from)
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tavola_db::{Database, DbConfig, ServiceContext};
    use tower::ServiceExt;

    use super::router;
    use crate::state::AppState;

    const SEED: &[&str] = &[
        "INSERT INTO stores (id, name) VALUES ('s1', 'Main Street')",
        "INSERT INTO dining_tables (id, store_id, name) VALUES ('t1', 's1', 'Table 1')",
        "INSERT INTO dishes (id, store_id, name, price_cents, station) VALUES ('d-burger', 's1', 'Burger', 1200, 'kitchen')",
        "INSERT INTO dishes (id, store_id, name, price_cents, station) VALUES ('d-cola', 's1', 'Cola', 300, 'bar')",
        "INSERT INTO stock_items (id, store_id, name, quantity, amount_cents) VALUES ('st-bun', 's1', 'Bun', 10, 1000)",
        "INSERT INTO stock_items (id, store_id, name, unit, quantity, amount_cents) VALUES ('st-syrup', 's1', 'Syrup', 'ml', 100, 500)",
        "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r1', 'dish', 'd-burger', 'st-bun', 1)",
        "INSERT INTO recipe_lines (id, linked_kind, linked_id, stock_id, quantity) VALUES ('r2', 'dish', 'd-cola', 'st-syrup', 10)",
        "INSERT INTO customers (id, store_id, name) VALUES ('cu1', 's1', 'Ayesha')",
        "INSERT INTO suppliers (id, store_id, name) VALUES ('su1', 's1', 'Fresh Farms')",
    ];

    pub async fn app() -> (Database, Router) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for statement in SEED {
            sqlx::query(statement).execute(db.pool()).await.unwrap();
        }
        let app = router(AppState::new(ServiceContext::new(db.clone())));
        (db, app)
    }

    /// Sends one request and returns the status plus the parsed JSON body.
    pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
