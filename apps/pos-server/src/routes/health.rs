use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tavola_db::migrations::migration_status;

use super::Envelope;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub database: bool,
    pub migrations_embedded: usize,
    pub migrations_applied: usize,
}

/// GET /health. 503 when the database does not answer.
pub async fn health(State(state): State<AppState>) -> Response {
    let database = state.db.health_check().await;
    let (embedded, applied) = migration_status(state.db.pool()).await.unwrap_or((0, 0));

    let health = Health {
        database,
        migrations_embedded: embedded,
        migrations_applied: applied,
    };
    if database {
        Envelope::data(health, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Envelope::data(health, "database unavailable")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::routes::test_helpers::{app, send};

    #[tokio::test]
    async fn test_health_reports_schema() {
        let (_db, app) = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["database"], true);
        assert_eq!(body["data"]["migrationsEmbedded"], body["data"]["migrationsApplied"]);
    }
}
