//! Stock consumption and supplier purchases.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tavola_core::{LinkedEntity, LinkedKind, PurchaseLine};

use super::{body, Envelope};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeBody {
    pub stock_id: String,
    pub quantity: i64,
    pub linked_entity_id: String,
    #[serde(default)]
    pub linked_entity_kind: Option<LinkedKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBody {
    pub supplier_id: String,
    pub lines: Vec<PurchaseLine>,
}

/// POST /stock/consume. The linked entity defaults to a dish.
pub async fn consume(
    State(state): State<AppState>,
    payload: Result<Json<ConsumeBody>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    let linked = LinkedEntity {
        kind: request.linked_entity_kind.unwrap_or(LinkedKind::Dish),
        id: request.linked_entity_id,
    };
    let consumption = state
        .services
        .stock
        .consume(&request.stock_id, request.quantity, linked)
        .await?;
    Ok(Envelope::data(consumption, "Stock consumed").into_response())
}

pub async fn record_purchase(
    State(state): State<AppState>,
    payload: Result<Json<PurchaseBody>, JsonRejection>,
) -> ApiResult<Response> {
    let PurchaseBody { supplier_id, lines } = body(payload)?;
    let purchase = state
        .services
        .stock
        .record_purchase(&supplier_id, lines)
        .await?;
    Ok((StatusCode::CREATED, Envelope::data(purchase, "Purchase recorded")).into_response())
}

/// DELETE /purchases/{id} reverses the purchase; the row is kept, flagged deleted.
pub async fn reverse_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let purchase = state.services.stock.reverse(&id).await?;
    Ok(Envelope::data(purchase, "Purchase reversed").into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::test_helpers::{app, send};

    #[tokio::test]
    async fn test_consume_checks_availability() {
        let (_db, app) = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/stock/consume",
            Some(json!({ "stockId": "st-bun", "quantity": 4, "linkedEntityId": "d-burger" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["quantity"], 4);
        assert_eq!(body["data"]["linkedKind"], "dish");

        let (status, body) = send(
            &app,
            Method::POST,
            "/stock/consume",
            Some(json!({ "stockId": "st-bun", "quantity": 7, "linkedEntityId": "d-burger" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "INSUFFICIENT_STOCK");
    }

    #[tokio::test]
    async fn test_purchase_and_reversal_move_supplier_ledger() {
        let (_db, app) = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/purchases",
            Some(json!({
                "supplierId": "su1",
                "lines": [{ "stockId": "st-bun", "quantity": 5, "unitCost": 100 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = send(&app, Method::GET, "/ledger/supplier/su1", None).await;
        assert_eq!(body["data"]["due"], 500);

        let uri = format!("/purchases/{id}");
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/ledger/supplier/su1", None).await;
        assert_eq!(body["data"]["due"], 0);
        assert_eq!(body["data"]["entries"][1]["entryType"], "RETURN");

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "PURCHASE_ALREADY_REVERSED");
    }
}
