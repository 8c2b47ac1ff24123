//! Customer and supplier ledgers.
//!
//! `{owner_kind}` is `customer` or `supplier` (plural accepted).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tavola_core::{LedgerEntry, LedgerEntryType, LedgerOwner, Money, OwnerKind};

use super::{body, Envelope};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView {
    pub owner: LedgerOwner,
    pub due: Money,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEntryBody {
    pub entry_type: LedgerEntryType,
    pub amount: Money,
    #[serde(default)]
    pub reference_id: Option<String>,
}

fn owner(kind: &str, id: String) -> ApiResult<LedgerOwner> {
    let kind: OwnerKind = kind.parse()?;
    Ok(LedgerOwner { kind, id })
}

pub async fn get(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let owner = owner(&kind, id)?;
    let entries = state.services.ledger.entries(&owner).await?;
    let due = tavola_core::ledger::fold_balance(&entries);
    let view = LedgerView {
        owner,
        due,
        entries,
    };
    Ok(Envelope::data(view, "Ledger").into_response())
}

pub async fn post_entry(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    payload: Result<Json<PostEntryBody>, JsonRejection>,
) -> ApiResult<Response> {
    let owner = owner(&kind, id)?;
    let request = body(payload)?;
    let entry = state
        .services
        .ledger
        .post_entry(
            &owner,
            request.entry_type,
            request.amount,
            request.reference_id.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Envelope::data(entry, "Entry posted")).into_response())
}

/// Rewrites diverging closing balances; answers with the audit taken before.
pub async fn reconcile(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let owner = owner(&kind, id)?;
    let audit = state.services.ledger.reconcile(&owner).await?;
    let message = if audit.is_consistent() {
        "Ledger consistent"
    } else {
        "Ledger reconciled"
    };
    Ok(Envelope::data(audit, message).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::routes::test_helpers::{app, send};

    #[tokio::test]
    async fn test_customer_ledger_postings() {
        let (db, app) = app().await;

        for (entry_type, amount) in [("OPENING_BALANCE", -200), ("SALE", 1000), ("PAYMENT_IN", 700)] {
            let (status, _) = send(
                &app,
                Method::POST,
                "/ledger/customers/cu1/entries",
                Some(json!({ "entryType": entry_type, "amount": amount })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(&app, Method::GET, "/ledger/customer/cu1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["due"], 100);
        assert_eq!(body["data"]["entries"][2]["closingBalanceCents"], 100);

        sqlx::query("UPDATE ledger_entries SET closing_balance_cents = 5 WHERE sequence = 3")
            .execute(db.pool())
            .await
            .unwrap();

        let (status, body) = send(&app, Method::POST, "/ledger/customer/cu1/reconcile", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Ledger reconciled");
        assert_eq!(body["data"]["divergences"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, Method::POST, "/ledger/customer/cu1/reconcile", None).await;
        assert_eq!(body["message"], "Ledger consistent");
    }

    #[tokio::test]
    async fn test_ledger_rejections() {
        let (_db, app) = app().await;

        let (status, body) = send(&app, Method::GET, "/ledger/vendor/su1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = send(
            &app,
            Method::POST,
            "/ledger/supplier/su1/entries",
            Some(json!({ "entryType": "SALE", "amount": 100 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "INVALID_LEDGER_ENTRY");
    }
}
