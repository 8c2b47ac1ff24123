//! Checkout and gateway callbacks.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tavola_db::{CheckoutOutcome, CheckoutRequest};
use tracing::info;

use super::{body, Envelope};
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /checkout
///
/// Settles immediately, or for gateway payments answers with the redirect
/// `config` and waits for the callback.
pub async fn checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;

    let response = match state.services.checkout.checkout(request).await? {
        CheckoutOutcome::Settled(receipt) => {
            Envelope::data(receipt, "Checkout complete").into_response()
        }
        CheckoutOutcome::Redirect(redirect) => {
            info!(transaction_ref = %redirect.transaction_ref, "Gateway redirect issued");
            Envelope::config(redirect, "Redirect to payment gateway").into_response()
        }
    };
    Ok(response)
}

/// POST /payments/gateway/{transaction_ref}/confirm
pub async fn confirm(
    State(state): State<AppState>,
    Path(transaction_ref): Path<String>,
) -> ApiResult<Response> {
    let receipt = state
        .services
        .checkout
        .confirm_gateway_payment(&transaction_ref)
        .await?;
    Ok(Envelope::data(receipt, "Payment confirmed").into_response())
}

/// POST /payments/gateway/{transaction_ref}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Path(transaction_ref): Path<String>,
) -> ApiResult<Response> {
    let payment = state
        .services
        .checkout
        .cancel_gateway_payment(&transaction_ref)
        .await?;
    Ok(Envelope::data(payment, "Payment cancelled").into_response())
}
