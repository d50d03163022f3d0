use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::payments::PayHeroCallback;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub message: &'static str,
}

fn token_matches(expected: &str, provided: Option<&str>) -> bool {
    match provided {
        Some(provided) => bool::from(expected.as_bytes().ct_eq(provided.as_bytes())),
        None => false,
    }
}

/// PayHero result callback. Settled payments are stored unused so the
/// watcher (or a manual confirmation) can consume them exactly once.
///
/// Redeliveries are acknowledged with 200 so the gateway stops retrying.
pub async fn handle_payhero_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    Json(callback): Json<PayHeroCallback>,
) -> Result<(StatusCode, Json<CallbackAck>)> {
    let authorized = state
        .payhero_callback_token
        .as_deref()
        .is_none_or(|expected| token_matches(expected, params.token.as_deref()));
    if !authorized {
        tracing::warn!(
            checkout_request_id = %callback.response.checkout_request_id,
            "Rejected PayHero callback with bad token"
        );
        return Err(AppError::Unauthorized("Invalid callback token".into()));
    }

    let Some(payment) = callback.settled_payment() else {
        tracing::info!(
            checkout_request_id = %callback.response.checkout_request_id,
            result_code = callback.response.result_code,
            result_desc = ?callback.response.result_desc,
            "PayHero callback without a settled payment"
        );
        return Ok((
            StatusCode::OK,
            Json(CallbackAck {
                message: "Payment not successful",
            }),
        ));
    };

    let conn = state.db.get()?;
    match queries::create_payment_record(&conn, &payment)? {
        Some(record) => {
            tracing::info!(
                payment_id = record.id,
                checkout_request_id = %record.checkout_request_id,
                receipt = %record.receipt_number,
                amount = record.amount,
                "Payment recorded"
            );
            Ok((
                StatusCode::CREATED,
                Json(CallbackAck {
                    message: "Payment recorded",
                }),
            ))
        }
        None => {
            tracing::info!(
                checkout_request_id = %payment.checkout_request_id,
                "Duplicate PayHero callback ignored"
            );
            Ok((
                StatusCode::OK,
                Json(CallbackAck {
                    message: "Payment already recorded",
                }),
            ))
        }
    }
}
