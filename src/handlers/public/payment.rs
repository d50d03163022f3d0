use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::{PaymentRequest, Subscriber};
use crate::payments::InitiatePaymentRequest;

#[derive(Debug, Deserialize)]
pub struct PaymentInitRequest {
    pub client_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PaymentInitResponse {
    pub client_details: Subscriber,
    pub response: PaymentRequest,
}

/// Start an M-Pesa STK push for a subscriber's next month.
///
/// The returned `CheckoutRequestID` is what the customer's page sends to
/// `/ws` to wait for the confirmation.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentInitRequest>,
) -> Result<Json<PaymentInitResponse>> {
    let client_id = request
        .client_id
        .ok_or_else(|| AppError::BadRequest("Missing client_id".into()))?;

    let (subscriber, settings) = {
        let conn = state.db.get()?;
        let subscriber = queries::get_subscriber_by_id(&conn, client_id)?
            .ok_or_else(|| AppError::NotFound("Client not found".into()))?;
        let company_id = subscriber
            .company_id
            .ok_or_else(|| AppError::NotFound("PayHero settings not found".into()))?;
        let settings = queries::get_payhero_settings(&conn, company_id)?
            .ok_or_else(|| AppError::NotFound("PayHero settings not found".into()))?;
        (subscriber, settings)
    };

    let callback_url = callback_url(&state, settings.pppoe_callback_url.as_deref());
    let external_reference = format!("INV-{}-{}", subscriber.id, Utc::now().timestamp());
    let payment_request = InitiatePaymentRequest::for_subscriber(
        &subscriber,
        &settings,
        external_reference,
        callback_url,
    );

    let gateway_response = state.payhero.initiate_payment(&settings, &payment_request).await?;

    let stored = {
        let conn = state.db.get()?;
        queries::create_payment_request(
            &conn,
            &subscriber,
            gateway_response.success,
            gateway_response.status.as_deref(),
            gateway_response.reference.as_deref(),
            gateway_response.checkout_request_id.as_deref(),
        )?
    };

    tracing::info!(
        subscriber_id = subscriber.id,
        amount = payment_request.amount,
        checkout_request_id = ?stored.checkout_request_id,
        "Payment request sent"
    );

    Ok(Json(PaymentInitResponse {
        client_details: subscriber,
        response: stored,
    }))
}

/// Company-specific callback URL if set, otherwise ours. The shared token is
/// appended so the callback handler can authenticate the gateway.
fn callback_url(state: &AppState, configured: Option<&str>) -> String {
    let base = configured
        .map(String::from)
        .unwrap_or_else(|| format!("{}/api/callback/payhero", state.base_url));

    match &state.payhero_callback_token {
        Some(token) => {
            let sep = if base.contains('?') { '&' } else { '?' };
            format!("{}{}token={}", base, sep, urlencoding::encode(token))
        }
        None => base,
    }
}
