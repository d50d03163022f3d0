use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::PaymentRecord;
use crate::pipeline::{DeviceOutcome, Extension, confirm_payment};

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub client_id: i64,
    pub receipt: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub data: PaymentRecord,
    pub end_date: String,
    pub extension: Extension,
    pub device: DeviceOutcome,
}

/// Apply a receipt by hand, e.g. when the customer closed the payment page
/// before the watcher saw the callback.
pub async fn confirm_payment_manually(
    State(state): State<AppState>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>> {
    let receipt = request.receipt.trim();
    if receipt.is_empty() {
        return Err(AppError::BadRequest("Missing receipt".into()));
    }

    let confirmation = confirm_payment(&state, request.client_id, receipt).await?;

    tracing::info!(
        subscriber_id = request.client_id,
        receipt,
        end_date = %confirmation.extension.new_end_date_local,
        device_reconciled = confirmation.device.is_reconciled(),
        "Payment confirmed manually"
    );

    Ok(Json(ConfirmPaymentResponse {
        end_date: confirmation.extension.new_end_date_local.clone(),
        data: confirmation.payment,
        extension: confirmation.extension,
        device: confirmation.device,
    }))
}
