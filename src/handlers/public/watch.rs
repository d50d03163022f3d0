use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::db::AppState;
use crate::models::PaymentRecord;
use crate::pipeline::{DeviceOutcome, WatchOutcome, watch_payment};

const NOT_FOUND_MESSAGE: &str = "We did not receive your payment. Contact support for help.";

#[derive(Debug, Deserialize)]
pub struct WatchRequest {
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "clientID")]
    pub client_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatchMessage<'a> {
    Found {
        data: &'a PaymentRecord,
        end_date: &'a str,
        device: &'a DeviceOutcome,
    },
    NotFound {
        message: &'static str,
    },
    Error {
        message: String,
    },
}

/// WebSocket endpoint the payment page uses to wait for its confirmation.
pub async fn watch_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let request: WatchRequest = match serde_json::from_str(text.as_str()) {
            Ok(r) => r,
            Err(e) => {
                let reply = WatchMessage::Error {
                    message: format!("Invalid request: {}", e),
                };
                if !send_json(&mut sender, &reply).await {
                    break;
                }
                continue;
            }
        };

        tracing::info!(
            checkout_request_id = %request.checkout_request_id,
            subscriber_id = request.client_id,
            "Payment watch started"
        );

        let cancel = CancellationToken::new();
        let watch = watch_payment(&state, &request.checkout_request_id, request.client_id, &cancel);
        tokio::pin!(watch);

        // Keep reading while we poll so a closed socket stops the watch
        let outcome = loop {
            tokio::select! {
                outcome = &mut watch => break Some(outcome),
                incoming = receiver.next() => match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {
                        cancel.cancel();
                        break None;
                    }
                    Some(Ok(_)) => continue,
                },
            }
        };

        let Some(outcome) = outcome else {
            // Let the watch observe the cancellation and stop polling
            let _ = watch.await;
            tracing::info!(
                checkout_request_id = %request.checkout_request_id,
                "Client disconnected, payment watch abandoned"
            );
            return;
        };

        match outcome {
            Ok(WatchOutcome::Confirmed(confirmation)) => {
                let reply = WatchMessage::Found {
                    data: &confirmation.payment,
                    end_date: &confirmation.extension.new_end_date_local,
                    device: &confirmation.device,
                };
                if !send_json(&mut sender, &reply).await {
                    break;
                }
            }
            Ok(WatchOutcome::NotFound) => {
                let reply = WatchMessage::NotFound {
                    message: NOT_FOUND_MESSAGE,
                };
                send_json(&mut sender, &reply).await;
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            Ok(WatchOutcome::Cancelled) => break,
            Err(e) => {
                tracing::warn!(
                    checkout_request_id = %request.checkout_request_id,
                    error = %e,
                    "Payment watch failed"
                );
                let reply = WatchMessage::Error {
                    message: format!("{} Contact support for help.", e),
                };
                if !send_json(&mut sender, &reply).await {
                    break;
                }
            }
        }
    }

    tracing::debug!("Payment watch socket closed");
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, message: &WatchMessage<'_>) -> bool {
    let payload = match serde_json::to_string(message) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize watch message");
            return false;
        }
    };
    sender.send(Message::Text(payload.into())).await.is_ok()
}
