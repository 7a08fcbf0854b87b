//! `/ws` handshake admission: credential and capacity checks, then upgrade.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap};
use axum::response::Response;
use metrics::counter;
use tracing::{debug, warn};

use super::session::run_ws_session;
use crate::errors::AdmissionError;
use crate::hub::display_identity;
use crate::metrics::WS_ADMISSION_REJECTIONS_TOTAL;
use crate::server::AppState;

/// Handshake header carrying the shared secret. Header names are
/// case-insensitive.
pub const API_KEY_HEADER: &str = "api-key";

/// Check the `API-KEY` header against the shared secret.
pub fn check_credential(headers: &HeaderMap, expected: &str) -> Result<(), AdmissionError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .ok_or(AdmissionError::MissingCredential)?;
    if presented.as_bytes() == expected.as_bytes() {
        Ok(())
    } else {
        Err(AdmissionError::InvalidCredential)
    }
}

/// Every check that must pass before a socket is opened.
pub fn admit(state: &AppState, headers: &HeaderMap) -> Result<(), AdmissionError> {
    check_credential(headers, &state.api_key)?;
    if state.shutdown.is_shutting_down() || !state.hub.is_accepting() {
        return Err(AdmissionError::ShuttingDown);
    }
    if state.max_connections > 0 && state.hub.connection_count() >= state.max_connections {
        return Err(AdmissionError::CapacityExhausted);
    }
    Ok(())
}

/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AdmissionError> {
    let peer_addr = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    if let Err(error) = admit(&state, &headers) {
        counter!(WS_ADMISSION_REJECTIONS_TOTAL, "reason" => error.label()).increment(1);
        warn!(?peer_addr, %error, "handshake rejected");
        return Err(error);
    }
    let upgrade = upgrade.map_err(|rejection| {
        counter!(WS_ADMISSION_REJECTIONS_TOTAL, "reason" => "upgrade").increment(1);
        AdmissionError::Upgrade(rejection.to_string())
    })?;

    let hub = state.hub.clone();
    let id = hub.next_connection_id();
    let identity = display_identity();
    debug!(conn_id = %id, identity, ?peer_addr, "handshake accepted");

    Ok(upgrade
        .on_failed_upgrade(move |error| {
            warn!(conn_id = %id, %error, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| run_ws_session(socket, id, identity, peer_addr, hub)))
}
