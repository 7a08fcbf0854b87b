//! Error types for admission, peer I/O, the hub and server startup.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::hub::ConnectionId;

/// Why a `/ws` request was refused before a connection existed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// No `API-KEY` header on the handshake.
    #[error("missing API-KEY header")]
    MissingCredential,
    /// `API-KEY` header present but does not match the shared secret.
    #[error("invalid API-KEY")]
    InvalidCredential,
    /// The configured connection limit is reached.
    #[error("connection limit reached")]
    CapacityExhausted,
    /// The server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
    /// The request is not a valid WebSocket upgrade.
    #[error("websocket upgrade rejected: {0}")]
    Upgrade(String),
}

impl AdmissionError {
    /// HTTP status answered for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::CapacityExhausted | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upgrade(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label used as the `reason` metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::ShuttingDown => "shutting_down",
            Self::Upgrade(_) => "upgrade",
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Failure reading from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerReadError {
    /// The transport reported an error.
    #[error("read failed: {0}")]
    Transport(String),
}

/// Failure writing to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerWriteError {
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
    /// The write did not complete in time.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    /// The transport reported an error.
    #[error("write failed: {0}")]
    Transport(String),
    /// The sink panicked during the write.
    #[error("write panicked")]
    Panicked,
}

/// Registry membership errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id is already present.
    #[error("{0} is already registered")]
    AlreadyRegistered(ConnectionId),
}

/// Hub-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub no longer accepts messages or connections.
    #[error("hub is shutting down")]
    ShuttingDown,
    /// `spawn_dispatcher` was already called on this hub.
    #[error("dispatcher already running")]
    DispatcherAlreadyRunning,
    /// Registration was refused by the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Fatal errors while starting the server.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Could not bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Bound, but the local address could not be read back.
    #[error("failed to read local address: {0}")]
    LocalAddr(std::io::Error),
    /// The hub dispatcher could not be started.
    #[error(transparent)]
    Hub(#[from] HubError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_are_unauthorized() {
        assert_eq!(
            AdmissionError::MissingCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AdmissionError::InvalidCredential.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn capacity_and_shutdown_are_unavailable() {
        assert_eq!(
            AdmissionError::CapacityExhausted.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AdmissionError::ShuttingDown.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn upgrade_is_bad_request() {
        let err = AdmissionError::Upgrade("missing upgrade header".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("missing upgrade header"));
    }

    #[test]
    fn admission_into_response_status() {
        let resp = AdmissionError::InvalidCredential.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn labels_are_snake_case() {
        for err in [
            AdmissionError::MissingCredential,
            AdmissionError::InvalidCredential,
            AdmissionError::CapacityExhausted,
            AdmissionError::ShuttingDown,
            AdmissionError::Upgrade(String::new()),
        ] {
            assert!(err.label().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn write_timeout_display() {
        let err = PeerWriteError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "write timed out after 5s");
    }

    #[test]
    fn registry_error_display_uses_connection_id() {
        let err = RegistryError::AlreadyRegistered(ConnectionId::new(7));
        assert_eq!(err.to_string(), "conn-7 is already registered");
    }

    #[test]
    fn hub_error_wraps_registry_error() {
        let err: HubError = RegistryError::AlreadyRegistered(ConnectionId::new(1)).into();
        assert!(matches!(err, HubError::Registry(_)));
        assert_eq!(err.to_string(), "conn-1 is already registered");
    }

    #[test]
    fn bind_error_display() {
        let err = StartupError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("0.0.0.0:80"));
    }
}
