//! Server lifecycle events.
//!
//! Each server owns a broadcast channel; hosts call `subscribe()` to observe
//! it. Sending never blocks and events are dropped when nobody listens.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::Transaction;
use crate::server::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerErrorCode {
    PortAlreadyUsed,
    PortInvalid,
    HostnameUnknown,
    HostnameUnavailable,
    UnknownServerError,
    CertFileNotFound,
    ProxyError,
    RouteServingError,
    RouteFileServingError,
    HeaderParsingError,
    RouteCreationError,
}

impl ServerErrorCode {
    /// Startup errors; the server is not listening after one of these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerErrorCode::PortAlreadyUsed
                | ServerErrorCode::PortInvalid
                | ServerErrorCode::HostnameUnknown
                | ServerErrorCode::HostnameUnavailable
                | ServerErrorCode::UnknownServerError
                | ServerErrorCode::CertFileNotFound
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerErrorCode::PortAlreadyUsed => "PORT_ALREADY_USED",
            ServerErrorCode::PortInvalid => "PORT_INVALID",
            ServerErrorCode::HostnameUnknown => "HOSTNAME_UNKNOWN",
            ServerErrorCode::HostnameUnavailable => "HOSTNAME_UNAVAILABLE",
            ServerErrorCode::UnknownServerError => "UNKNOWN_SERVER_ERROR",
            ServerErrorCode::CertFileNotFound => "CERT_FILE_NOT_FOUND",
            ServerErrorCode::ProxyError => "PROXY_ERROR",
            ServerErrorCode::RouteServingError => "ROUTE_SERVING_ERROR",
            ServerErrorCode::RouteFileServingError => "ROUTE_FILE_SERVING_ERROR",
            ServerErrorCode::HeaderParsingError => "HEADER_PARSING_ERROR",
            ServerErrorCode::RouteCreationError => "ROUTE_CREATION_ERROR",
        }
    }
}

impl fmt::Display for ServerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum ServerEventKind {
    Started { address: SocketAddr },
    Stopped,
    EnteringRequest,
    TransactionComplete(Box<Transaction>),
    CreatingProxy,
    Error {
        code: ServerErrorCode,
        error: Arc<ServerError>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub environment_uuid: String,
    pub kind: ServerEventKind,
}

/// Broadcasts events for one environment.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    environment_uuid: String,
    sender: broadcast::Sender<ServerEvent>,
}

impl EventEmitter {
    pub fn new(environment_uuid: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            environment_uuid: environment_uuid.into(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, kind: ServerEventKind) {
        let event = ServerEvent {
            environment_uuid: self.environment_uuid.clone(),
            kind,
        };
        if self.sender.send(event).is_err() {
            debug!("No event subscribers for environment {}", self.environment_uuid);
        }
    }

    /// Log and broadcast an error event.
    pub fn error(&self, error: ServerError) {
        let code = error.code();
        if code.is_fatal() {
            error!("[{}] {}: {}", self.environment_uuid, code, error);
        } else {
            warn!("[{}] {}: {}", self.environment_uuid, code, error);
        }
        self.emit(ServerEventKind::Error {
            code,
            error: Arc::new(error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_wire_names() {
        assert_eq!(
            serde_json::to_string(&ServerErrorCode::UnknownServerError).unwrap(),
            "\"UNKNOWN_SERVER_ERROR\""
        );
        assert_eq!(ServerErrorCode::RouteFileServingError.to_string(), "ROUTE_FILE_SERVING_ERROR");
    }

    #[test]
    fn test_fatal_codes() {
        assert!(ServerErrorCode::PortAlreadyUsed.is_fatal());
        assert!(ServerErrorCode::CertFileNotFound.is_fatal());
        assert!(!ServerErrorCode::ProxyError.is_fatal());
        assert!(!ServerErrorCode::RouteCreationError.is_fatal());
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let emitter = EventEmitter::new("env-1", 8);
        let mut rx = emitter.subscribe();
        emitter.emit(ServerEventKind::EnteringRequest);
        emitter.error(ServerError::Proxy("refused".into()));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.environment_uuid, "env-1");
        assert!(matches!(first.kind, ServerEventKind::EnteringRequest));

        match rx.recv().await.unwrap().kind {
            ServerEventKind::Error { code, .. } => assert_eq!(code, ServerErrorCode::ProxyError),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::new("env-1", 8);
        emitter.emit(ServerEventKind::Stopped);
    }
}
