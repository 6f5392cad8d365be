//! Server error types and their event codes.

use std::io;

use crate::template::TemplateError;
use crate::transaction::ServerErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Port {0} is invalid")]
    InvalidPort(u32),
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        code: ServerErrorCode,
        #[source]
        source: io::Error,
    },
    #[error("Hostname '{0}' could not be resolved")]
    HostnameUnknown(String),
    #[error("Certificate file not found: {0}")]
    CertFileNotFound(String),
    #[error("TLS configuration error: {0}")]
    Tls(String),
    #[error("Proxy error: {0}")]
    Proxy(String),
    #[error("Error while serving the content: {0}")]
    FileServing(String),
    #[error("Route {route} could not be created: {message}")]
    RouteCreation { route: String, message: String },
    #[error("Header '{header}' could not be parsed: {source}")]
    HeaderParsing {
        header: String,
        #[source]
        source: TemplateError,
    },
    #[error("Route serving error: {0}")]
    RouteServing(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Event code reported for this error.
    pub fn code(&self) -> ServerErrorCode {
        match self {
            ServerError::InvalidPort(_) => ServerErrorCode::PortInvalid,
            ServerError::Bind { code, .. } => *code,
            ServerError::HostnameUnknown(_) => ServerErrorCode::HostnameUnknown,
            ServerError::CertFileNotFound(_) => ServerErrorCode::CertFileNotFound,
            ServerError::Tls(_) | ServerError::Io(_) => ServerErrorCode::UnknownServerError,
            ServerError::Proxy(_) => ServerErrorCode::ProxyError,
            ServerError::FileServing(_) => ServerErrorCode::RouteFileServingError,
            ServerError::RouteCreation { .. } => ServerErrorCode::RouteCreationError,
            ServerError::HeaderParsing { .. } => ServerErrorCode::HeaderParsingError,
            ServerError::RouteServing(_) => ServerErrorCode::RouteServingError,
        }
    }

    /// Wrap a bind failure with the code matching its OS error kind.
    pub fn bind(address: impl Into<String>, source: io::Error) -> Self {
        ServerError::Bind {
            address: address.into(),
            code: bind_error_code(&source),
            source,
        }
    }
}

/// Map a listener bind error to its startup code.
pub fn bind_error_code(error: &io::Error) -> ServerErrorCode {
    match error.kind() {
        io::ErrorKind::PermissionDenied => ServerErrorCode::PortInvalid,
        io::ErrorKind::AddrInUse => ServerErrorCode::PortAlreadyUsed,
        io::ErrorKind::AddrNotAvailable => ServerErrorCode::HostnameUnavailable,
        _ => ServerErrorCode::UnknownServerError,
    }
}
