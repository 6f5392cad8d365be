//! Transaction records, the bounded transaction log and server events.

pub mod events;
pub mod log;

use hyper::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;

pub use events::{EventEmitter, ServerErrorCode, ServerEvent, ServerEventKind};
pub use log::TransactionLog;

use crate::environment::Header;
use crate::request::{header_list, RequestData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub method: String,
    pub url_path: String,
    /// Endpoint of the matched route, empty when unmatched
    pub route: String,
    pub params: Vec<Param>,
    /// Raw query string
    pub query: String,
    pub query_params: Value,
    pub headers: Vec<Header>,
    pub body: String,
}

impl TransactionRequest {
    pub fn from_request(request: &RequestData, route: Option<&str>) -> Self {
        let mut params: Vec<Param> = request
            .path_params
            .iter()
            .map(|(name, value)| Param {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        params.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            method: request.method.clone(),
            url_path: request.path.clone(),
            route: route.unwrap_or_default().to_string(),
            params,
            query: request.query_string.clone().unwrap_or_default(),
            query_params: request.query.clone(),
            headers: request.header_list(),
            body: request.body_str().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub status_code: u16,
    pub status_message: String,
    pub headers: Vec<Header>,
    pub body: String,
}

impl TransactionResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        Self {
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers: header_list(headers),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

/// A served request and the response it received.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub request: TransactionRequest,
    pub response: TransactionResponse,
    pub route_uuid: Option<String>,
    pub route_response_uuid: Option<String>,
    pub proxied: bool,
    pub timestamp_ms: i64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use bytes::Bytes;

    pub(crate) fn transaction(path: &str) -> Transaction {
        let request = RequestData::new("GET", path, None, HeaderMap::new(), Bytes::new(), None);
        Transaction {
            request: TransactionRequest::from_request(&request, None),
            response: TransactionResponse::new(StatusCode::OK, &HeaderMap::new(), b"ok"),
            route_uuid: None,
            route_response_uuid: None,
            proxied: false,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_transaction_serializes_camel_case() {
        let mut request = RequestData::new(
            "POST",
            "/users/1",
            Some("a=1"),
            HeaderMap::new(),
            Bytes::from_static(b"{}"),
            None,
        );
        request.path_params.insert("id".to_string(), "1".to_string());
        let transaction = Transaction {
            request: TransactionRequest::from_request(&request, Some("users/:id")),
            response: TransactionResponse::new(StatusCode::CREATED, &HeaderMap::new(), b"done"),
            route_uuid: Some("r1".to_string()),
            route_response_uuid: Some("resp1".to_string()),
            proxied: false,
            timestamp_ms: 1,
        };
        let json = serde_json::to_value(&transaction).unwrap();
        assert_json_include!(
            actual: json,
            expected: serde_json::json!({
                "request": {
                    "method": "POST",
                    "urlPath": "/users/1",
                    "route": "users/:id",
                    "params": [{"name": "id", "value": "1"}],
                    "query": "a=1",
                    "queryParams": {"a": "1"},
                    "body": "{}"
                },
                "response": {"statusCode": 201, "statusMessage": "Created", "body": "done"},
                "routeUuid": "r1",
                "routeResponseUuid": "resp1",
                "proxied": false
            })
        );
    }
}
