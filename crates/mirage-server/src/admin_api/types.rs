//! Request and response bodies of the admin API.

use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::parse_query_string;
use crate::server::response::{apply_cors, json_response, ResponseBody};

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;

/// `{"response": ...}` body used by the welcome and state endpoints.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub response: String,
}

/// `{"message": ...}` body used by every other endpoint.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of a global variable update. Both fields are required.
#[derive(Debug, Deserialize)]
pub struct SetGlobalVarRequest {
    pub key: Option<Value>,
    pub value: Option<Value>,
}

/// `page` and `limit` query parameters of the logs endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogsQuery {
    pub page: usize,
    pub limit: usize,
}

impl LogsQuery {
    /// Parse query parameters; missing or invalid values use the defaults.
    pub fn parse(query: Option<&str>) -> Self {
        let params = parse_query_string(query);
        let number = |key: &str| params.get(key)?.as_str()?.parse::<usize>().ok();
        Self {
            page: number("page").map_or(DEFAULT_PAGE, |page| page.max(1)),
            limit: number("limit").unwrap_or(DEFAULT_LIMIT),
        }
    }
}

/// JSON response with the admin CORS headers.
pub fn admin_json<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let mut response = json_response(status, body);
    apply_cors(response.headers_mut());
    response
}

pub fn message(status: StatusCode, message: impl Into<String>) -> Response<ResponseBody> {
    admin_json(
        status,
        &MessageResponse {
            message: message.into(),
        },
    )
}

pub fn info_response(message: impl Into<String>) -> Response<ResponseBody> {
    admin_json(
        StatusCode::OK,
        &InfoResponse {
            response: message.into(),
        },
    )
}

pub fn not_found() -> Response<ResponseBody> {
    message(StatusCode::NOT_FOUND, "Not found")
}
