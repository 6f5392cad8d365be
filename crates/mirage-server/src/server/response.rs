//! Response construction shared by the mock pipeline and the admin API.

use std::convert::Infallible;
use std::path::Path;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::transaction::TransactionResponse;

/// Body type of every response served by a mock server.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

pub static ACCESS_CONTROL_ALLOW_ORIGIN: HeaderName =
    HeaderName::from_static("access-control-allow-origin");
pub static ACCESS_CONTROL_ALLOW_METHODS: HeaderName =
    HeaderName::from_static("access-control-allow-methods");
pub static ACCESS_CONTROL_ALLOW_HEADERS: HeaderName =
    HeaderName::from_static("access-control-allow-headers");

static CORS_ORIGIN: HeaderValue = HeaderValue::from_static("*");
static CORS_METHODS: HeaderValue =
    HeaderValue::from_static("GET,POST,PUT,PATCH,DELETE,HEAD,OPTIONS");
static CORS_HEADERS: HeaderValue = HeaderValue::from_static(
    "Content-Type, Origin, Accept, Authorization, Content-Length, X-Requested-With",
);

pub static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");
pub static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
pub static TEXT_EVENT_STREAM: HeaderValue = HeaderValue::from_static("text/event-stream");

pub fn full_body(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into()).boxed_unsync()
}

/// Add permissive CORS headers, keeping any value already set.
pub fn apply_cors(headers: &mut HeaderMap) {
    for (name, value) in [
        (&ACCESS_CONTROL_ALLOW_ORIGIN, &CORS_ORIGIN),
        (&ACCESS_CONTROL_ALLOW_METHODS, &CORS_METHODS),
        (&ACCESS_CONTROL_ALLOW_HEADERS, &CORS_HEADERS),
    ] {
        if !headers.contains_key(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// A fully rendered response, kept in this form until it has been logged.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
        Self::new(status, headers, json)
    }

    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, TEXT_PLAIN.clone());
        Self::new(status, headers, body)
    }

    pub fn transaction_response(&self) -> TransactionResponse {
        TransactionResponse::new(self.status, &self.headers, &self.body)
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let mut response = Response::new(full_body(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Status code from a configured number; invalid codes become 500.
pub fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Build a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    MockResponse::json(status, body).into_response()
}

/// Content type guessed from a file extension.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match extension.as_str() {
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "application/javascript",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/x-yaml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => return None,
    };
    Some(content_type)
}

/// Content types whose file contents are rendered as templates.
pub fn is_templatable(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || matches!(
            mime.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-yaml"
                | "image/svg+xml"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_cors_keeps_existing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN.clone(),
            HeaderValue::from_static("https://example.com"),
        );
        apply_cors(&mut headers);
        assert_eq!(headers[&ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
        assert!(headers.contains_key(&ACCESS_CONTROL_ALLOW_METHODS));
        assert!(headers.contains_key(&ACCESS_CONTROL_ALLOW_HEADERS));
    }

    #[test]
    fn test_json_response() {
        let resp = json_response(StatusCode::OK, &json!({"test": "value"}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_status_from_u16() {
        assert_eq!(status_from_u16(201), StatusCode::CREATED);
        assert_eq!(status_from_u16(42), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path(Path::new("a/b.JSON")), Some("application/json"));
        assert_eq!(content_type_for_path(Path::new("logo.png")), Some("image/png"));
        assert_eq!(content_type_for_path(Path::new("noext")), None);
    }

    #[test]
    fn test_is_templatable() {
        assert!(is_templatable("application/json; charset=utf-8"));
        assert!(is_templatable("text/html"));
        assert!(!is_templatable("image/png"));
    }

    #[tokio::test]
    async fn test_mock_response_into_response() {
        let resp = MockResponse::text(StatusCode::ACCEPTED, "hello").into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }
}
