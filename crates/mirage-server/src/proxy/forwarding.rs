//! Request forwarding to the environment's proxy host.

use std::convert::Infallible;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HOST};
use hyper::{Method, Request, StatusCode, Uri};
use serde_json::json;
use tracing::debug;

use super::client::HttpClient;
use super::headers::{is_hop_by_hop, set_header_str, strip_secure_cookies};
use crate::server::error::ServerError;

/// Upstream response with its body collected.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Build the upstream URI for a request path.
///
/// With `remove_prefix`, a leading `/{endpoint_prefix}` is dropped from the
/// path before it is appended to `host`.
pub fn upstream_uri(
    host: &str,
    path: &str,
    query: Option<&str>,
    endpoint_prefix: &str,
    remove_prefix: bool,
) -> Result<Uri, ServerError> {
    let mut path = path;
    let prefix = endpoint_prefix.trim_matches('/');
    if remove_prefix && !prefix.is_empty() {
        if let Some(rest) = path.strip_prefix('/').and_then(|p| p.strip_prefix(prefix)) {
            if rest.is_empty() || rest.starts_with('/') {
                path = rest;
            }
        }
    }

    let mut target = host.trim_end_matches('/').to_string();
    if !path.starts_with('/') {
        target.push('/');
    }
    target.push_str(path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }

    target
        .parse::<Uri>()
        .map_err(|e| ServerError::Proxy(format!("invalid upstream URI '{target}': {e}")))
}

/// Forward a request with a pre-collected body.
///
/// `request_overrides` are already rendered `reqHeaders`, `response_overrides`
/// the rendered `resHeaders`. Hop-by-hop headers and `Host` are not copied.
pub async fn forward_request(
    http_client: &HttpClient,
    method: Method,
    uri: Uri,
    headers: &HeaderMap,
    body: Bytes,
    request_overrides: &[(String, String)],
    response_overrides: &[(String, String)],
) -> Result<UpstreamResponse, ServerError> {
    debug!("Forwarding to: {}", uri);

    let mut outbound = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name != HOST && !is_hop_by_hop(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
    for (name, value) in request_overrides {
        if !set_header_str(&mut outbound, name, value) {
            debug!("Skipping invalid proxy request header '{}'", name);
        }
    }

    let mut upstream_req = Request::builder()
        .method(method)
        .uri(uri)
        .body(BoxBody::new(
            Full::new(body).map_err(|never: Infallible| match never {}),
        ))
        .map_err(|e| ServerError::Proxy(e.to_string()))?;
    *upstream_req.headers_mut() = outbound;

    let upstream_response = http_client
        .request(upstream_req)
        .await
        .map_err(|e| ServerError::Proxy(e.to_string()))?;

    let (parts, body) = upstream_response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| ServerError::Proxy(format!("failed to read upstream response: {e}")))?
        .to_bytes();

    let mut headers = parts.headers;
    for name in &super::headers::HOP_BY_HOP {
        headers.remove(name);
    }
    for (name, value) in response_overrides {
        if !set_header_str(&mut headers, name, value) {
            debug!("Skipping invalid proxy response header '{}'", name);
        }
    }
    strip_secure_cookies(&mut headers);

    Ok(UpstreamResponse {
        status: parts.status,
        headers,
        body,
    })
}

/// JSON body served with a 502 when the upstream cannot be reached.
pub fn proxy_error_body(error: &ServerError) -> Bytes {
    Bytes::from(
        json!({
            "error": "Bad Gateway",
            "message": error.to_string(),
        })
        .to_string(),
    )
}
