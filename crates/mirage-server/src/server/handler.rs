//! Request pipeline of a mock server.
//!
//! Admin requests are answered directly. Every other request is matched
//! against the current environment snapshot and then served from a route
//! response, forwarded to the proxy host, or answered with a 404. The result
//! is delayed by the configured latency, recorded in the transaction log and
//! announced with a `TransactionComplete` event.

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ServerError;
use super::response::{
    apply_cors, is_templatable, status_from_u16, MockResponse, ResponseBody, APPLICATION_JSON,
    TEXT_EVENT_STREAM, TEXT_PLAIN,
};
use super::state::ServerState;
use crate::admin_api::{self, admin_path};
use crate::data::{crud, execute_crud, CrudError, CrudOperation};
use crate::environment::{
    BodySource, Environment, Header, ProxyMode, Route, RouteResponse, RouteType,
};
use crate::metrics::{self, Outcome};
use crate::proxy::headers::{append_header_str, set_header_str};
use crate::proxy::{forward_request, proxy_error_body, upstream_uri};
use crate::request::RequestData;
use crate::routing::{collapse_slashes, RouteMatch};
use crate::selector::{extract_targets, select_response};
use crate::streaming::Subscription;
use crate::template::{has_expressions, RenderContext};
use crate::transaction::{ServerEventKind, Transaction, TransactionRequest};

/// Value served for a header whose template failed to render.
pub const HEADER_PARSING_ERROR: &str = "-- Header parsing error --";

const X_TOTAL_COUNT: &str = "x-total-count";

/// Everything the pipeline produced for one request.
struct Served {
    response: MockResponse,
    stream: Option<Subscription>,
    route_uuid: Option<String>,
    route_endpoint: Option<String>,
    route_response_uuid: Option<String>,
    /// Response latency, added to the environment latency
    latency: u64,
    proxied: bool,
    outcome: Outcome,
}

impl Served {
    fn plain(response: MockResponse, outcome: Outcome) -> Self {
        Self {
            response,
            stream: None,
            route_uuid: None,
            route_endpoint: None,
            route_response_uuid: None,
            latency: 0,
            proxied: false,
            outcome,
        }
    }
}

/// Handle one request on a mock server connection.
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
    remote_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            Bytes::new()
        }
    };
    let path = collapse_slashes(parts.uri.path());

    if state.options.enable_admin_api {
        if let Some(admin) = admin_path(&path) {
            return Ok(admin_api::route_request(
                &parts.method,
                admin,
                parts.uri.query(),
                &body,
                &state,
            ));
        }
    }

    let snapshot = state.refresh();
    let environment = &snapshot.environment;
    state.events.emit(ServerEventKind::EnteringRequest);

    let mut request = RequestData::new(
        parts.method.as_str(),
        &path,
        parts.uri.query(),
        parts.headers,
        body,
        Some(remote_addr),
    );

    let proxy = &environment.proxy;
    let mut served = if proxy.mode == ProxyMode::Always && proxy.is_enabled() {
        proxy_request(&state, environment, &parts.method, &request).await
    } else if let Some(route_match) = snapshot.matcher.find(&request.method, &path) {
        request.path_params = route_match.params.clone();
        serve_route(&state, environment, &route_match, &request).await
    } else if proxy.mode == ProxyMode::Fallback && proxy.is_enabled() {
        proxy_request(&state, environment, &parts.method, &request).await
    } else if environment.cors && parts.method == Method::OPTIONS {
        preflight(&state, environment, &request)
    } else {
        not_found(&state, environment, &request)
    };

    if environment.cors {
        apply_cors(&mut served.response.headers);
    }

    let delay = environment.latency.saturating_add(served.latency);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let transaction = Transaction {
        request: TransactionRequest::from_request(&request, served.route_endpoint.as_deref()),
        response: served.response.transaction_response(),
        route_uuid: served.route_uuid.take(),
        route_response_uuid: served.route_response_uuid.take(),
        proxied: served.proxied,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    };
    debug!(
        environment = %environment.uuid,
        method = %request.method,
        path = %request.path,
        status = transaction.response.status_code,
        "Request served"
    );
    state.transactions.push(transaction.clone());
    state
        .events
        .emit(ServerEventKind::TransactionComplete(Box::new(transaction)));
    metrics::record_request(
        &environment.uuid,
        served.outcome,
        started.elapsed().as_secs_f64() * 1000.0,
    );

    let response = match served.stream {
        Some(subscription) => {
            let mut response = Response::new(subscription.into_sse_body());
            *response.status_mut() = served.response.status;
            *response.headers_mut() = served.response.headers;
            response
        }
        None => served.response.into_response(),
    };
    Ok(response)
}

/// Serve a matched route from the response its rules select.
async fn serve_route(
    state: &ServerState,
    environment: &Environment,
    route_match: &RouteMatch,
    request: &RequestData,
) -> Served {
    let Some(route) = environment.routes.get(route_match.route_index) else {
        return not_found(state, environment, request);
    };

    let request_number = state.next_request_number(&route.uuid);
    let targets = extract_targets(request, request_number);
    let selected = {
        let mut rng = rand::thread_rng();
        select_response(route, request, &targets, &state.global_vars, &mut rng)
    };
    let Some(response) = selected else {
        return not_found(state, environment, request);
    };

    debug!(
        environment = %environment.uuid,
        route = %route.uuid,
        response = %response.display_name(),
        "Route matched"
    );

    let ctx = RenderContext::for_request(request)
        .with_data(&state.data)
        .with_global_vars(&state.global_vars);

    trigger_callbacks(state, environment, response, &ctx);

    let mut headers = HeaderMap::new();
    apply_headers(&mut headers, &render_headers(state, &environment.headers, &ctx));
    apply_headers(&mut headers, &render_headers(state, &response.headers, &ctx));

    let mut stream = None;
    let (status, body) = match route.route_type {
        RouteType::Ws => {
            stream = Some(state.channels.get_or_create(&route.uuid).subscribe());
            headers.insert(CONTENT_TYPE, TEXT_EVENT_STREAM.clone());
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            (StatusCode::OK, Bytes::new())
        }
        RouteType::Crud => serve_crud(
            state,
            route,
            response,
            route_match.crud_id.as_deref(),
            request,
            &mut headers,
        ),
        RouteType::Http => match response.body_source() {
            BodySource::Inline(template) => {
                serve_inline(state, response, template, &ctx, &mut headers)
            }
            BodySource::DataBucket(key) => serve_bucket(state, response, key, &mut headers),
            BodySource::File(file_path) => {
                serve_file(state, response, file_path, &ctx, &mut headers).await
            }
        },
    };

    let outcome = if status.is_server_error() {
        Outcome::Error
    } else {
        Outcome::Served
    };
    Served {
        response: MockResponse::new(status, headers, body),
        stream,
        route_uuid: Some(route.uuid.clone()),
        route_endpoint: Some(route.endpoint.clone()),
        route_response_uuid: Some(response.uuid.clone()),
        latency: response.latency,
        proxied: false,
        outcome,
    }
}

fn serve_inline(
    state: &ServerState,
    response: &RouteResponse,
    template: &str,
    ctx: &RenderContext<'_>,
    headers: &mut HeaderMap,
) -> (StatusCode, Bytes) {
    let rendered = if response.disable_templating {
        Ok(template.to_string())
    } else {
        state.engine.render(template, ctx)
    };

    match rendered {
        Ok(body) => {
            default_content_type(headers, &body);
            (status_from_u16(response.status_code), Bytes::from(body))
        }
        Err(e) => {
            metrics::record_template_error(&state.environment_uuid(), "body");
            let message = e.to_string();
            state.events.error(ServerError::RouteServing(message.clone()));
            headers.insert(CONTENT_TYPE, TEXT_PLAIN.clone());
            (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(message))
        }
    }
}

fn serve_bucket(
    state: &ServerState,
    response: &RouteResponse,
    key: &str,
    headers: &mut HeaderMap,
) -> (StatusCode, Bytes) {
    let body = match state.data.get_value(key) {
        Some(Value::String(text)) => text,
        Some(value) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
            }
            value.to_string()
        }
        None => {
            warn!("Data bucket '{}' referenced by response {} not found", key, response.uuid);
            String::new()
        }
    };
    (status_from_u16(response.status_code), Bytes::from(body))
}

async fn serve_file(
    state: &ServerState,
    response: &RouteResponse,
    file_path: &str,
    ctx: &RenderContext<'_>,
    headers: &mut HeaderMap,
) -> (StatusCode, Bytes) {
    let file_path = if response.disable_templating {
        file_path.to_string()
    } else {
        state
            .engine
            .render(file_path, ctx)
            .unwrap_or_else(|_| file_path.to_string())
    };
    let resolved = state.options.environment_directory.join(Path::new(&file_path));

    let contents = match tokio::fs::read(&resolved).await {
        Ok(contents) => contents,
        Err(e) => {
            let error = ServerError::FileServing(format!("{}: {e}", resolved.display()));
            let message = error.to_string();
            state.events.error(error);
            headers.insert(CONTENT_TYPE, TEXT_PLAIN.clone());
            return (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(message));
        }
    };

    let guessed = super::response::content_type_for_path(&resolved);
    if !headers.contains_key(CONTENT_TYPE) {
        if let Some(content_type) = guessed {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    let templatable = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_templatable);
    if response.disable_templating || !templatable {
        return (status_from_u16(response.status_code), Bytes::from(contents));
    }

    let text = String::from_utf8_lossy(&contents);
    match state.engine.render(&text, ctx) {
        Ok(body) => (status_from_u16(response.status_code), Bytes::from(body)),
        Err(e) => {
            metrics::record_template_error(&state.environment_uuid(), "file");
            let error = ServerError::FileServing(e.to_string());
            let message = error.to_string();
            state.events.error(error);
            headers.insert(CONTENT_TYPE, TEXT_PLAIN.clone());
            (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(message))
        }
    }
}

fn serve_crud(
    state: &ServerState,
    route: &Route,
    response: &RouteResponse,
    crud_id: Option<&str>,
    request: &RequestData,
    headers: &mut HeaderMap,
) -> (StatusCode, Bytes) {
    let bucket_key = route
        .databucket_id
        .as_deref()
        .or(response.databucket_id.as_deref())
        .unwrap_or_default();
    let payload: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);

    let result = CrudOperation::from_request(&request.method, crud_id.is_some()).and_then(|op| {
        state
            .data
            .update(bucket_key, |bucket| {
                execute_crud(op, crud_id, payload, &request.query, &response.crud_key, bucket)
            })
            .unwrap_or_else(|| Err(CrudError::BucketNotFound(bucket_key.to_string())))
    });

    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
    }

    match result {
        Ok(result) => {
            if let Some(total) = result.total_count {
                set_header_str(headers, X_TOTAL_COUNT, &total.to_string());
            }
            let body = if result.body.is_null() {
                Bytes::new()
            } else {
                Bytes::from(result.body.to_string())
            };
            (status_from_u16(result.status), body)
        }
        Err(CrudError::NotFound(id)) => {
            debug!("CRUD item '{}' not found on route {}", id, route.uuid);
            (
                StatusCode::NOT_FOUND,
                Bytes::from(crud::not_found_body().to_string()),
            )
        }
        Err(e @ CrudError::UnsupportedMethod(_)) => {
            (StatusCode::METHOD_NOT_ALLOWED, Bytes::from(e.to_string()))
        }
        Err(e @ CrudError::BucketNotFound(_)) => {
            let message = e.to_string();
            state.events.error(ServerError::RouteServing(message.clone()));
            (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(message))
        }
    }
}

/// Forward the request to the proxy host.
async fn proxy_request(
    state: &ServerState,
    environment: &Environment,
    method: &Method,
    request: &RequestData,
) -> Served {
    state.events.emit(ServerEventKind::CreatingProxy);
    let proxy = &environment.proxy;

    let ctx = RenderContext::for_request(request)
        .with_data(&state.data)
        .with_global_vars(&state.global_vars);
    let request_headers = render_headers(state, &proxy.req_headers, &ctx);
    let response_headers = render_headers(state, &proxy.res_headers, &ctx);

    let result = match upstream_uri(
        &proxy.host,
        &request.path,
        request.query_string.as_deref(),
        &environment.endpoint_prefix,
        proxy.remove_prefix,
    ) {
        Ok(uri) => {
            forward_request(
                &state.http_client,
                method.clone(),
                uri,
                &request.headers,
                request.body.clone(),
                &request_headers,
                &response_headers,
            )
            .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(upstream) => {
            metrics::record_proxied(&environment.uuid, upstream.status.as_u16());
            let mut served = Served::plain(
                MockResponse::new(upstream.status, upstream.headers, upstream.body),
                Outcome::Proxied,
            );
            served.proxied = true;
            served
        }
        Err(e) => {
            let body = proxy_error_body(&e);
            state.events.error(e);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
            let mut served = Served::plain(
                MockResponse::new(StatusCode::BAD_GATEWAY, headers, body),
                Outcome::Error,
            );
            served.proxied = true;
            served
        }
    }
}

/// Answer an unmatched `OPTIONS` request when CORS is enabled.
fn preflight(state: &ServerState, environment: &Environment, request: &RequestData) -> Served {
    let ctx = RenderContext::for_request(request)
        .with_data(&state.data)
        .with_global_vars(&state.global_vars);
    let mut headers = HeaderMap::new();
    apply_headers(&mut headers, &render_headers(state, &environment.headers, &ctx));
    apply_cors(&mut headers);
    Served::plain(
        MockResponse::new(StatusCode::OK, headers, Bytes::new()),
        Outcome::Served,
    )
}

fn not_found(state: &ServerState, environment: &Environment, request: &RequestData) -> Served {
    let ctx = RenderContext::for_request(request)
        .with_data(&state.data)
        .with_global_vars(&state.global_vars);
    let mut headers = HeaderMap::new();
    apply_headers(&mut headers, &render_headers(state, &environment.headers, &ctx));
    headers.insert(CONTENT_TYPE, TEXT_PLAIN.clone());
    let body = format!("Cannot {} {}", request.method, request.path);
    Served::plain(
        MockResponse::new(StatusCode::NOT_FOUND, headers, body),
        Outcome::NotFound,
    )
}

/// Render header values. A value that fails to render is replaced by
/// [`HEADER_PARSING_ERROR`] and reported.
fn render_headers(
    state: &ServerState,
    headers: &[Header],
    ctx: &RenderContext<'_>,
) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|header| !header.key.trim().is_empty())
        .map(|header| {
            if !has_expressions(&header.value) {
                return (header.key.clone(), header.value.clone());
            }
            match state.engine.render(&header.value, ctx) {
                Ok(value) => (header.key.clone(), value),
                Err(source) => {
                    metrics::record_template_error(&state.environment_uuid(), "header");
                    state.events.error(ServerError::HeaderParsing {
                        header: header.key.clone(),
                        source,
                    });
                    (header.key.clone(), HEADER_PARSING_ERROR.to_string())
                }
            }
        })
        .collect()
}

/// Apply rendered headers. The first value of a name replaces what is already
/// set; later values of the same name are appended.
fn apply_headers(target: &mut HeaderMap, headers: &[(String, String)]) {
    let mut seen = HashSet::new();
    for (name, value) in headers {
        let applied = if seen.insert(name.to_ascii_lowercase()) {
            set_header_str(target, name, value)
        } else {
            append_header_str(target, name, value)
        };
        if !applied {
            debug!("Skipping invalid header '{}'", name);
        }
    }
}

fn default_content_type(headers: &mut HeaderMap, body: &str) {
    if headers.contains_key(CONTENT_TYPE) || body.is_empty() {
        return;
    }
    let content_type = if serde_json::from_str::<Value>(body).is_ok() {
        APPLICATION_JSON.clone()
    } else {
        TEXT_PLAIN.clone()
    };
    headers.insert(CONTENT_TYPE, content_type);
}

/// Render and schedule the callbacks referenced by a served response.
fn trigger_callbacks(
    state: &ServerState,
    environment: &Environment,
    response: &RouteResponse,
    ctx: &RenderContext<'_>,
) {
    for invocation in &response.callbacks {
        let Some(callback) = environment
            .callbacks
            .iter()
            .find(|c| c.uuid == invocation.uuid)
        else {
            warn!(
                "Callback {} referenced by response {} does not exist",
                invocation.uuid, response.uuid
            );
            continue;
        };

        let body = match state.engine.render(&callback.body, ctx) {
            Ok(body) => body,
            Err(e) => {
                state.events.error(ServerError::RouteServing(format!(
                    "callback '{}' could not be rendered: {e}",
                    callback.name
                )));
                continue;
            }
        };

        let channel = state.channels.get_or_create(&callback.route_uuid);
        let replayable = callback.replayable;
        if invocation.latency == 0 {
            channel.send(body, replayable);
        } else {
            let delay = Duration::from_millis(invocation.latency);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                channel.send(body, replayable);
            });
        }
    }
}
