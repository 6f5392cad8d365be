//! Proxy forwarding for unmatched or always-proxied traffic.
//!
//! - `client` - pooled HTTP(S) client
//! - `forwarding` - request forwarding and upstream URI rewriting
//! - `headers` - hop-by-hop filtering and header overrides
//! - `tls` - rustls configs for the listener and the client

mod client;
mod forwarding;
pub mod headers;
pub mod tls;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{forward_request, proxy_error_body, upstream_uri, UpstreamResponse};
