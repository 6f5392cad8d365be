//! Admin control API served under `/mockoon-admin` on the environment's own
//! listener.
//!
//! - `GET /` welcome message
//! - `PURGE /state`, `POST /state/purge` reset buckets, variables, counters and logs
//! - `POST|PUT|PATCH /global-vars` set a global variable
//! - `PURGE /global-vars`, `POST /global-vars/purge` clear global variables
//! - `GET /logs?page&limit` page through the transaction log
//! - `PURGE /logs`, `POST /logs/purge` clear the transaction log
//!
//! Admin requests skip latency, are never logged as transactions and always
//! carry permissive CORS headers.

mod handlers;
mod router;
mod types;

pub use router::route_request;

pub const ADMIN_PREFIX: &str = "/mockoon-admin";

/// Path relative to the admin prefix, or `None` for non-admin paths.
pub fn admin_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(ADMIN_PREFIX)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
