//! Route dispatch for the admin API.

use bytes::Bytes;
use hyper::{Method, Response};
use tracing::debug;

use crate::admin_api::handlers::{state, system};
use crate::admin_api::types::not_found;
use crate::server::response::ResponseBody;
use crate::server::state::ServerState;

/// Parsed admin endpoint, relative to the admin prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminRoute {
    Root,
    State,
    StatePurge,
    GlobalVars,
    GlobalVarsPurge,
    Logs,
    LogsPurge,
}

impl AdminRoute {
    fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(AdminRoute::Root),
            ["state"] => Some(AdminRoute::State),
            ["state", "purge"] => Some(AdminRoute::StatePurge),
            ["global-vars"] => Some(AdminRoute::GlobalVars),
            ["global-vars", "purge"] => Some(AdminRoute::GlobalVarsPurge),
            ["logs"] => Some(AdminRoute::Logs),
            ["logs", "purge"] => Some(AdminRoute::LogsPurge),
            _ => None,
        }
    }
}

/// Dispatch an admin request. `path` is relative to the admin prefix.
pub fn route_request(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &Bytes,
    server: &ServerState,
) -> Response<ResponseBody> {
    debug!("Admin API: {} {}", method, path);

    let Some(route) = AdminRoute::parse(path) else {
        return not_found();
    };

    match (method.as_str(), route) {
        ("GET", AdminRoute::Root) => system::handle_root(),

        ("PURGE", AdminRoute::State) | ("POST", AdminRoute::StatePurge) => {
            state::handle_purge_state(server)
        }

        ("POST" | "PUT" | "PATCH", AdminRoute::GlobalVars) => {
            state::handle_set_global_var(server, body)
        }
        ("PURGE", AdminRoute::GlobalVars) | ("POST", AdminRoute::GlobalVarsPurge) => {
            state::handle_purge_global_vars(server)
        }

        ("GET", AdminRoute::Logs) => system::handle_logs(server, query),
        ("PURGE", AdminRoute::Logs) | ("POST", AdminRoute::LogsPurge) => {
            system::handle_purge_logs(server)
        }

        _ => not_found(),
    }
}
