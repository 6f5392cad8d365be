//! State and global variable handlers.

use bytes::Bytes;
use hyper::{Response, StatusCode};
use tracing::{debug, info};

use crate::admin_api::types::*;
use crate::server::response::ResponseBody;
use crate::server::state::ServerState;
use crate::template::value_to_string;

/// PURGE /state - Reset buckets, global variables, request counters and logs
pub fn handle_purge_state(state: &ServerState) -> Response<ResponseBody> {
    state.purge();
    info!(environment = %state.environment_uuid(), "Server state purged");
    info_response("Server has been reset to its initial state")
}

/// POST /global-vars - Set a global variable from `{"key", "value"}`
pub fn handle_set_global_var(state: &ServerState, body: &Bytes) -> Response<ResponseBody> {
    let request: SetGlobalVarRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Invalid global variable request: {}", e);
            return message(StatusCode::BAD_REQUEST, "Invalid request");
        }
    };

    let (Some(key), Some(value)) = (request.key, request.value) else {
        return message(StatusCode::BAD_REQUEST, "Invalid request");
    };

    let key = value_to_string(&key);
    let display = value_to_string(&value);
    state.global_vars.set(&key, value);

    message(
        StatusCode::OK,
        format!("Global variable '{key}' has been set to '{display}'"),
    )
}

/// PURGE /global-vars - Clear every global variable
pub fn handle_purge_global_vars(state: &ServerState) -> Response<ResponseBody> {
    state.global_vars.purge();
    message(StatusCode::OK, "Global variables have been purged")
}
