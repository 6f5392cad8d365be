//! Welcome and transaction log handlers.

use hyper::{Response, StatusCode};
use tracing::info;

use crate::admin_api::types::*;
use crate::server::response::ResponseBody;
use crate::server::state::ServerState;

const WELCOME: &str = "Welcome to Mockoon's admin API. Check the documentation at https://mockoon.com/docs/latest/admin-api/overview/ for more information.";

/// GET / - Welcome message
pub fn handle_root() -> Response<ResponseBody> {
    info_response(WELCOME)
}

/// GET /logs - One page of the transaction log, oldest first
pub fn handle_logs(state: &ServerState, query: Option<&str>) -> Response<ResponseBody> {
    let params = LogsQuery::parse(query);
    let page = state.transactions.page(params.page, params.limit);
    admin_json(StatusCode::OK, &page)
}

/// PURGE /logs - Clear the transaction log
pub fn handle_purge_logs(state: &ServerState) -> Response<ResponseBody> {
    state.transactions.clear();
    info!(environment = %state.environment_uuid(), "Transaction logs purged");
    message(StatusCode::OK, "Logs have been purged")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, ServerOptions};
    use crate::transaction::tests::transaction;
    use http_body_util::BodyExt;
    use serde_json::Value;

    fn state() -> ServerState {
        ServerState::new(
            Environment {
                uuid: "env".to_string(),
                ..Environment::default()
            },
            ServerOptions::default(),
        )
    }

    async fn body_json(resp: Response<ResponseBody>) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_handle_root() {
        let body = body_json(handle_root()).await;
        assert!(body["response"]
            .as_str()
            .unwrap()
            .starts_with("Welcome to Mockoon's admin API."));
    }

    #[tokio::test]
    async fn test_handle_logs_pages() {
        let state = state();
        for i in 0..12 {
            state.transactions.push(transaction(&format!("/r{i}")));
        }
        let body = body_json(handle_logs(&state, Some("page=2&limit=5"))).await;
        let paths: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["request"]["urlPath"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["/r5", "/r6", "/r7", "/r8", "/r9"]);
    }

    #[tokio::test]
    async fn test_handle_logs_default_limit() {
        let state = state();
        for i in 0..12 {
            state.transactions.push(transaction(&format!("/r{i}")));
        }
        let body = body_json(handle_logs(&state, None)).await;
        assert_eq!(body.as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_handle_purge_logs() {
        let state = state();
        state.transactions.push(transaction("/a"));
        let body = body_json(handle_purge_logs(&state)).await;
        assert_eq!(body["message"], "Logs have been purged");
        assert!(state.transactions.is_empty());
    }
}
