//! Mutable state shared by every connection of one mock server.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::data::{DataStore, GlobalVariables};
use crate::environment::{Environment, ServerOptions};
use crate::proxy::{create_http_client, HttpClient};
use crate::routing::RouteMatcher;
use crate::streaming::StreamingChannels;
use crate::template::TemplateEngine;
use crate::transaction::{EventEmitter, TransactionLog};

use super::error::ServerError;

const EVENT_CAPACITY: usize = 256;

/// An environment together with the matcher compiled from it.
#[derive(Debug)]
pub struct Snapshot {
    pub environment: Environment,
    pub matcher: RouteMatcher,
}

impl Snapshot {
    pub fn new(environment: Environment, disabled_routes: &[String]) -> Self {
        let matcher = RouteMatcher::new(&environment, disabled_routes);
        Self {
            environment,
            matcher,
        }
    }
}

pub struct ServerState {
    snapshot: RwLock<Arc<Snapshot>>,
    pub options: ServerOptions,
    pub engine: TemplateEngine,
    pub data: DataStore,
    pub global_vars: GlobalVariables,
    pub transactions: TransactionLog,
    pub channels: StreamingChannels,
    pub events: EventEmitter,
    pub http_client: HttpClient,
    request_counters: Mutex<HashMap<String, u64>>,
}

impl ServerState {
    pub fn new(environment: Environment, options: ServerOptions) -> Self {
        let events = EventEmitter::new(environment.uuid.clone(), EVENT_CAPACITY);
        let engine = TemplateEngine::new(&options.faker_options, &options.env_vars_prefix);
        let data = DataStore::new(&environment.data);
        let transactions = TransactionLog::new(options.max_transaction_logs);
        let snapshot = Snapshot::new(environment, &options.disabled_routes);

        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            options,
            engine,
            data,
            global_vars: GlobalVariables::new(),
            transactions,
            channels: StreamingChannels::new(),
            events,
            http_client: create_http_client(),
            request_counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn environment_uuid(&self) -> String {
        self.snapshot.read().environment.uuid.clone()
    }

    /// Ask the host for a newer environment and swap it in when one is given.
    /// An unchanged environment keeps the current matcher.
    pub fn refresh(&self) -> Arc<Snapshot> {
        let Some(refresh) = self.options.refresh_environment.as_ref() else {
            return self.snapshot();
        };
        let current = self.snapshot();
        let uuid = current.environment.uuid.clone();
        match refresh(&uuid) {
            Some(environment) if environment == current.environment => current,
            Some(environment) => {
                debug!(environment = %uuid, "Environment refreshed");
                let snapshot = Arc::new(Snapshot::new(environment, &self.options.disabled_routes));
                self.report_route_errors(&snapshot);
                *self.snapshot.write() = Arc::clone(&snapshot);
                snapshot
            }
            None => current,
        }
    }

    /// Emit a `ROUTE_CREATION_ERROR` for each route the matcher rejected.
    pub fn report_route_errors(&self, snapshot: &Snapshot) {
        for error in snapshot.matcher.creation_errors() {
            self.events.error(ServerError::RouteCreation {
                route: error.route_uuid.clone(),
                message: error.message.clone(),
            });
        }
    }

    /// Increment and return the 1-based request count of a route.
    pub fn next_request_number(&self, route_uuid: &str) -> u64 {
        let mut counters = self.request_counters.lock();
        let counter = counters.entry(route_uuid.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn seed_data(&self) {
        self.data.seed(&self.engine);
    }

    /// Reset the server to its initial state: reseed buckets, drop global
    /// variables, request counters and logged transactions.
    pub fn purge(&self) {
        let mut counters = self.request_counters.lock();
        self.data.seed(&self.engine);
        self.global_vars.purge();
        self.transactions.clear();
        counters.clear();
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("environment", &self.environment_uuid())
            .field("options", &self.options)
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DataBucket;
    use serde_json::{json, Value};

    fn state() -> ServerState {
        let environment = Environment {
            uuid: "env-1".to_string(),
            data: vec![DataBucket {
                uuid: "b1".to_string(),
                id: "users".to_string(),
                name: "Users".to_string(),
                value: "[1, 2]".to_string(),
                ..DataBucket::default()
            }],
            ..Environment::default()
        };
        ServerState::new(environment, ServerOptions::default())
    }

    #[test]
    fn test_request_counters() {
        let state = state();
        assert_eq!(state.next_request_number("r1"), 1);
        assert_eq!(state.next_request_number("r1"), 2);
        assert_eq!(state.next_request_number("r2"), 1);
    }

    #[test]
    fn test_purge_resets_state() {
        let state = state();
        state.seed_data();
        state.data.update("users", |v| *v = Value::Null);
        state.global_vars.set("k", json!("v"));
        state.next_request_number("r1");
        state.transactions.push(crate::transaction::tests::transaction("/a"));

        state.purge();

        assert_eq!(state.data.get_value("users"), Some(json!([1, 2])));
        assert!(state.global_vars.is_empty());
        assert!(state.transactions.is_empty());
        assert_eq!(state.next_request_number("r1"), 1);
    }

    #[test]
    fn test_refresh_swaps_environment() {
        let environment = Environment {
            uuid: "env-1".to_string(),
            ..Environment::default()
        };
        let options = ServerOptions::default().with_refresh_environment(|uuid| {
            Some(Environment {
                uuid: uuid.to_string(),
                name: "refreshed".to_string(),
                ..Environment::default()
            })
        });
        let state = ServerState::new(environment, options);
        assert_eq!(state.snapshot().environment.name, "");
        assert_eq!(state.refresh().environment.name, "refreshed");
        assert_eq!(state.snapshot().environment.name, "refreshed");
    }

    #[test]
    fn test_repeated_refresh_reports_route_errors_once() {
        let environment: Environment = serde_json::from_value(json!({
            "uuid": "env-1",
            "routes": [{
                "uuid": "bad",
                "method": "get",
                "endpoint": "/users(/",
                "responses": [{}]
            }]
        }))
        .unwrap();
        let mut refreshed = environment.clone();
        refreshed.name = "refreshed".to_string();
        let options =
            ServerOptions::default().with_refresh_environment(move |_| Some(refreshed.clone()));
        let state = ServerState::new(environment, options);
        let mut rx = state.events.subscribe();

        for _ in 0..5 {
            state.refresh();
        }

        let mut errors = 0;
        while let Ok(event) = rx.try_recv() {
            if let crate::transaction::ServerEventKind::Error { code, .. } = event.kind {
                assert_eq!(code, crate::transaction::ServerErrorCode::RouteCreationError);
                errors += 1;
            }
        }
        assert_eq!(errors, 1);
        assert_eq!(state.snapshot().environment.name, "refreshed");
    }
}
