//! Mock server orchestration.
//!
//! A [`MockServer`] serves one [`Environment`] on one port. It owns the
//! listener task, the shared [`ServerState`] and the broadcast channel that
//! stops in-flight connections. Several servers may run in one process; the
//! [`ServerHost`] registry keeps track of them by environment uuid.

pub mod error;
mod handler;
mod host;
mod listener;
pub mod response;
pub mod state;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::environment::{Environment, RouteType, ServerOptions};
use crate::proxy::tls::create_tls_acceptor;
use crate::transaction::{ServerEvent, ServerEventKind};

pub use error::ServerError;
pub use handler::HEADER_PARSING_ERROR;
pub use host::ServerHost;
pub use state::ServerState;

pub struct MockServer {
    state: Arc<ServerState>,
    shutdown_tx: broadcast::Sender<()>,
    started: AtomicBool,
    stopped: AtomicBool,
    address: Mutex<Option<SocketAddr>>,
}

impl MockServer {
    pub fn new(environment: Environment, options: ServerOptions) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(ServerState::new(environment, options)),
            shutdown_tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            address: Mutex::new(None),
        }
    }

    /// Bind the listener and start serving.
    ///
    /// Returns the bound address, or `None` when startup failed. Failures are
    /// reported through an `Error` event only. A server starts at most once.
    pub async fn start(&self) -> Option<SocketAddr> {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.address();
        }

        let snapshot = self.state.snapshot();
        let environment = &snapshot.environment;

        let addr = match listener::resolve_address(environment.hostname.as_deref(), environment.port)
            .await
        {
            Ok(addr) => addr,
            Err(e) => {
                self.state.events.error(e);
                return None;
            }
        };

        self.state.seed_data();
        self.state.report_route_errors(&snapshot);

        let tls_acceptor = if environment.tls.enabled && !self.state.options.disable_tls {
            match create_tls_acceptor(&environment.tls, &self.state.options.environment_directory) {
                Ok(acceptor) => Some(acceptor),
                Err(e) => {
                    self.state.events.error(e);
                    return None;
                }
            }
        } else {
            None
        };

        let listener = match listener::create_listener(addr) {
            Ok(listener) => listener,
            Err(e) => {
                self.state.events.error(ServerError::bind(addr.to_string(), e));
                return None;
            }
        };
        let address = match listener.local_addr() {
            Ok(address) => address,
            Err(e) => {
                self.state.events.error(ServerError::Io(e));
                return None;
            }
        };
        *self.address.lock() = Some(address);

        let scheme = if tls_acceptor.is_some() { "https" } else { "http" };
        info!(
            environment = %environment.uuid,
            port = address.port(),
            "Environment '{}' listening on {}://{}",
            environment.name,
            scheme,
            address
        );

        tokio::spawn(listener::accept_loop(
            listener,
            tls_acceptor,
            Arc::clone(&self.state),
            self.shutdown_tx.clone(),
        ));

        self.state.events.emit(ServerEventKind::Started { address });
        Some(address)
    }

    /// Stop accepting connections, close streaming channels and clear the
    /// transaction log. Only the first call has an effect.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.shutdown_tx.send(()).is_err() {
            info!(environment = %self.state.environment_uuid(), "Server was not running");
        }
        self.state.channels.close_all();
        self.state.transactions.clear();

        info!(environment = %self.state.environment_uuid(), "Server stopped");
        self.state.events.emit(ServerEventKind::Stopped);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.state.events.subscribe()
    }

    /// Push a message to the clients of a streaming route.
    ///
    /// Returns `false` when the environment has no streaming route with this
    /// uuid.
    pub fn send_to_route(&self, route_uuid: &str, data: impl Into<String>, replayable: bool) -> bool {
        let snapshot = self.state.snapshot();
        let is_streaming = snapshot
            .environment
            .routes
            .iter()
            .any(|route| route.uuid == route_uuid && route.route_type == RouteType::Ws);
        if !is_streaming {
            warn!(route = route_uuid, "No streaming route to send to");
            return false;
        }

        self.state
            .channels
            .get_or_create(route_uuid)
            .send(data, replayable);
        true
    }

    pub fn address(&self) -> Option<SocketAddr> {
        *self.address.lock()
    }

    pub fn environment_uuid(&self) -> String {
        self.state.environment_uuid()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
            && !self.stopped.load(Ordering::SeqCst)
            && self.address().is_some()
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("environment", &self.environment_uuid())
            .field("address", &self.address())
            .field("running", &self.is_running())
            .finish()
    }
}
