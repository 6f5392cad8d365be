//! Registry of running mock servers, keyed by environment uuid.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;

use super::MockServer;
use crate::environment::{Environment, ServerOptions};
use crate::transaction::{ServerErrorCode, ServerEventKind};

#[derive(Debug, Default)]
pub struct ServerHost {
    servers: RwLock<HashMap<String, Arc<MockServer>>>,
}

impl ServerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a server for an environment, replacing any server already
    /// running for the same uuid.
    ///
    /// On failure the code of the first fatal error event is returned.
    pub async fn start(
        &self,
        environment: Environment,
        options: ServerOptions,
    ) -> Result<Arc<MockServer>, ServerErrorCode> {
        let uuid = environment.uuid.clone();
        self.stop(&uuid);

        let server = Arc::new(MockServer::new(environment, options));
        let mut events = server.subscribe();

        if server.start().await.is_none() {
            let mut code = ServerErrorCode::UnknownServerError;
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        if let ServerEventKind::Error { code: c, .. } = event.kind {
                            if c.is_fatal() {
                                code = c;
                                break;
                            }
                        }
                    }
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            return Err(code);
        }

        self.servers.write().insert(uuid, Arc::clone(&server));
        Ok(server)
    }

    /// Stop the server of an environment. Returns `false` when none is running.
    pub fn stop(&self, environment_uuid: &str) -> bool {
        let server = self.servers.write().remove(environment_uuid);
        match server {
            Some(server) => {
                server.stop();
                info!(environment = environment_uuid, "Server removed from host");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let servers: Vec<Arc<MockServer>> = self.servers.write().drain().map(|(_, s)| s).collect();
        for server in servers {
            server.stop();
        }
    }

    pub fn get(&self, environment_uuid: &str) -> Option<Arc<MockServer>> {
        self.servers.read().get(environment_uuid).cloned()
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}
