//! Environment model: the static description of one mock API.
//!
//! An [`Environment`] is loaded by the host (JSON or YAML) and handed to
//! [`crate::server::MockServer`] together with [`ServerOptions`]. Runtime state
//! such as data bucket values, global variables and the transaction log never
//! lives here.

mod options;
mod route;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use options::{FakerLocale, FakerOptions, RefreshEnvironmentFn, ServerOptions};
pub use route::{
    BodySource, Callback, CallbackInvocation, DataBucket, Header, ResponseRule, Route,
    RouteResponse, RouteType, RuleTarget, RulesOperator,
};

use crate::template::migration::{migrate_template, TEMPLATE_VERSION};

fn default_port() -> u32 {
    3000
}

fn current_template_version() -> u32 {
    TEMPLATE_VERSION
}

/// Proxy behavior for requests that reach the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Never proxy; unmatched requests get a 404.
    #[default]
    Disabled,
    /// Proxy requests that match no route.
    Fallback,
    /// Proxy every non-admin request.
    Always,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default)]
    pub mode: ProxyMode,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub remove_prefix: bool,
    #[serde(default)]
    pub req_headers: Vec<Header>,
    #[serde(default)]
    pub res_headers: Vec<Header>,
}

impl ProxyConfig {
    pub fn is_enabled(&self) -> bool {
        self.mode != ProxyMode::Disabled && !self.host.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub ca_path: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    /// Kept wider than `u16` so an out-of-range value surfaces as
    /// `PORT_INVALID` at start instead of a load failure.
    #[serde(default = "default_port")]
    pub port: u32,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub endpoint_prefix: String,
    /// Latency in milliseconds applied to every served request.
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub cors: bool,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub data: Vec<DataBucket>,
    #[serde(default)]
    pub callbacks: Vec<Callback>,
    #[serde(default = "current_template_version")]
    pub last_migration: u32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            name: String::new(),
            port: default_port(),
            hostname: None,
            endpoint_prefix: String::new(),
            latency: 0,
            cors: false,
            headers: Vec::new(),
            proxy: ProxyConfig::default(),
            tls: TlsConfig::default(),
            routes: Vec::new(),
            data: Vec::new(),
            callbacks: Vec::new(),
            last_migration: current_template_version(),
        }
    }
}

impl Environment {
    /// Load an environment from a JSON or YAML file.
    ///
    /// The format is chosen by extension (`.yaml`/`.yml` is YAML, anything else
    /// JSON). Templates written for an older syntax are migrated once here.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut environment: Environment = if is_yaml {
            serde_yaml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };
        environment.validate()?;
        environment.migrate_templates();
        Ok(environment)
    }

    /// Validate structural invariants the engine relies on.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.uuid.trim().is_empty() {
            anyhow::bail!("Environment uuid must not be empty");
        }

        for route in &self.routes {
            if route.responses.is_empty() {
                anyhow::bail!(
                    "Route '{}' ({} /{}) must declare at least one response",
                    route.uuid,
                    route.method,
                    route.endpoint
                );
            }
        }

        if self.proxy.mode != ProxyMode::Disabled && self.proxy.host.is_empty() {
            anyhow::bail!("Proxy mode '{:?}' requires 'proxy.host'", self.proxy.mode);
        }

        for callback in &self.callbacks {
            let target = self.routes.iter().find(|r| r.uuid == callback.route_uuid);
            match target {
                Some(route) if route.route_type == RouteType::Ws => {}
                Some(_) => anyhow::bail!(
                    "Callback '{}' targets route '{}' which is not a streaming route",
                    callback.name,
                    callback.route_uuid
                ),
                None => anyhow::bail!(
                    "Callback '{}' targets unknown route '{}'",
                    callback.name,
                    callback.route_uuid
                ),
            }
        }

        Ok(())
    }

    /// Rewrite legacy helper syntax in every template of this environment.
    ///
    /// Returns true if the environment was migrated.
    pub fn migrate_templates(&mut self) -> bool {
        if self.last_migration >= TEMPLATE_VERSION {
            return false;
        }

        let migrate_headers = |headers: &mut Vec<Header>| {
            for header in headers.iter_mut() {
                header.value = migrate_template(&header.value);
            }
        };

        migrate_headers(&mut self.headers);
        migrate_headers(&mut self.proxy.req_headers);
        migrate_headers(&mut self.proxy.res_headers);
        for route in &mut self.routes {
            for response in &mut route.responses {
                response.body = migrate_template(&response.body);
                migrate_headers(&mut response.headers);
            }
        }
        for bucket in &mut self.data {
            bucket.value = migrate_template(&bucket.value);
        }
        for callback in &mut self.callbacks {
            callback.body = migrate_template(&callback.body);
        }

        info!(
            environment = %self.uuid,
            from = self.last_migration,
            to = TEMPLATE_VERSION,
            "Migrated environment templates"
        );
        self.last_migration = TEMPLATE_VERSION;
        true
    }

    /// Find a data bucket by its short id, uuid or name.
    pub fn find_bucket(&self, key: &str) -> Option<&DataBucket> {
        self.data
            .iter()
            .find(|b| b.id == key || b.uuid == key || b.name == key)
    }

    pub fn find_route(&self, uuid: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.uuid == uuid)
    }
}
