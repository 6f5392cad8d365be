//! Host-supplied server options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use super::Environment;

/// Called with the environment uuid before each request; returning `Some`
/// swaps in an updated environment without restarting the listener.
pub type RefreshEnvironmentFn = Arc<dyn Fn(&str) -> Option<Environment> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FakerLocale {
    #[default]
    En,
    Fr,
    ZhCn,
    ZhTw,
}

impl FakerLocale {
    /// Parse a locale name, falling back to English for unsupported ones.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "en" | "en_us" | "en_gb" => FakerLocale::En,
            "fr" | "fr_fr" => FakerLocale::Fr,
            "zh_cn" => FakerLocale::ZhCn,
            "zh_tw" => FakerLocale::ZhTw,
            other => {
                warn!("Unsupported faker locale '{}', using 'en'", other);
                FakerLocale::En
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakerOptions {
    pub locale: FakerLocale,
    pub seed: Option<u64>,
}

#[derive(Clone)]
pub struct ServerOptions {
    /// Base directory for relative response file paths.
    pub environment_directory: PathBuf,
    /// Route UUIDs, or endpoint substrings, excluded from matching.
    pub disabled_routes: Vec<String>,
    pub refresh_environment: Option<RefreshEnvironmentFn>,
    pub faker_options: FakerOptions,
    pub env_vars_prefix: String,
    pub enable_admin_api: bool,
    pub disable_tls: bool,
    pub max_transaction_logs: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            environment_directory: PathBuf::from("."),
            disabled_routes: Vec::new(),
            refresh_environment: None,
            faker_options: FakerOptions::default(),
            env_vars_prefix: "MOCKOON_".to_string(),
            enable_admin_api: true,
            disable_tls: false,
            max_transaction_logs: 100,
        }
    }
}

impl ServerOptions {
    pub fn with_refresh_environment<F>(mut self, refresh: F) -> Self
    where
        F: Fn(&str) -> Option<Environment> + Send + Sync + 'static,
    {
        self.refresh_environment = Some(Arc::new(refresh));
        self
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("environment_directory", &self.environment_directory)
            .field("disabled_routes", &self.disabled_routes)
            .field("refresh_environment", &self.refresh_environment.is_some())
            .field("faker_options", &self.faker_options)
            .field("env_vars_prefix", &self.env_vars_prefix)
            .field("enable_admin_api", &self.enable_admin_api)
            .field("disable_tls", &self.disable_tls)
            .field("max_transaction_logs", &self.max_transaction_logs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_locale_parse() {
        assert_eq!(FakerLocale::parse("en"), FakerLocale::En);
        assert_eq!(FakerLocale::parse("fr-FR"), FakerLocale::Fr);
        assert_eq!(FakerLocale::parse("zh_CN"), FakerLocale::ZhCn);
    }

    #[test]
    #[traced_test]
    fn test_unsupported_locale_warns() {
        assert_eq!(FakerLocale::parse("xx"), FakerLocale::En);
        assert!(logs_contain("Unsupported faker locale 'xx'"));
    }

    #[test]
    fn test_default_options() {
        let options = ServerOptions::default();
        assert!(options.enable_admin_api);
        assert_eq!(options.env_vars_prefix, "MOCKOON_");
        assert_eq!(options.max_transaction_logs, 100);
        assert!(format!("{options:?}").contains("refresh_environment: false"));
    }
}
