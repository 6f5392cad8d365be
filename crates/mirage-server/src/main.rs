//! Mirage command-line host.
//!
//! Loads one environment file and serves it until ctrl-c.
//!
//! ```bash
//! mirage ./environment.json --port 3001
//! RUST_LOG=debug mirage ./environment.yaml --disable-routes users,health
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use mirage_server::environment::{FakerLocale, FakerOptions};
use mirage_server::metrics::collect_metrics;
use mirage_server::{Environment, MockServer, ServerEventKind, ServerHost, ServerOptions};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mirage")]
#[command(author, version, about = "Serve a mock API environment")]
struct Args {
    /// Environment file (JSON, or YAML by extension)
    #[arg(required = true)]
    file: PathBuf,

    /// Override the environment port
    #[arg(short, long, env = "MIRAGE_PORT")]
    port: Option<u32>,

    /// Override the environment hostname
    #[arg(long, env = "MIRAGE_HOSTNAME")]
    hostname: Option<String>,

    #[arg(long)]
    disable_admin_api: bool,

    /// Serve plain HTTP even when TLS is enabled in the environment
    #[arg(long)]
    disable_tls: bool,

    #[arg(long, default_value = "100")]
    max_transaction_logs: usize,

    #[arg(long, default_value = "en")]
    faker_locale: String,

    #[arg(long)]
    faker_seed: Option<u64>,

    /// Only environment variables with this prefix are readable by templates
    #[arg(long, default_value = "MOCKOON_")]
    env_vars_prefix: String,

    /// Route uuids or endpoint fragments to disable
    #[arg(long, value_delimiter = ',')]
    disable_routes: Vec<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "MIRAGE_METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn server_options(&self) -> ServerOptions {
        let environment_directory = self
            .file
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        ServerOptions {
            environment_directory,
            disabled_routes: self.disable_routes.clone(),
            refresh_environment: None,
            faker_options: FakerOptions {
                locale: FakerLocale::parse(&self.faker_locale),
                seed: self.faker_seed,
            },
            env_vars_prefix: self.env_vars_prefix.clone(),
            enable_admin_api: !self.disable_admin_api,
            disable_tls: self.disable_tls,
            max_transaction_logs: self.max_transaction_logs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut environment = Environment::from_file(&args.file)
        .with_context(|| format!("Failed to load environment {}", args.file.display()))?;
    if let Some(port) = args.port {
        environment.port = port;
    }
    if let Some(hostname) = &args.hostname {
        environment.hostname = Some(hostname.clone());
    }

    info!(
        environment = %environment.uuid,
        routes = environment.routes.len(),
        "Loaded environment '{}'",
        environment.name
    );

    let host = ServerHost::new();
    let server = match host.start(environment, args.server_options()).await {
        Ok(server) => server,
        Err(code) => {
            error!("Server failed to start: {}", code);
            std::process::exit(1);
        }
    };

    if let Some(port) = args.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics port {port}"))?;
        info!("Metrics available on http://{}/metrics", addr);
        tokio::spawn(serve_metrics(listener));
    }

    tokio::spawn(log_events(Arc::clone(&server)));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    host.stop_all();
    Ok(())
}

async fn log_events(server: Arc<MockServer>) {
    let mut events = server.subscribe();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Skipped {} server events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event.kind {
            ServerEventKind::TransactionComplete(transaction) => info!(
                method = %transaction.request.method,
                path = %transaction.request.url_path,
                status = transaction.response.status_code,
                proxied = transaction.proxied,
                "Request served"
            ),
            ServerEventKind::CreatingProxy => debug!("Forwarding request to proxy host"),
            ServerEventKind::Error { code, .. } if code.is_fatal() => {
                error!("Fatal server error: {}", code);
                std::process::exit(1);
            }
            ServerEventKind::Stopped => break,
            _ => {}
        }
    }
}

async fn serve_metrics(listener: TcpListener) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Metrics accept error: {}", e);
                continue;
            }
        };

        tokio::spawn(async move {
            let service = service_fn(|_req: Request<hyper::body::Incoming>| async {
                Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(collect_metrics()))))
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Metrics connection error: {}", e);
            }
        });
    }
}
