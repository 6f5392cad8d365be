//! Listener setup and the connection accept loop.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use super::error::ServerError;
use super::handler::handle_request;
use super::state::ServerState;

const BACKLOG: i32 = 1024;

/// Resolve the bind address. A missing hostname binds every interface.
pub async fn resolve_address(hostname: Option<&str>, port: u32) -> Result<SocketAddr, ServerError> {
    let port = u16::try_from(port).map_err(|_| ServerError::InvalidPort(port))?;

    let hostname = match hostname.map(str::trim).filter(|h| !h.is_empty()) {
        None => return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        Some(hostname) => hostname,
    };
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    tokio::net::lookup_host((hostname, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ServerError::HostnameUnknown(hostname.to_string()))
}

/// Create a TCP listener with `SO_REUSEADDR` so a restarted server can bind
/// while old connections linger in `TIME_WAIT`.
pub fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Accept connections until a shutdown signal is received.
pub async fn accept_loop(
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    state: Arc<ServerState>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let local_addr = listener.local_addr().ok();

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, remote_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        debug!("Accept error on {:?}: {}", local_addr, e);
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                let shutdown_rx = shutdown_tx.subscribe();
                let tls_acceptor = tls_acceptor.clone();

                tokio::spawn(async move {
                    match tls_acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                serve_connection(tls_stream, state, remote_addr, shutdown_rx).await
                            }
                            Err(e) => debug!("TLS handshake failed from {}: {}", remote_addr, e),
                        },
                        None => serve_connection(stream, state, remote_addr, shutdown_rx).await,
                    }
                });
            }
            _ = shutdown_rx.recv() => {
                info!("Listener on {:?} shutting down", local_addr);
                break;
            }
        }
    }
}

/// Serve one connection, finishing in-flight requests on shutdown.
async fn serve_connection<I>(
    io: I,
    state: Arc<ServerState>,
    remote_addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| handle_request(req, Arc::clone(&state), remote_addr));
    let connection = http1::Builder::new().serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!("Error serving connection from {}: {}", remote_addr, e);
            }
        }
        _ = shutdown_rx.recv() => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.await {
                debug!("Error closing connection from {}: {}", remote_addr, e);
            }
        }
    }
}
