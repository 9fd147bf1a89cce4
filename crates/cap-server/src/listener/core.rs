//! A single HTTP(S) endpoint serving one configured server.

use super::handler::handle_request;
use super::tls::create_tls_acceptor;
use super::types::{ListenerError, ListenerState};
use crate::config::{Config, Scheme, ServerConfig};
use crate::matcher::RuleSet;
use crate::request_log::RequestLogPipeline;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Pause after a failed accept so persistent errors (EMFILE) do not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a listener needs to answer requests for its server
pub struct Listener {
    server: ServerConfig,
    rules: RuleSet,
    config: Arc<Config>,
    pipeline: Arc<RequestLogPipeline>,
}

impl Listener {
    pub fn new(server: ServerConfig, config: Arc<Config>, pipeline: Arc<RequestLogPipeline>) -> Self {
        let rules = RuleSet::compile(&config, &server);
        Self {
            server,
            rules,
            config,
            pipeline,
        }
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &RequestLogPipeline {
        &self.pipeline
    }

    pub fn identity(&self) -> String {
        self.server.identity()
    }

    /// Bind and serve until `shutdown` fires or its sender goes away.
    ///
    /// `Serving` is published once the socket is bound. Open connections are
    /// aborted when the listener stops.
    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
        state: &watch::Sender<ListenerState>,
    ) -> Result<(), ListenerError> {
        let tls_acceptor = match self.server.base_url.scheme() {
            Scheme::Https => {
                let ssl = self.server.ssl_config.as_ref().ok_or_else(|| {
                    ListenerError::Tls("SSL configuration required for https".to_string())
                })?;
                Some(create_tls_acceptor(ssl)?)
            }
            Scheme::Http => None,
        };

        let host = self.server.base_url.host().to_string();
        let port = self.server.base_url.port();
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|source| ListenerError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            "Server {} listening on {} with {} rules",
            self.server.display_name(),
            local_addr,
            self.rules.len()
        );
        state.send_replace(ListenerState::Serving(local_addr));

        let listener_ctx = Arc::new(self);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            let ctx = Arc::clone(&listener_ctx);
                            let tls_acceptor = tls_acceptor.clone();
                            connections.spawn(async move {
                                match tls_acceptor {
                                    Some(acceptor) => match acceptor.accept(stream).await {
                                        Ok(tls_stream) => serve_connection(tls_stream, ctx, remote_addr).await,
                                        Err(e) => debug!("TLS handshake failed from {}: {}", remote_addr, e),
                                    },
                                    None => serve_connection(stream, ctx, remote_addr).await,
                                }
                            });
                        }
                        Err(e) => accept_backoff(&e, local_addr).await,
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => {
                    info!("Server {} on {} shutting down", listener_ctx.server.display_name(), local_addr);
                    break;
                }
            }
        }

        connections.abort_all();
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

async fn accept_backoff(e: &std::io::Error, local_addr: SocketAddr) {
    error!("Accept error on {}: {}", local_addr, e);
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn serve_connection<I>(io: I, listener: Arc<Listener>, remote_addr: SocketAddr)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(io);
    let service = service_fn(move |req| {
        let listener = Arc::clone(&listener);
        async move { handle_request(req, listener).await }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        debug!("Connection error from {}: {}", remote_addr, e);
    }
}
