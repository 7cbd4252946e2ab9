//! HTTP server setup.
//!
//! # Responsibilities
//! - Accept client connections from the bounded listener
//! - Serve each connection with hyper's HTTP/1.1 server
//! - Route every request, whatever its method or path, to the tee handler
//! - Run the session cache sweeper
//! - Drain open connections on shutdown

use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::config::TeeConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::session::SessionCache;
use crate::tee::TeeHandler;

/// HTTP server for the tee proxy.
pub struct TeeServer {
    config: TeeConfig,
    handler: TeeHandler,
    connections: ConnectionTracker,
}

impl TeeServer {
    /// Create a new server with the given configuration.
    pub fn new(config: TeeConfig) -> Self {
        let sessions = SessionCache::new(config.session.ttl());
        let handler = TeeHandler::new(&config, sessions);
        Self {
            config,
            handler,
            connections: ConnectionTracker::new(),
        }
    }

    /// The handler shared by every connection.
    pub fn handler(&self) -> TeeHandler {
        self.handler.clone()
    }

    pub fn config(&self) -> &TeeConfig {
        &self.config
    }

    /// Serve connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                address = %addr,
                primary = %self.config.primary.address,
                shadow = %self.config.shadow.address,
                "Tee server starting"
            );
        }

        let sweeper = self
            .handler
            .sessions()
            .spawn_sweeper(self.config.session.sweep_interval(), shutdown.resubscribe());

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr, permit)) => {
                            let guard = self.connections.track();
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let connection_id = guard.id();
                                let service = ServiceBuilder::new()
                                    .layer(
                                        // The handler already warns with the failure cause.
                                        TraceLayer::new_for_http()
                                            .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
                                    )
                                    .service_fn(move |request: Request<Incoming>| {
                                        let handler = handler.clone();
                                        async move { handler.handle(request).await }
                                    });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
                                    .await
                                {
                                    tracing::debug!(
                                        connection_id = %connection_id,
                                        peer_addr = %peer_addr,
                                        error = %e,
                                        "Connection closed with error"
                                    );
                                }
                                drop(guard);
                            });
                        }
                        Err(ListenerError::Closed) => return Err(ListenerError::Closed),
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let deadline = Duration::from_secs(self.config.listener.drain_timeout_secs);
        if !self.connections.drain(deadline).await {
            tracing::warn!(
                open_connections = self.connections.active_count(),
                "Drain deadline passed with connections still open"
            );
        }
        sweeper.abort();

        tracing::info!("Tee server stopped");
        Ok(())
    }
}
