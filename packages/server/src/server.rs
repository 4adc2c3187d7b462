//! Accept loop and fan-out.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use boex_shared::{protocol::BusinessObject, time::format_now};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    config::ServerConfig,
    connection::{ConnectionId, ObjectHandler},
    error::ServerError,
    registry::ConnectionRegistry,
};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Relays every received object to every registered connection, the
/// origin included.
pub struct FanOut {
    registry: ConnectionRegistry,
}

impl FanOut {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ObjectHandler for FanOut {
    async fn object_received(&self, origin: ConnectionId, object: BusinessObject) {
        // serialized once, shared by every target queue
        let frame = match object.to_bytes() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Dropping object from {}: {}", origin, e);
                return;
            }
        };
        let targets = self.registry.broadcast(frame).await;
        tracing::debug!("Relayed {} to {} clients", object, targets);
    }
}

pub struct BroadcastServer {
    listener: TcpListener,
    registry: ConnectionRegistry,
    fan_out: Arc<FanOut>,
}

impl BroadcastServer {
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::from_listener(listener))
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        let registry = ConnectionRegistry::new();
        let fan_out = Arc::new(FanOut::new(registry.clone()));
        Self {
            listener,
            registry,
            fan_out,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    /// Accept clients forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Accept clients until `shutdown` completes. Connections already
    /// admitted keep running on their own tasks.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        match self.listener.local_addr() {
            Ok(addr) => tracing::info!("Broadcast server listening on {}", addr),
            Err(e) => tracing::warn!("Listening on an unknown address: {}", e),
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting clients");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr).await,
                    Err(e) => {
                        tracing::error!("Failed to accept a client: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        tracing::info!("Client connected from {} at {}", addr, format_now());
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", addr, e);
        }
        let (read_half, write_half) = stream.into_split();
        self.registry
            .admit(
                Box::new(read_half),
                Box::new(write_half),
                format!("ClientConnection-{addr}"),
                self.fan_out.clone(),
            )
            .await;
    }
}
