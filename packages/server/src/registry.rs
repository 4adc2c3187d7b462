//! Registry of live connections and the fan-out walk over it.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::{
    connection::{ClientConnection, ConnectionId, ObjectHandler},
    reader::BoxedReader,
    sender::BoxedWriter,
};

/// Live connections, shared between the accept loop, the fan-out and every
/// connection's close path.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<ConnectionId, Arc<ClientConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and start its tasks. The connection is
    /// visible to fan-out before its reader can deliver anything.
    pub async fn admit(
        &self,
        reader: BoxedReader,
        writer: BoxedWriter,
        name: impl Into<String>,
        handler: Arc<dyn ObjectHandler>,
    ) -> Arc<ClientConnection> {
        let (connection, tasks) = ClientConnection::new(reader, writer, name, self.clone());
        self.register(connection.clone()).await;
        connection.start(tasks, handler);
        connection
    }

    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut connections = self.connections.lock().await;
        connections.insert(connection.id(), connection.clone());
        tracing::info!(
            "{} registered ({} connected)",
            connection,
            connections.len()
        );
    }

    pub async fn deregister(&self, id: &ConnectionId) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.remove(id) {
            Some(connection) => {
                tracing::info!(
                    "{} deregistered ({} connected)",
                    connection,
                    connections.len()
                );
                true
            }
            None => {
                tracing::error!("Connection {} was not registered", id);
                false
            }
        }
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.lock().await.keys().copied().collect()
    }

    /// Queue `frame` on every registered connection. Enqueueing never waits
    /// on a socket, so the lock is held only for the walk over the map.
    pub async fn broadcast(&self, frame: Bytes) -> usize {
        let connections = self.connections.lock().await;
        for connection in connections.values() {
            connection.send(frame.clone());
        }
        connections.len()
    }
}
