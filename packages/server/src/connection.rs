//! One accepted client socket with its reader and sender tasks.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use boex_shared::{
    protocol::{BusinessObject, ReadError},
    time::unix_millis,
};
use bytes::Bytes;
use tokio::{io::AsyncWriteExt, sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use crate::{
    lifecycle::{Lifecycle, LifecycleState, Transition},
    reader::{BoxedReader, ObjectReader, ReaderEvent, ReaderState, ReaderStatus},
    registry::ConnectionRegistry,
    sender::{self, AsyncSender, BoxedWriter, SenderExit, SenderListener, SenderWorker},
};

/// Registry key of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where decoded objects go. The server's fan-out in production.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectHandler: Send + Sync {
    async fn object_received(&self, origin: ConnectionId, object: BusinessObject);
}

/// Why the receive direction ended
#[derive(Debug)]
pub enum ReceiverExit {
    /// The client closed its output cleanly
    EndOfStream,
    Failed(ReadError),
}

/// Tasks of a connection that has not been started yet
pub struct ConnectionTasks {
    reader: ObjectReader<BoxedReader>,
    worker: SenderWorker,
}

/// Join handles of a started connection
pub struct ConnectionHandles {
    pub reader: JoinHandle<()>,
    pub sender: JoinHandle<()>,
}

/// A client socket and the two tasks serving it.
///
/// The write half is owned by the sender task while it runs and parked here
/// afterwards; the read half is owned by the reader task. The socket is
/// released, and the connection deregistered, only when both directions
/// have finished.
pub struct ClientConnection {
    id: ConnectionId,
    name: String,
    connected_at: i64,
    sender: AsyncSender,
    reader_status: ReaderStatus,
    lifecycle: Mutex<Lifecycle>,
    parked_writer: Mutex<Option<BoxedWriter>>,
    registry: ConnectionRegistry,
}

impl ClientConnection {
    /// Wrap a socket's halves. Nothing runs until [`ClientConnection::start`].
    pub fn new(
        reader: BoxedReader,
        writer: BoxedWriter,
        name: impl Into<String>,
        registry: ConnectionRegistry,
    ) -> (Arc<Self>, ConnectionTasks) {
        let name = name.into();
        let (sender, worker) = sender::channel(writer, name.clone());
        let reader = ObjectReader::new(reader);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            name,
            connected_at: unix_millis(),
            sender,
            reader_status: reader.status(),
            lifecycle: Mutex::new(Lifecycle::new()),
            parked_writer: Mutex::new(None),
            registry,
        });
        tracing::debug!("{}: initialization done", connection);

        (connection, ConnectionTasks { reader, worker })
    }

    /// Spawn the sender drain task and the reader task.
    pub fn start(
        self: &Arc<Self>,
        tasks: ConnectionTasks,
        handler: Arc<dyn ObjectHandler>,
    ) -> ConnectionHandles {
        let listener: Arc<dyn SenderListener> = self.clone();
        let sender = tasks.worker.spawn(listener);
        let reader = tokio::spawn(self.clone().read_loop(tasks.reader, handler));
        ConnectionHandles { reader, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admission time, Unix milliseconds
    pub fn connected_at(&self) -> i64 {
        self.connected_at
    }

    pub fn reader_state(&self) -> ReaderState {
        self.reader_status.get()
    }

    pub async fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state()
    }

    pub async fn is_released(&self) -> bool {
        self.lifecycle.lock().await.is_released()
    }

    /// Queue a frame for this client and return immediately.
    pub fn send(&self, frame: Bytes) {
        if self.sender.is_finished() {
            tracing::warn!("{}: no more sending business, frame dropped", self);
            return;
        }
        if let Err(e) = self.sender.send(frame) {
            tracing::debug!("{}: {}", self, e);
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: ObjectReader<BoxedReader>,
        handler: Arc<dyn ObjectHandler>,
    ) {
        let exit = loop {
            match reader.next_event().await {
                Some(ReaderEvent::Object(object)) => {
                    tracing::info!("{}: received business object: {}", self, object);
                    handler.object_received(self.id, object).await;
                }
                Some(ReaderEvent::EndOfStream) | None => break ReceiverExit::EndOfStream,
                Some(ReaderEvent::Failed(e)) => break ReceiverExit::Failed(e),
            }
        };
        tracing::debug!("{}: reader done after {} objects", self, reader.objects_read());
        drop(reader);

        self.receiver_finished(exit).await;
    }

    /// Report that the receive direction ended. The sender is asked to stop
    /// so it does not wait on a peer that will never read again.
    pub async fn receiver_finished(&self, exit: ReceiverExit) {
        match &exit {
            ReceiverExit::EndOfStream => {
                tracing::info!("{}: no more objects (client closed connection)", self)
            }
            ReceiverExit::Failed(e) if e.is_peer_reset() => {
                tracing::info!("{}: connection reset by peer", self)
            }
            ReceiverExit::Failed(e) => {
                tracing::error!("{}: failed reading objects from client: {}", self, e)
            }
        }

        let transition = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.is_receiver_finished() {
                tracing::debug!("{}: receiver already done", self);
                return;
            }
            self.sender.request_stop();
            lifecycle.receiver_finished()
        };
        self.apply(transition).await;
    }

    async fn apply(&self, transition: Transition) {
        match transition {
            Transition::Close => self.close().await,
            Transition::Wait => {
                tracing::debug!("{}: waiting for the other direction", self)
            }
            Transition::Duplicate => tracing::debug!("{}: already done", self),
        }
    }

    /// Deregister and release the socket. Runs once both directions are done.
    async fn close(&self) {
        if self.lifecycle.lock().await.mark_released().is_err() {
            tracing::error!("{}: attempting to close a client multiple times", self);
            return;
        }
        tracing::info!(
            "{}: closing connection after {} ms",
            self,
            unix_millis() - self.connected_at
        );

        self.registry.deregister(&self.id).await;

        let writer = self.parked_writer.lock().await.take();
        if let Some(mut writer) = writer {
            // peer state is unknown at this point
            let _ = writer.flush().await;
            let _ = writer.shutdown().await;
        }
    }
}

#[async_trait]
impl SenderListener for ClientConnection {
    async fn sender_finished(&self, exit: SenderExit, writer: BoxedWriter) {
        tracing::debug!("{}: sender finished: {:?}", self, exit);

        let transition = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.is_sender_finished() {
                tracing::debug!("{}: sender already done", self);
                return;
            }
            *self.parked_writer.lock().await = Some(writer);
            lifecycle.sender_finished()
        };
        self.apply(transition).await;
    }
}

impl fmt::Display for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
