//! Pull-based reader turning a byte stream into business objects.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use boex_shared::protocol::{BusinessObject, ReadError, read_packet};
use tokio::io::{AsyncRead, BufReader};

/// Read half of a client socket
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Diagnostic state of an [`ObjectReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    NotStarted,
    /// Blocked on the stream inside a frame (or waiting for one)
    ReadingFrame,
    /// An object was handed out and is being processed by the caller
    Dispatching,
    Finished,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::NotStarted,
            1 => ReaderState::ReadingFrame,
            2 => ReaderState::Dispatching,
            _ => ReaderState::Finished,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ReaderState::NotStarted => 0,
            ReaderState::ReadingFrame => 1,
            ReaderState::Dispatching => 2,
            ReaderState::Finished => 3,
        }
    }
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderState::NotStarted => "not started",
            ReaderState::ReadingFrame => "reading frame",
            ReaderState::Dispatching => "dispatching",
            ReaderState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Shared view of a reader's state. The value may change right after it is
/// read; use it for diagnostics only.
#[derive(Debug, Clone)]
pub struct ReaderStatus(Arc<AtomicU8>);

impl ReaderStatus {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ReaderState::NotStarted.as_u8())))
    }

    pub fn get(&self) -> ReaderState {
        ReaderState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ReaderState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// One step of the read loop.
#[derive(Debug)]
pub enum ReaderEvent {
    Object(BusinessObject),
    /// The peer closed its side cleanly between frames
    EndOfStream,
    /// Protocol violation, transport failure or peer reset
    Failed(ReadError),
}

/// Decodes objects from a stream, one event per call.
///
/// After [`ReaderEvent::EndOfStream`] or [`ReaderEvent::Failed`] the reader is
/// finished and [`ObjectReader::next_event`] returns `None` forever.
pub struct ObjectReader<R> {
    stream: BufReader<R>,
    status: ReaderStatus,
    objects_read: u64,
}

impl<R: AsyncRead + Unpin> ObjectReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream: BufReader::new(stream),
            status: ReaderStatus::new(),
            objects_read: 0,
        }
    }

    pub fn status(&self) -> ReaderStatus {
        self.status.clone()
    }

    pub fn objects_read(&self) -> u64 {
        self.objects_read
    }

    pub async fn next_event(&mut self) -> Option<ReaderEvent> {
        if self.status.get() == ReaderState::Finished {
            return None;
        }

        self.status.set(ReaderState::ReadingFrame);
        let event = match read_packet(&mut self.stream).await {
            Ok(Some(packet)) => {
                self.objects_read += 1;
                self.status.set(ReaderState::Dispatching);
                return Some(ReaderEvent::Object(BusinessObject::from(packet)));
            }
            Ok(None) => ReaderEvent::EndOfStream,
            Err(e) => ReaderEvent::Failed(e),
        };
        self.status.set(ReaderState::Finished);
        Some(event)
    }
}
