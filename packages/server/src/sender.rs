//! Per-connection outbound queue.
//!
//! [`AsyncSender`] enqueues frames without blocking; a [`SenderWorker`] task
//! drains the queue into the socket's write half. When the worker ends, for
//! whatever reason, it notifies its [`SenderListener`] exactly once and hands
//! the write half back.
//!
//! The queue is unbounded: a peer that stops reading makes its queue grow
//! without limit. There is no backpressure towards the objects' originators.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};

use crate::error::SenderError;

/// Write half of a client socket
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

enum Outbound {
    Frame(Bytes),
    Stop,
}

/// Why a drain loop ended
#[derive(Debug)]
pub enum SenderExit {
    /// Stop was requested and everything queued before it was written
    Stopped,
    /// Writing to the socket failed
    WriteFailed(io::Error),
    /// Every [`AsyncSender`] handle was dropped
    Abandoned,
}

impl SenderExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, SenderExit::WriteFailed(_))
    }
}

/// Receives the single terminal notification of a drain loop.
#[async_trait]
pub trait SenderListener: Send + Sync {
    async fn sender_finished(&self, exit: SenderExit, writer: BoxedWriter);
}

/// Producer side of the outbound queue.
#[derive(Clone)]
pub struct AsyncSender {
    tx: mpsc::UnboundedSender<Outbound>,
    finished: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    label: Arc<str>,
}

/// Consumer side of the outbound queue; owns the write half until it ends.
pub struct SenderWorker {
    rx: mpsc::UnboundedReceiver<Outbound>,
    writer: BoxedWriter,
    finished: Arc<AtomicBool>,
    label: Arc<str>,
}

/// Create a sender and the worker that drains it into `writer`.
pub fn channel(writer: BoxedWriter, label: impl Into<String>) -> (AsyncSender, SenderWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let finished = Arc::new(AtomicBool::new(false));
    let label: Arc<str> = Arc::from(label.into());

    let sender = AsyncSender {
        tx,
        finished: finished.clone(),
        stop_requested: Arc::new(AtomicBool::new(false)),
        label: label.clone(),
    };
    let worker = SenderWorker {
        rx,
        writer,
        finished,
        label,
    };
    (sender, worker)
}

impl AsyncSender {
    /// Queue a frame and return immediately.
    ///
    /// Sending after the worker has ended is a caller bug; it is logged and
    /// reported, and the frame is dropped.
    pub fn send(&self, frame: Bytes) -> Result<(), SenderError> {
        if self.finished.load(Ordering::Acquire) || self.tx.send(Outbound::Frame(frame)).is_err() {
            tracing::warn!("{}: send after sender terminated, frame dropped", self.label);
            return Err(SenderError::Terminated(self.label.to_string()));
        }
        Ok(())
    }

    /// Ask the worker to stop once everything queued so far is written.
    pub fn request_stop(&self) {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            tracing::debug!("{}: stop already requested", self.label);
            return;
        }
        if self.tx.send(Outbound::Stop).is_err() {
            tracing::debug!("{}: stop requested after sender terminated", self.label);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

impl SenderWorker {
    /// Run the drain loop on its own task.
    pub fn spawn(self, listener: Arc<dyn SenderListener>) -> JoinHandle<()> {
        tokio::spawn(self.run(listener))
    }

    pub async fn run(mut self, listener: Arc<dyn SenderListener>) {
        let exit = self.drain().await;
        self.finished.store(true, Ordering::Release);

        self.rx.close();
        let mut discarded = 0usize;
        while let Ok(outbound) = self.rx.try_recv() {
            if let Outbound::Frame(_) = outbound {
                discarded += 1;
            }
        }

        match &exit {
            SenderExit::Stopped => tracing::debug!("{}: sender stopped", self.label),
            SenderExit::WriteFailed(e) => {
                tracing::warn!("{}: write failed, sender finished: {}", self.label, e)
            }
            SenderExit::Abandoned => tracing::debug!("{}: sender abandoned", self.label),
        }
        if discarded > 0 {
            tracing::debug!("{}: {} queued frames discarded", self.label, discarded);
        }

        listener.sender_finished(exit, self.writer).await;
    }

    async fn drain(&mut self) -> SenderExit {
        while let Some(outbound) = self.rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if let Err(e) = write_frame(&mut self.writer, &frame).await {
                        return SenderExit::WriteFailed(e);
                    }
                }
                Outbound::Stop => return SenderExit::Stopped,
            }
        }
        SenderExit::Abandoned
    }
}

async fn write_frame(writer: &mut BoxedWriter, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    /// Listener that forwards every notification to a channel
    struct RecordingListener {
        tx: mpsc::UnboundedSender<SenderExit>,
    }

    #[async_trait]
    impl SenderListener for RecordingListener {
        async fn sender_finished(&self, exit: SenderExit, _writer: BoxedWriter) {
            let _ = self.tx.send(exit);
        }
    }

    fn recording_listener() -> (Arc<dyn SenderListener>, mpsc::UnboundedReceiver<SenderExit>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingListener { tx }), rx)
    }

    #[tokio::test]
    async fn test_frames_are_written_in_order_and_stop_drains() {
        // テスト項目: キューに積んだフレームが順番通りに書き込まれ、停止前の分はすべて送られる
        // given (前提条件):
        let (mut peer, socket) = duplex(1024);
        let (sender, worker) = channel(Box::new(socket), "test");
        let (listener, mut exits) = recording_listener();

        // when (操作):
        sender.send(Bytes::from_static(b"one,")).unwrap();
        sender.send(Bytes::from_static(b"two,")).unwrap();
        sender.request_stop();
        worker.spawn(listener).await.unwrap();

        // then (期待する結果):
        let mut received = [0u8; 8];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"one,two,");
        assert!(matches!(exits.recv().await, Some(SenderExit::Stopped)));
        assert!(exits.recv().await.is_none(), "exactly one notification");
    }

    #[tokio::test]
    async fn test_send_does_not_block_on_slow_peer() {
        // テスト項目: 相手が読まなくても send は即座に戻り、後からすべて届く
        // given (前提条件): a tiny in-memory pipe nobody reads yet
        let (mut peer, socket) = duplex(16);
        let (sender, worker) = channel(Box::new(socket), "slow");
        let (listener, mut exits) = recording_listener();
        worker.spawn(listener);

        // when (操作):
        for _ in 0..64 {
            sender.send(Bytes::from(vec![7u8; 256])).unwrap();
        }
        sender.request_stop();

        // then (期待する結果):
        let mut received = vec![0u8; 64 * 256];
        peer.read_exact(&mut received).await.unwrap();
        assert!(received.iter().all(|b| *b == 7));
        assert!(matches!(exits.recv().await, Some(SenderExit::Stopped)));
    }

    #[tokio::test]
    async fn test_write_failure_notifies_once() {
        // テスト項目: 書き込みに失敗した場合、終了通知は一度だけ届く
        // given (前提条件): the peer is already gone
        let (peer, socket) = duplex(64);
        drop(peer);
        let (sender, worker) = channel(Box::new(socket), "broken");
        let (listener, mut exits) = recording_listener();

        // when (操作):
        sender.send(Bytes::from_static(b"lost")).unwrap();
        sender.send(Bytes::from_static(b"also lost")).unwrap();
        worker.spawn(listener).await.unwrap();

        // then (期待する結果):
        let exit = exits.recv().await.unwrap();
        assert!(exit.is_failure());
        assert!(exits.recv().await.is_none());
        assert!(sender.is_finished());
    }

    #[tokio::test]
    async fn test_send_after_termination_is_rejected() {
        // テスト項目: 終了後の send は Terminated エラーになる
        // given (前提条件):
        let (_peer, socket) = duplex(64);
        let (sender, worker) = channel(Box::new(socket), "done");
        let (listener, _exits) = recording_listener();
        sender.request_stop();
        worker.spawn(listener).await.unwrap();

        // when (操作):
        let result = sender.send(Bytes::from_static(b"late"));

        // then (期待する結果):
        assert_eq!(result, Err(SenderError::Terminated("done".to_string())));
    }

    #[tokio::test]
    async fn test_request_stop_twice_is_harmless() {
        // テスト項目: 停止要求を二度出しても終了通知は一度だけとなる
        // given (前提条件):
        let (_peer, socket) = duplex(64);
        let (sender, worker) = channel(Box::new(socket), "twice");
        let (listener, mut exits) = recording_listener();

        // when (操作):
        sender.request_stop();
        sender.request_stop();
        worker.spawn(listener).await.unwrap();

        // then (期待する結果):
        assert!(sender.is_stop_requested());
        assert!(matches!(exits.recv().await, Some(SenderExit::Stopped)));
        assert!(exits.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_all_handles_abandons_worker() {
        // テスト項目: すべての送信ハンドルが破棄されるとワーカーは Abandoned で終了する
        // given (前提条件):
        let (_peer, socket) = duplex(64);
        let (sender, worker) = channel(Box::new(socket), "orphan");
        let (listener, mut exits) = recording_listener();

        // when (操作):
        drop(sender);
        worker.spawn(listener).await.unwrap();

        // then (期待する結果):
        assert!(matches!(exits.recv().await, Some(SenderExit::Abandoned)));
    }
}
