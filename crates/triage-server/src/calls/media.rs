//! Per-call bounded media queue.
//!
//! Single producer (the `/ws/audio` read loop), single consumer (the triage
//! task). A full queue makes the producer wait instead of dropping data, so
//! a stalled pipeline throttles the caller's upload through TCP backpressure.

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// One queued ingestion item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaItem {
    /// Raw PCM audio chunk.
    Audio(Bytes),
    /// Base64 JPEG camera frame, as sent by the caller.
    Frame(String),
    /// No more items will follow; the consumer must stop.
    EndOfStream,
}

impl MediaItem {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::Frame(_) => "frame",
            Self::EndOfStream => "end_of_stream",
        }
    }
}

/// The queue has been discarded; the item was not accepted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("media queue closed")]
pub struct QueueClosed;

/// Bounded FIFO of [`MediaItem`]s for one call.
pub struct MediaQueue {
    tx: mpsc::Sender<MediaItem>,
    rx: Mutex<Option<mpsc::Receiver<MediaItem>>>,
    capacity: usize,
}

impl MediaQueue {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue an item, waiting while the queue is full.
    pub async fn push(&self, item: MediaItem) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    /// Hand the consuming end to the triage task. Returns `None` after the
    /// first call or after [`discard`](Self::discard).
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<MediaItem>> {
        self.rx.lock().take()
    }

    /// Enqueue the end-of-stream marker without waiting.
    ///
    /// Returns `false` when the queue is full or closed; the consumer is then
    /// stopped by cancellation instead.
    pub fn signal_end(&self) -> bool {
        self.tx.try_send(MediaItem::EndOfStream).is_ok()
    }

    /// Drop any receiver still held here, discarding queued items and
    /// failing every pending and future [`push`](Self::push).
    pub fn discard(&self) {
        drop(self.rx.lock().take());
    }

    /// Whether the consuming end is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for MediaQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
