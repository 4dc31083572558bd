//! Dedicated writer task for outbound frames.
//!
//! All outbound traffic of a connection, Calls and responses alike, goes
//! through one writer task that owns the transport's sink. Frames are queued
//! on an mpsc channel as encoded text, so whole frames are written one at a
//! time and never interleave.
//!
//! # Architecture
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► mpsc::Sender<String> ─► Writer Task ─► Sink<String>
//! call()    ─┘
//! ```
//!
//! The task feeds every frame that is already queued (up to a batch limit)
//! before flushing once, and releases the batch's backpressure slots after
//! the flush.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::backpressure::BackpressureController;
use crate::error::{OcppError, Result};
use crate::transport::TransportError;

/// Default maximum queued frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames fed before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<String>,
    backpressure: BackpressureController,
    shutdown: Arc<Notify>,
}

impl WriterHandle {
    /// Queue an encoded frame.
    ///
    /// Waits while backpressure is active, up to the configured timeout.
    ///
    /// # Errors
    ///
    /// [`OcppError::BackpressureTimeout`] if no slot frees up in time,
    /// [`OcppError::ConnectionClosed`] if the writer has stopped.
    pub async fn send(&self, frame: String) -> Result<()> {
        if self.tx.is_closed() {
            return Err(OcppError::ConnectionClosed);
        }

        self.backpressure.reserve().await?;

        self.tx.send(frame).await.map_err(|_| {
            self.backpressure.release();
            OcppError::ConnectionClosed
        })
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: String) -> Result<()> {
        self.backpressure.try_reserve()?;

        self.tx.try_send(frame).map_err(|e| {
            self.backpressure.release();
            match e {
                mpsc::error::TrySendError::Full(_) => OcppError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => OcppError::ConnectionClosed,
            }
        })
    }

    /// Ask the writer task to write what is already queued, close the sink and stop.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// True once the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.is_active()
    }

    /// Get current queued frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.backpressure.pending_count()
    }
}

/// Spawn the writer task over a transport sink.
///
/// Returns the handle and the task, which resolves to the first sink error
/// or `Ok(())` after a clean shutdown.
pub fn spawn_writer_task<S>(sink: S, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    S: Sink<String, Error = TransportError> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let backpressure =
        BackpressureController::with_timeout(config.max_pending_frames, config.backpressure_timeout);
    let shutdown = Arc::new(Notify::new());

    let handle = WriterHandle {
        tx,
        backpressure: backpressure.clone(),
        shutdown: shutdown.clone(),
    };

    let task = tokio::spawn(writer_loop(rx, sink, backpressure, shutdown));

    (handle, task)
}

async fn writer_loop<S>(
    mut rx: mpsc::Receiver<String>,
    mut sink: S,
    backpressure: BackpressureController,
    shutdown: Arc<Notify>,
) -> Result<()>
where
    S: Sink<String, Error = TransportError> + Unpin,
{
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.notified() => {
                rx.close();
                let mut written = 0;
                while let Ok(frame) = rx.try_recv() {
                    sink.feed(frame).await?;
                    written += 1;
                }
                sink.flush().await?;
                backpressure.release_many(written);
                sink.close().await?;
                tracing::debug!(written, "writer stopped");
                return Ok(());
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => {
                    sink.close().await?;
                    return Ok(());
                }
            },
        };

        let mut batch = 1;
        sink.feed(first).await?;
        while batch < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    sink.feed(frame).await?;
                    batch += 1;
                }
                Err(_) => break,
            }
        }
        sink.flush().await?;

        backpressure.release_many(batch);
    }
}
