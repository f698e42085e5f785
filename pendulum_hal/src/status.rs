//! Queued status display.
//!
//! [`QueuedStatus`] is the producer side: `write`/`refresh` enqueue into a
//! bounded channel and return immediately, dropping the message when the
//! queue is full. [`StatusRenderer`] is the consumer: a low-priority task
//! that keeps a small screen of text cells and emits the composed screen
//! through `tracing` on every refresh.

use heapless::Vec as FixedVec;
use pendulum_common::status::{StatusSink, StatusText, status_text};
use pendulum_common::task::{self, Pacing, PeriodicTask, TaskError, TaskHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;
use tracing::{debug, warn};

/// Messages the queue holds before producers start dropping.
pub const STATUS_QUEUE_CAPACITY: usize = 64;

/// Distinct text cells kept on screen.
pub const SCREEN_CELLS: usize = 16;

/// Renderer poll interval.
const RENDER_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
enum StatusMsg {
    Write { row: u8, col: u8, text: StatusText },
    Refresh,
}

/// Non-blocking [`StatusSink`] backed by a bounded queue.
#[derive(Debug, Clone)]
pub struct QueuedStatus {
    tx: SyncSender<StatusMsg>,
    dropped: Arc<AtomicU64>,
}

impl QueuedStatus {
    /// A queue of `capacity` messages and its unstarted renderer.
    pub fn new(capacity: usize) -> (Self, StatusRenderer) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let sink = Self {
            tx,
            dropped: Arc::clone(&dropped),
        };
        let renderer = StatusRenderer {
            rx,
            screen: FixedVec::new(),
            last_screen: None,
            refreshes: 0,
            dropped,
        };
        (sink, renderer)
    }

    /// A default-sized queue with its renderer already running.
    pub fn spawn() -> Result<(Self, TaskHandle), TaskError> {
        let (sink, renderer) = Self::new(STATUS_QUEUE_CAPACITY);
        let handle = task::spawn(renderer)?;
        Ok((sink, handle))
    }

    /// Messages dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn offer(&self, msg: StatusMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl StatusSink for QueuedStatus {
    fn write(&self, row: u8, col: u8, text: &str) {
        self.offer(StatusMsg::Write {
            row,
            col,
            text: status_text(format_args!("{text}")),
        });
    }

    fn refresh(&self) {
        self.offer(StatusMsg::Refresh);
    }
}

/// Consumer side of [`QueuedStatus`].
pub struct StatusRenderer {
    rx: Receiver<StatusMsg>,
    screen: FixedVec<(u8, u8, StatusText), SCREEN_CELLS>,
    last_screen: Option<String>,
    refreshes: u64,
    dropped: Arc<AtomicU64>,
}

impl StatusRenderer {
    /// Apply every queued message. Returns the number handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.rx.try_recv() {
            handled += 1;
            match msg {
                StatusMsg::Write { row, col, text } => self.put(row, col, text),
                StatusMsg::Refresh => self.render(),
            }
        }
        handled
    }

    /// Screen text as of the last refresh.
    pub fn last_screen(&self) -> Option<&str> {
        self.last_screen.as_deref()
    }

    fn put(&mut self, row: u8, col: u8, text: StatusText) {
        if let Some(cell) = self
            .screen
            .iter_mut()
            .find(|(r, c, _)| *r == row && *c == col)
        {
            cell.2 = text;
            return;
        }
        if self.screen.push((row, col, text)).is_err() {
            warn!("status screen full, cell ({row}, {col}) ignored");
        }
    }

    fn render(&mut self) {
        self.screen.sort_unstable_by_key(|(r, c, _)| (*r, *c));
        let composed = self
            .screen
            .iter()
            .map(|(_, _, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        self.refreshes += 1;
        debug!(target: "status", "{composed}");
        self.last_screen = Some(composed);
    }
}

impl PeriodicTask for StatusRenderer {
    fn name(&self) -> &str {
        "status"
    }

    fn step(&mut self) {
        self.drain();
    }

    fn pacing(&self) -> Pacing {
        Pacing::Sleep(RENDER_INTERVAL)
    }

    fn on_stop(&mut self) {
        self.drain();
        debug!(
            "status renderer stopped ({} refreshes, {} dropped)",
            self.refreshes,
            self.dropped.load(Ordering::Relaxed)
        );
    }
}
