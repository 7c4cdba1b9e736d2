//! Bounded background queue for history saves.
//!
//! Routing decisions made by the LLM layer are written back to episodic
//! memory off the request path. A single worker drains the queue; each save
//! runs under its own deadline and failures are only logged. When the queue
//! is full new saves are dropped rather than blocking the caller.

use cascade_core::{HistoryMatcher, Intent, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A pending routing-decision save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub user_id: UserId,
    pub input: String,
    pub intent: Intent,
}

/// Handle to the history-save worker.
pub struct HistoryWriter {
    tx: Mutex<Option<mpsc::Sender<SaveRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl HistoryWriter {
    /// Start the worker on the current Tokio runtime.
    ///
    /// Outside a runtime no worker is started and every enqueue is dropped.
    pub fn spawn(matcher: Arc<HistoryMatcher>, capacity: usize, save_timeout: Duration) -> Self {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no Tokio runtime; history saves are disabled");
            return Self::disabled();
        };

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = runtime.spawn(run_worker(matcher, rx, save_timeout));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        }
    }

    fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            worker: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a save without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, request: SaveRequest) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    user_id = request.user_id,
                    intent = %request.intent,
                    "history save queue full, dropping save"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Saves dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting saves. With `drain`, wait for queued saves to finish;
    /// otherwise abort the worker and discard them.
    pub async fn shutdown(&self, drain: bool) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(worker) = worker else {
            return;
        };
        if drain {
            if let Err(e) = worker.await {
                warn!(error = %e, "history save worker failed");
            }
        } else {
            worker.abort();
            debug!("history save worker aborted");
        }
    }
}

async fn run_worker(
    matcher: Arc<HistoryMatcher>,
    mut rx: mpsc::Receiver<SaveRequest>,
    save_timeout: Duration,
) {
    while let Some(request) = rx.recv().await {
        let save = matcher.save_decision(request.user_id, &request.input, request.intent, true);
        match tokio::time::timeout(save_timeout, save).await {
            Ok(Ok(())) => debug!(
                user_id = request.user_id,
                intent = %request.intent,
                "saved routing decision"
            ),
            Ok(Err(e)) => warn!(error = %e, "failed to save routing decision"),
            Err(_) => warn!(
                timeout_secs = save_timeout.as_secs(),
                "saving routing decision timed out"
            ),
        }
    }
    debug!("history save worker stopped");
}
