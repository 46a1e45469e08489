//! Tokio-backed transport.
//!
//! Envelopes travel through a bounded `tokio::sync::mpsc` channel to a
//! single dispatcher task, which is the only context that ever calls
//! `dispatch`. Enqueueing uses `try_send`, so publishing never waits for
//! queue space; a full queue is reported to the publisher instead.

use evtbus_core::{Backend, BackendError, Dispatcher, EnqueueError, Envelope};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::TokioBackendConfig;
use crate::heartbeat::{Heartbeat, HeartbeatStats};

/// Queue-backed backend with a dispatcher task on the tokio runtime
#[derive(Debug)]
pub struct TokioBackend {
    config: TokioBackendConfig,
    sender: OnceLock<mpsc::Sender<Envelope>>,
    task: Mutex<Option<JoinHandle<()>>>,
    heartbeat: Arc<Heartbeat>,
    shutdown: Arc<Notify>,
    closed: AtomicBool,
}

impl TokioBackend {
    /// Create a backend with default configuration
    pub fn new() -> Self {
        Self::with_config(TokioBackendConfig::default())
    }

    /// Create a backend with custom configuration
    pub fn with_config(config: TokioBackendConfig) -> Self {
        Self {
            config,
            sender: OnceLock::new(),
            task: Mutex::new(None),
            heartbeat: Arc::new(Heartbeat::default()),
            shutdown: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &TokioBackendConfig {
        &self.config
    }

    /// Liveness counters of the dispatcher task
    pub fn stats(&self) -> HeartbeatStats {
        self.heartbeat.stats()
    }

    /// Check if the dispatcher task is running
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of envelopes waiting in the queue
    pub fn pending(&self) -> usize {
        self.sender
            .get()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    /// Stop the dispatcher task and wait for it to finish.
    ///
    /// Envelopes still queued are dropped. Publishing afterwards reports
    /// [`EnqueueError::Closed`]; the backend cannot be restarted.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown.notify_one();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(
                    "Dispatcher task {} ended abnormally: {}",
                    self.config.task_name,
                    err
                );
            }
        }
    }

    fn send(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EnqueueError::Closed);
        }
        let sender = self.sender.get().ok_or(EnqueueError::NotReady)?;
        sender.try_send(envelope).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

impl Default for TokioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for TokioBackend {
    fn init(&self, dispatcher: Dispatcher) -> Result<(), BackendError> {
        self.config
            .validate()
            .map_err(|err| BackendError::other(err.to_string()))?;
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::other("backend has been shut down"));
        }

        let mut task = self.task.lock();
        if self.sender.get().is_some() {
            tracing::debug!("Dispatcher task {} already running", self.config.task_name);
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BackendError::NoRuntime)?;
        let (sender, receiver) = mpsc::channel(self.config.queue_depth);

        *task = Some(runtime.spawn(run_dispatcher(
            receiver,
            dispatcher,
            self.heartbeat.clone(),
            self.shutdown.clone(),
            self.config.heartbeat(),
            self.config.task_name.clone(),
        )));
        // Only ever set here, under the task lock.
        let _ = self.sender.set(sender);

        tracing::debug!(
            "Dispatcher task {} started (queue depth {})",
            self.config.task_name,
            self.config.queue_depth
        );
        Ok(())
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        self.send(envelope)
    }

    fn enqueue_from_isr(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        // try_send neither blocks nor takes the task lock.
        self.send(envelope)
    }
}

async fn run_dispatcher(
    mut receiver: mpsc::Receiver<Envelope>,
    dispatcher: Dispatcher,
    heartbeat: Arc<Heartbeat>,
    shutdown: Arc<Notify>,
    period: Option<Duration>,
    name: String,
) {
    loop {
        let received = match period {
            Some(period) => tokio::select! {
                _ = shutdown.notified() => break,
                received = tokio::time::timeout(period, receiver.recv()) => match received {
                    Ok(Some(envelope)) => Some(envelope),
                    Ok(None) => break,
                    Err(_) => None,
                },
            },
            None => tokio::select! {
                _ = shutdown.notified() => break,
                received = receiver.recv() => match received {
                    Some(envelope) => Some(envelope),
                    None => break,
                },
            },
        };

        if let Some(envelope) = received {
            if !dispatcher.is_attached() {
                break;
            }
            dispatcher.dispatch(&envelope);
            heartbeat.on_dispatch();
        }
        if period.is_some() {
            heartbeat.tick();
        }
    }

    tracing::debug!("Dispatcher task {} stopped", name);
}
