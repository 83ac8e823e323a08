//! Animated status messages for long-running chat commands.
//!
//! A [`ProgressGuard`] owns the animation task. Stopping it joins the task;
//! dropping it aborts the task, so every exit path of the caller ends the
//! animation.

use crate::transport::{MessageRef, Transport, TransportError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default animation frames.
pub const DEFAULT_FRAMES: [&str; 4] = ["/", "-", "\\", "|"];

/// Default delay between frames.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(300);

/// Edits a status message with a spinner while work runs.
#[derive(Clone)]
pub struct ProgressReporter {
    transport: Arc<dyn Transport>,
    frames: Arc<[String]>,
    interval: Duration,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("frames", &self.frames)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Creates a reporter with the default frames and interval.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            frames: DEFAULT_FRAMES.iter().map(|f| (*f).to_string()).collect(),
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Overrides the animation frames. An empty list keeps the defaults.
    #[must_use]
    pub fn with_frames(mut self, frames: Vec<String>) -> Self {
        if !frames.is_empty() {
            self.frames = frames.into();
        }
        self
    }

    /// Overrides the delay between frames.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts animating `message` with `label` followed by a frame.
    pub fn start(&self, message: MessageRef, label: impl Into<String>) -> ProgressGuard {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let transport = Arc::clone(&self.transport);
        let frames = Arc::clone(&self.frames);
        let interval = self.interval;
        let label = label.into();

        let handle = tokio::spawn(async move {
            for frame in frames.iter().cycle() {
                match transport.edit_status_message(&message, &format!("{label} {frame}")).await {
                    Ok(()) | Err(TransportError::NotModified) => {}
                    Err(e) => {
                        warn!(error = %e, "Progress animation stopped");
                        break;
                    }
                }

                tokio::select! {
                    _ = &mut stop_rx => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            debug!(label = %label, "Progress animation finished");
        });

        ProgressGuard { stop: Some(stop_tx), handle: Some(handle) }
    }

    /// Runs `work` while animating `message`.
    pub async fn track<F>(&self, message: MessageRef, label: impl Into<String>, work: F) -> F::Output
    where
        F: Future,
    {
        let guard = self.start(message, label);
        let output = work.await;
        guard.stop().await;
        output
    }
}

/// Handle to a running animation.
#[derive(Debug)]
pub struct ProgressGuard {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressGuard {
    /// Stops the animation and waits until no further edit can happen.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
