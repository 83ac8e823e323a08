//! Terminal transport: attachments are local files and the status message
//! is an indicatif spinner.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use sprocket_core::transport::TransportResult;
use sprocket_core::{Attachment, MessageRef, Transport, TransportError};
use std::io::ErrorKind;
use std::sync::Mutex;
use std::time::Duration;

/// Console stand-in for a chat transport.
#[derive(Default)]
pub struct ConsoleTransport {
    bar: Mutex<Option<ProgressBar>>,
    last: Mutex<Option<String>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new status line.
    pub fn begin(&self) {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }

    /// Clears the status line and returns its final text.
    pub fn finish(&self) -> Option<String> {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut slot| slot.take()) {
            bar.finish_and_clear();
        }
        self.last.lock().ok().and_then(|mut last| last.take())
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn download_attachment(&self, attachment: &Attachment) -> TransportResult<Vec<u8>> {
        tokio::fs::read(&attachment.reference).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::NotFound(attachment.reference.clone()),
            _ => TransportError::Download(format!("{}: {e}", attachment.reference)),
        })
    }

    async fn edit_status_message(&self, _message: &MessageRef, text: &str) -> TransportResult<()> {
        let mut last = self.last.lock().map_err(|_| TransportError::Other("console state poisoned".into()))?;
        if last.as_deref() == Some(text) {
            return Err(TransportError::NotModified);
        }
        *last = Some(text.to_string());
        if let Some(bar) = self.bar.lock().ok().and_then(|slot| slot.clone()) {
            bar.set_message(text.lines().next().unwrap_or_default().to_string());
        }
        Ok(())
    }

    async fn delete_message(&self, _message: &MessageRef) -> TransportResult<()> {
        self.finish();
        Ok(())
    }
}
