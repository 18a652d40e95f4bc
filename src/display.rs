//! Shared character display.
//!
//! One task owns the [`CharacterDisplay`] and applies requests in arrival
//! order; every other component talks to it through a cloneable
//! [`DisplayHandle`]. Lines are cut to the display width before they reach
//! the driver, never wrapped.

use std::sync::{Arc, Mutex};

use log::{debug, error, warn};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    error::{DispenserError, Result},
    hardware::CharacterDisplay,
};

const REQUEST_QUEUE: usize = 32;

/// Truncates `text` to at most `width` characters.
pub fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

#[derive(Debug)]
enum DisplayRequest {
    Show { line1: String, line2: String },
    Clear,
    /// Acknowledged once every earlier request has been applied.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable sender side of the display task.
#[derive(Debug, Clone)]
pub struct DisplayHandle {
    tx: mpsc::Sender<DisplayRequest>,
    width: usize,
}

impl DisplayHandle {
    /// Queues a two-line screen.
    pub async fn show(&self, line1: impl AsRef<str>, line2: impl AsRef<str>) {
        let request = DisplayRequest::Show {
            line1: truncate(line1.as_ref(), self.width),
            line2: truncate(line2.as_ref(), self.width),
        };
        self.send(request).await;
    }

    /// Shows a transient error banner.
    pub async fn show_error(&self, err: &DispenserError) {
        self.show("Error:", err.display_text()).await;
    }

    /// Waits until everything queued so far has reached the driver.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(DisplayRequest::Flush(tx)).await;
        let _ = rx.await;
    }

    async fn send(&self, request: DisplayRequest) {
        if self.tx.send(request).await.is_err() {
            debug!("Display task has stopped; dropping request");
        }
    }
}

/// Owner of the physical display.
pub struct DisplayService {
    handle: DisplayHandle,
    task: JoinHandle<()>,
}

impl DisplayService {
    /// Spawns the display task.
    pub fn spawn(display: Box<dyn CharacterDisplay>) -> Self {
        let width = display.columns();
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(run_display(Arc::new(Mutex::new(display)), rx));

        Self {
            handle: DisplayHandle { tx, width },
            task,
        }
    }

    pub fn handle(&self) -> DisplayHandle {
        self.handle.clone()
    }

    /// Clears the screen and stops the task once queued requests are done.
    pub async fn shutdown(self) {
        let _ = self.handle.tx.send(DisplayRequest::Clear).await;
        let _ = self.handle.tx.send(DisplayRequest::Shutdown).await;
        if let Err(e) = self.task.await {
            error!("Display task panicked: {e}");
        }
    }
}

async fn run_display(
    display: Arc<Mutex<Box<dyn CharacterDisplay>>>,
    mut rx: mpsc::Receiver<DisplayRequest>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            DisplayRequest::Show { line1, line2 } => {
                apply(&display, move |d| d.show(&line1, &line2)).await;
            }
            DisplayRequest::Clear => apply(&display, |d| d.clear()).await,
            DisplayRequest::Flush(ack) => {
                let _ = ack.send(());
            }
            DisplayRequest::Shutdown => break,
        }
    }
    debug!("Display task finished");
}

/// Runs one driver call off the async workers; failures are logged only,
/// the next request overwrites the screen anyway.
async fn apply<F>(display: &Arc<Mutex<Box<dyn CharacterDisplay>>>, op: F)
where
    F: FnOnce(&mut dyn CharacterDisplay) -> Result<()> + Send + 'static,
{
    let display = display.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut guard = display
            .lock()
            .map_err(|_| DispenserError::hardware("display lock poisoned"))?;
        op(&mut **guard)
    })
    .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("LCD display error: {e}"),
        Err(e) => error!("LCD task failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimulatedDisplay;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("CLOSED:", 16), "CLOSED:");
    }

    #[test]
    fn truncate_cuts_to_exact_width() {
        assert_eq!(truncate("*** DISPENSED ***", 16), "*** DISPENSED **");
    }

    proptest! {
        #[test]
        fn truncate_never_exceeds_width(text in ".{0,64}", width in 1usize..32) {
            let out = truncate(&text, width);
            prop_assert_eq!(out.chars().count(), text.chars().count().min(width));
            prop_assert!(text.starts_with(&out));
        }
    }

    #[tokio::test]
    async fn requests_are_applied_in_order_and_truncated() {
        let display = SimulatedDisplay::new(16);
        let service = DisplayService::spawn(Box::new(display.clone()));
        let handle = service.handle();

        handle.show("MediMate System", "Initializing...").await;
        handle.show("A very long first line", "and second").await;
        handle.flush().await;

        assert_eq!(
            display.frames(),
            vec![
                ("MediMate System".to_string(), "Initializing...".to_string()),
                ("A very long firs".to_string(), "and second".to_string()),
            ]
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn error_banner_uses_error_text() {
        let display = SimulatedDisplay::new(16);
        let service = DisplayService::spawn(Box::new(display.clone()));
        let handle = service.handle();

        handle
            .show_error(&DispenserError::transport("connection refused"))
            .await;
        handle.flush().await;

        assert_eq!(
            display.frames(),
            vec![("Error:".to_string(), "connection refus".to_string())]
        );
        service.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_clears_and_later_requests_are_dropped() {
        let display = SimulatedDisplay::new(16);
        let service = DisplayService::spawn(Box::new(display.clone()));
        let handle = service.handle();

        handle.show("System Off", "Goodbye!").await;
        service.shutdown().await;
        handle.show("late", "write").await;

        assert!(display.is_cleared());
        assert!(!display.has_shown("late"));
    }

    #[tokio::test]
    async fn concurrent_writers_never_interleave_lines() {
        let display = SimulatedDisplay::new(16);
        let service = DisplayService::spawn(Box::new(display.clone()));

        let mut writers = Vec::new();
        for i in 0..8 {
            let handle = service.handle();
            writers.push(tokio::spawn(async move {
                handle.show(format!("writer {i}"), format!("line {i}")).await;
            }));
        }
        for w in writers {
            w.await.unwrap();
        }
        service.handle().flush().await;

        let frames = display.frames();
        assert_eq!(frames.len(), 8);
        for (l1, l2) in frames {
            assert_eq!(l1.replace("writer", "line"), l2);
        }
        service.shutdown().await;
    }
}
