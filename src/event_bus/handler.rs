use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use super::event::RunEvent;
use crate::telemetry::{PlainFormatter, TelemetryFormatter};

/// Abstraction over a subscriber that consumes full [`RunEvent`] objects.
///
/// Handlers registered for a topic run in subscription order. A handler
/// error is logged and skipped by the bus; it never aborts the emitting
/// phase or the remaining handlers.
pub trait EventHandler: Send + Sync {
    /// Handle a structured event. The handler decides how to render it.
    fn handle(&mut self, event: &RunEvent) -> IoResult<()>;
}

/// Stdout handler with optional formatting.
pub struct StdOutHandler<F: TelemetryFormatter = PlainFormatter> {
    handle: Stdout,
    formatter: F,
}

impl Default for StdOutHandler {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
            formatter: PlainFormatter::new(),
        }
    }
}

impl<F: TelemetryFormatter> StdOutHandler<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            handle: io::stdout(),
            formatter,
        }
    }
}

impl<F: TelemetryFormatter> EventHandler for StdOutHandler<F> {
    fn handle(&mut self, event: &RunEvent) -> IoResult<()> {
        let rendered = self.formatter.render_event(event).join_lines();
        self.handle.write_all(rendered.as_bytes())?;
        self.handle.flush()
    }
}

/// In-memory handler for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemoryHandler {
    entries: Arc<Mutex<Vec<RunEvent>>>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventHandler for MemoryHandler {
    fn handle(&mut self, event: &RunEvent) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based handler for forwarding to async consumers (e.g. a
/// streaming endpoint collaborator).
#[derive(Clone)]
pub struct ChannelHandler {
    tx: flume::Sender<RunEvent>,
}

impl ChannelHandler {
    /// Create a new channel handler.
    ///
    /// # Example
    /// ```no_run
    /// use turnloom::event_bus::{ChannelHandler, EventBus, EventTopic};
    ///
    /// let (tx, rx) = flume::unbounded();
    /// let bus = EventBus::default();
    /// bus.subscribe(EventTopic::CostIncurred, ChannelHandler::new(tx));
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = rx.recv_async().await {
    ///         println!("cost event: {event}");
    ///     }
    /// });
    /// ```
    pub fn new(tx: flume::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl EventHandler for ChannelHandler {
    fn handle(&mut self, event: &RunEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
