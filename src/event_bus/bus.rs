use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::event::{EventTopic, RunEvent};
use super::handler::EventHandler;

/// Default number of events retained for late subscribers.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// In-process publish/subscribe channel for run observability.
///
/// Subscription is per [`EventTopic`]; multiple handlers per topic are
/// allowed and run in subscription order. A handler failure is isolated —
/// logged and skipped — and never aborts the emitting phase or the other
/// handlers.
///
/// A bounded history buffer retains the last N events so a late subscriber
/// (e.g. a reconnecting stream client) can catch up via [`replay`](Self::replay).
/// [`stream`](Self::stream) hands out a live `flume` receiver that forwards
/// every emitted event verbatim.
///
/// # Examples
///
/// ```rust
/// use turnloom::event_bus::{EventBus, EventKind, EventTopic, MemoryHandler, RunEvent};
///
/// let bus = EventBus::default();
/// let captured = MemoryHandler::new();
/// bus.subscribe(EventTopic::TurnStarted, captured.clone());
///
/// bus.emit(RunEvent::new("run-1", EventKind::TurnStarted { turn: 1 }));
/// bus.emit(RunEvent::new("run-1", EventKind::TurnCompleted { turn: 1 }));
///
/// // Only the subscribed topic reached the handler...
/// assert_eq!(captured.snapshot().len(), 1);
/// // ...but the history retains everything.
/// assert_eq!(bus.replay().len(), 2);
/// ```
pub struct EventBus {
    handlers: Mutex<FxHashMap<EventTopic, Vec<Box<dyn EventHandler>>>>,
    history: Mutex<VecDeque<RunEvent>>,
    history_capacity: usize,
    stream_tx: flume::Sender<RunEvent>,
    stream_rx: flume::Receiver<RunEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus retaining up to `history_capacity` events for replay.
    /// A capacity of 0 falls back to the default.
    pub fn new(history_capacity: usize) -> Self {
        let history_capacity = if history_capacity == 0 {
            DEFAULT_HISTORY_CAPACITY
        } else {
            history_capacity
        };
        // The live stream is bounded to the same depth; when no consumer
        // drains it, the oldest events are shed rather than growing without
        // bound.
        let (stream_tx, stream_rx) = flume::bounded(history_capacity);
        Self {
            handlers: Mutex::new(FxHashMap::default()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            stream_tx,
            stream_rx,
        }
    }

    /// Register a handler for one topic. Handlers for the same topic run in
    /// the order they were subscribed.
    pub fn subscribe<H: EventHandler + 'static>(&self, topic: EventTopic, handler: H) {
        self.handlers
            .lock()
            .entry(topic)
            .or_default()
            .push(Box::new(handler));
    }

    /// Register a handler for every topic.
    pub fn subscribe_all<H: EventHandler + Clone + 'static>(&self, handler: H) {
        for topic in ALL_TOPICS {
            self.subscribe(topic, handler.clone());
        }
    }

    /// Publish an event: record it in the history ring, forward it to the
    /// live stream, and dispatch it to the topic's handlers in order.
    pub fn emit(&self, event: RunEvent) {
        {
            let mut history = self.history.lock();
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Shed the oldest stream entry instead of blocking the emitter when
        // no consumer keeps up.
        if self.stream_tx.is_full() {
            let _ = self.stream_rx.try_recv();
        }
        let _ = self.stream_tx.try_send(event.clone());

        let mut handlers = self.handlers.lock();
        if let Some(registered) = handlers.get_mut(&event.topic()) {
            for handler in registered.iter_mut() {
                if let Err(error) = handler.handle(&event) {
                    tracing::warn!(
                        run_id = %event.run_id,
                        topic = %event.topic(),
                        %error,
                        "event handler failed; skipping"
                    );
                }
            }
        }
    }

    /// The buffered events, oldest first.
    pub fn replay(&self) -> Vec<RunEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// A live receiver that observes every event emitted after this call
    /// (plus whatever is still buffered in the stream channel).
    pub fn stream(&self) -> flume::Receiver<RunEvent> {
        self.stream_rx.clone()
    }

    /// Configured history capacity.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }
}

const ALL_TOPICS: [EventTopic; 11] = [
    EventTopic::TurnStarted,
    EventTopic::TurnCompleted,
    EventTopic::PhaseCompleted,
    EventTopic::PhaseSkipped,
    EventTopic::CostIncurred,
    EventTopic::CreditWarning,
    EventTopic::ValidationIssue,
    EventTopic::DecisionRecorded,
    EventTopic::ScenarioHalted,
    EventTopic::ScenarioFinished,
    EventTopic::ScenarioFailed,
];
