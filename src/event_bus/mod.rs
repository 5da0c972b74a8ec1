//! Event bus utilities: typed run events, per-topic subscription, and
//! handlers for stdout, memory, and channel forwarding.
//!
//! The module is organised around [`EventBus`], which dispatches
//! [`RunEvent`]s to [`EventHandler`]s registered per [`EventTopic`] and
//! keeps a bounded replay history for late subscribers.

pub mod bus;
pub mod event;
pub mod handler;

pub use bus::{DEFAULT_HISTORY_CAPACITY, EventBus};
pub use event::{EventKind, EventTopic, RunEvent};
pub use handler::{ChannelHandler, EventHandler, MemoryHandler, StdOutHandler};
