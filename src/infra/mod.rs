//! Infrastructure adapters behind the engine's trait boundaries.

pub mod notify;
pub mod sessions;
pub mod store;

pub use notify::{LogDispatcher, NotificationDispatcher, NotificationEvent, RecordingDispatcher};
pub use sessions::{ChargingSession, InMemorySessions, SessionInterface, SessionStatus};
pub use store::{EntryUpdate, InMemoryStore, QueueStore, StationDerived, StatusFilter};
