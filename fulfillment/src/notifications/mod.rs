//! Notification dispatch
//!
//! Decides per user preference which channels an event goes out on, renders
//! the event's template and hands it to the channel transports. Every
//! dispatch leaves one record in the user's in-app feed.

pub mod dispatcher;
pub mod storage;
pub mod templates;
pub mod transport;

pub use dispatcher::{FeedAction, NotificationDispatcher, Transports};
pub use storage::NotificationStorage;
pub use templates::RenderedMessage;
pub use transport::{LogTransport, Transport, TransportError};
