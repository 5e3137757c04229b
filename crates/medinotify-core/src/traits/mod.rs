//! Seams to the external collaborators: record store, delayed job queue, delivery transport.

pub mod queue;
pub mod store;
pub mod transport;

pub use queue::JobQueue;
pub use store::{NotificationFilter, NotificationStore, SortOrder};
pub use transport::DeliveryTransport;
