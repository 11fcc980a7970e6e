//! Task lifecycle
//!
//! Creation, asynchronous execution, status transitions and per-task
//! subscriber fan-out.

pub mod executor;
pub mod manager;

pub use executor::{panic_message, EchoExecutor, TaskExecutor};
pub use manager::{Subscription, TaskManager, DEFAULT_SUBSCRIBER_CAPACITY, MIN_POLL_INTERVAL};
