//! Result classification and delivery
//!
//! - `classify`: result shapes and message delivery
//! - `session`: async sessions that stream messages over a channel

pub mod classify;
pub mod session;

pub use classify::{classify, Delivery, QueryResult};
