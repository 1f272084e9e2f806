//! Live order events from the backend Socket.IO channel.

pub mod client;
pub mod hub;
pub mod protocol;

pub use client::{reconnect_delay, socket_endpoint, start, LiveHandle};
pub use hub::{EventHub, LiveEvent, Subscription};
