//! Event plumbing between producers (timer ticks, stack callbacks, other
//! tasks) and a single consuming task.
//!
//! - [`bridge::EventBridge`] - non-blocking, bounded producer side
//! - [`event_loop::EventLoop`] - wait / drain consumer side

pub mod bridge;
pub mod event_loop;

pub use bridge::EventBridge;
pub use event_loop::{EventHandler, EventLoop};
