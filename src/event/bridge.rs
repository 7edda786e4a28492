//! Interrupt-to-task event bridge.
//!
//! A fixed-capacity FIFO in front of one consumer task. Posting copies the
//! event into the queue and wakes the consumer; it never blocks, so it is
//! usable from the debounce tick and from BLE stack callbacks alike.

use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::error::Error;

/// Bounded event queue with a reject-new overflow policy.
pub struct EventBridge<M: RawMutex, E, const N: usize> {
    queue: Channel<M, E, N>,
    dropped: AtomicUsize,
}

impl<M: RawMutex, E, const N: usize> EventBridge<M, E, N> {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Enqueue `event` without blocking.
    ///
    /// When the queue is full the new event is dropped, counted, and
    /// `Error::QueueFull` is returned. Events already queued are kept.
    pub fn post(&self, event: E) -> Result<(), Error> {
        match self.queue.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("event queue full, dropped {} so far", dropped);
                Err(Error::QueueFull)
            }
        }
    }

    /// Events rejected because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events currently waiting.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) async fn receive(&self) -> E {
        self.queue.receive().await
    }

    pub(crate) fn try_receive(&self) -> Option<E> {
        self.queue.try_receive().ok()
    }
}

impl<M: RawMutex, E, const N: usize> Default for EventBridge<M, E, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[test]
    fn post_then_receive_in_order() {
        let bridge: EventBridge<CriticalSectionRawMutex, u8, 4> = EventBridge::new();
        bridge.post(1).unwrap();
        bridge.post(2).unwrap();
        assert_eq!(bridge.len(), 2);
        assert_eq!(bridge.try_receive(), Some(1));
        assert_eq!(bridge.try_receive(), Some(2));
        assert_eq!(bridge.try_receive(), None);
    }

    #[test]
    fn full_queue_rejects_newest() {
        let bridge: EventBridge<CriticalSectionRawMutex, u8, 2> = EventBridge::new();
        bridge.post(1).unwrap();
        bridge.post(2).unwrap();
        assert_eq!(bridge.post(3), Err(Error::QueueFull));
        assert_eq!(bridge.post(4), Err(Error::QueueFull));
        assert_eq!(bridge.dropped(), 2);

        // The oldest events survive.
        assert_eq!(bridge.try_receive(), Some(1));
        assert_eq!(bridge.try_receive(), Some(2));
        assert!(bridge.is_empty());
    }

    #[test]
    fn space_frees_up_after_receive() {
        let bridge: EventBridge<CriticalSectionRawMutex, u8, 1> = EventBridge::new();
        bridge.post(1).unwrap();
        assert!(bridge.post(2).is_err());
        assert_eq!(bridge.try_receive(), Some(1));
        bridge.post(3).unwrap();
        assert_eq!(bridge.try_receive(), Some(3));
    }

    #[test]
    fn can_live_in_a_static() {
        static BRIDGE: EventBridge<CriticalSectionRawMutex, u32, 4> = EventBridge::new();
        BRIDGE.post(7).unwrap();
        assert_eq!(embassy_futures::block_on(BRIDGE.receive()), 7);
    }
}
