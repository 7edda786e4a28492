//! Single-consumer application event loop.
//!
//! The owning task alternates between waiting for the first event and
//! draining everything else that queued up meanwhile:
//!
//! ```text
//! WaitingForEvent --event--> DrainingQueue --empty--> WaitingForEvent
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::EventBridge;

/// Something that reacts to events of type `E`.
///
/// Handlers are free to await (e.g. a BLE read) - the loop does not pull
/// the next event until the handler returns.
#[allow(async_fn_in_trait)]
pub trait EventHandler<E> {
    async fn handle(&mut self, event: E);
}

/// Consumer side of an [`EventBridge`].
pub struct EventLoop<'a, M: RawMutex, E, const N: usize> {
    bridge: &'a EventBridge<M, E, N>,
}

impl<'a, M: RawMutex, E, const N: usize> EventLoop<'a, M, E, N> {
    pub fn new(bridge: &'a EventBridge<M, E, N>) -> Self {
        Self { bridge }
    }

    /// Suspend until an event is available and take it.
    pub async fn wait(&self) -> E {
        self.bridge.receive().await
    }

    /// Handle every queued event in FIFO order without suspending on the
    /// queue. Returns the number of events handled.
    pub async fn drain<H: EventHandler<E>>(&self, handler: &mut H) -> usize {
        let mut handled = 0;
        while let Some(event) = self.bridge.try_receive() {
            handler.handle(event).await;
            handled += 1;
        }
        handled
    }

    /// One wait / drain cycle. Returns the number of events handled.
    pub async fn run_once<H: EventHandler<E>>(&self, handler: &mut H) -> usize {
        let first = self.wait().await;
        handler.handle(first).await;
        1 + self.drain(handler).await
    }

    /// Run forever.
    pub async fn run<H: EventHandler<E>>(&self, handler: &mut H) -> ! {
        loop {
            let handled = self.run_once(handler).await;
            trace!("event loop handled {} events", handled);
        }
    }
}
