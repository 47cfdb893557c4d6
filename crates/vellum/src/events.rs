use std::future::Future;
use std::pin::Pin;

/// Context lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The context's transaction committed.
    PostCommit,
    /// The context gave up: retries exhausted or a non-retryable failure.
    TxFailed,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::PostCommit => "POST_COMMIT",
            Event::TxFailed => "TX_FAILED",
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type HandlerFn = Box<dyn FnOnce() -> HandlerFuture + Send + 'static>;

/// Ordered, single-fire event handlers.
///
/// Handlers are awaited sequentially in registration order after the event
/// occurs, then discarded. They run outside the transaction and must not
/// touch the context's tracked state.
#[derive(Default)]
pub(crate) struct EventHandlers {
    handlers: Vec<(Event, Option<String>, HandlerFn)>,
}

impl EventHandlers {
    pub(crate) fn add<F, Fut>(&mut self, event: Event, name: Option<String>, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers
            .push((event, name, Box::new(move || Box::pin(handler()))));
    }

    /// Removes and returns the handlers registered for `event`, in order.
    pub(crate) fn take(&mut self, event: Event) -> Vec<(Option<String>, HandlerFn)> {
        let mut fired = Vec::new();
        let mut kept = Vec::new();
        for (registered, name, handler) in self.handlers.drain(..) {
            if registered == event {
                fired.push((name, handler));
            } else {
                kept.push((registered, name, handler));
            }
        }
        self.handlers = kept;
        fired
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("len", &self.handlers.len())
            .finish()
    }
}
