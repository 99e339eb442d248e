// ── Ordered handler registry ──
//
// Copy-on-write list of callbacks. Dispatch walks an `Arc` snapshot of the
// list, so handlers may subscribe or unsubscribe from inside a callback
// without deadlocking. Registration order is dispatch order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwap;

pub(crate) type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) struct HandlerRegistry<T: 'static> {
    handlers: ArcSwap<Vec<(u64, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T: 'static> HandlerRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Append a handler and return a [`Subscription`] that removes it.
    pub(crate) fn register(self: &Arc<Self>, handler: Handler<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push((id, Arc::clone(&handler)));
            next
        });

        let strong: Arc<dyn Unregister> = self.clone();
        Subscription {
            registry: Arc::downgrade(&strong),
            id,
        }
    }

    /// Invoke every handler, in registration order.
    pub(crate) fn dispatch(&self, value: &T) {
        let handlers = self.handlers.load_full();
        for (_, handler) in handlers.iter() {
            handler(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.load().len()
    }
}

// ── Ordered delivery ─────────────────────────────────────────────────

/// A published value tagged with its position in the publish order.
#[derive(Debug, Clone)]
pub(crate) struct Sequenced<T> {
    pub(crate) seq: u64,
    pub(crate) value: T,
}

/// Wrap `handler` so it only sees strictly increasing sequence numbers.
///
/// Calls are serialized per handler: a registration-time replay racing a
/// live dispatch can never land after the newer value.
pub(crate) fn in_order<T, F>(handler: F) -> Handler<Sequenced<T>>
where
    T: 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let delivered: Mutex<Option<u64>> = Mutex::new(None);
    Arc::new(move |item: &Sequenced<T>| {
        let mut last = delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_none_or(|seen| item.seq > seen) {
            *last = Some(item.seq);
            handler(&item.value);
        }
    })
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

impl<T: 'static> Unregister for HandlerRegistry<T> {
    fn unregister(&self, id: u64) {
        self.handlers.rcu(|current| {
            current
                .iter()
                .filter(|(existing, _)| *existing != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

// ── Subscription ─────────────────────────────────────────────────────

/// Registration handle returned by
/// [`Transport::on_message`](super::Transport::on_message) and
/// [`Transport::on_connection_change`](super::Transport::on_connection_change).
///
/// [`unsubscribe`](Self::unsubscribe) is idempotent and remains safe after
/// the transport has been shut down or dropped. Dropping the handle
/// unsubscribes as well.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    registry: Weak<dyn Unregister>,
    id: u64,
}

impl Subscription {
    /// Remove the handler. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
