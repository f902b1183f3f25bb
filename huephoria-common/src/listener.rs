use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fmt::{Debug, Formatter},
    sync::{Arc, Weak},
};
use tokio_util::sync::CancellationToken;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registration<T> {
    token: CancellationToken,
    listener: Listener<T>,
}

struct RegistryInner<T> {
    next_id: u64,
    registrations: BTreeMap<u64, Registration<T>>,
}

pub struct ListenerRegistry<T> {
    inner: Arc<Mutex<RegistryInner<T>>>,
}

impl<T: 'static> ListenerRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                registrations: BTreeMap::new(),
            })),
        }
    }

    pub fn register(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let token = CancellationToken::new();

        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.registrations.insert(
                id,
                Registration {
                    token: token.clone(),
                    listener: Arc::new(listener),
                },
            );
            id
        };

        let registry = Arc::downgrade(&self.inner);
        Subscription {
            token,
            remove: Some(Box::new(move || remove_registration(&registry, id))),
        }
    }

    /// Calls every live listener with `value`.
    ///
    /// Listeners run outside the registry lock, so a listener may register or unsubscribe. A
    /// listener unsubscribed before this call starts is skipped; a call already running on
    /// another thread may still deliver to it.
    pub fn notify(&self, value: &T) {
        let live: Vec<(CancellationToken, Listener<T>)> = self
            .inner
            .lock()
            .registrations
            .values()
            .map(|registration| {
                (
                    registration.token.clone(),
                    Arc::clone(&registration.listener),
                )
            })
            .collect();

        for (token, listener) in live {
            if !token.is_cancelled() {
                listener(value);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_registration<T>(registry: &Weak<Mutex<RegistryInner<T>>>, id: u64) {
    if let Some(inner) = registry.upgrade() {
        inner.lock().registrations.remove(&id);
    }
}

impl<T: 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ListenerRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.inner.lock().registrations.len())
            .finish()
    }
}

/// Handle to a registered listener. Dropping it unsubscribes.
///
/// After `unsubscribe` returns, no `notify` started later on any thread invokes the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    token: CancellationToken,
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn cancel(&mut self) {
        self.token.cancel();
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
