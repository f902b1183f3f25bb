use huephoria_common::{
    backend::AuthProvider,
    listener::{ListenerRegistry, Subscription},
    model::{Id, user::UserMarker},
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// The signed-in identity of this client.
///
/// Clones share the same session.
#[derive(Clone, Debug, Default)]
pub struct AuthSession {
    inner: Arc<AuthInner>,
}

#[derive(Debug, Default)]
struct AuthInner {
    current: RwLock<Option<Id<UserMarker>>>,
    changes: ListenerRegistry<Option<Id<UserMarker>>>,
}

impl AuthSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(uid: Id<UserMarker>) -> Self {
        let session = Self::new();
        *session.inner.current.write() = Some(uid);
        session
    }

    pub fn sign_in(&self, uid: Id<UserMarker>) {
        let changed = {
            let mut current = self.inner.current.write();
            let changed = current.as_ref() != Some(&uid);
            *current = Some(uid.clone());
            changed
        };

        if changed {
            info!(%uid, "Signed in");
            self.inner.changes.notify(&Some(uid));
        }
    }

    pub fn sign_out(&self) {
        let previous = self.inner.current.write().take();

        if let Some(uid) = previous {
            info!(%uid, "Signed out");
            self.inner.changes.notify(&None);
        }
    }

    /// Calls `listener` with the current user right away and again on every sign-in or sign-out.
    pub fn on_auth_state_changed(
        &self,
        listener: impl Fn(Option<&Id<UserMarker>>) + Send + Sync + 'static,
    ) -> Subscription {
        let listener = Arc::new(listener);
        let on_change = Arc::clone(&listener);
        let subscription = self
            .inner
            .changes
            .register(move |uid: &Option<Id<UserMarker>>| on_change(uid.as_ref()));

        let current = self.inner.current.read().clone();
        listener(current.as_ref());

        subscription
    }
}

impl AuthProvider for AuthSession {
    fn current_user(&self) -> Option<Id<UserMarker>> {
        self.inner.current.read().clone()
    }
}
