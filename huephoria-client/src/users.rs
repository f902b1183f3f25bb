use crate::error::{ClientError, Result};
use huephoria_common::{
    backend::{AuthProvider, UserListener, UserStore, WatchUsers},
    listener::Subscription,
    model::{
        Id,
        user::{UserMarker, Username},
    },
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct UserService<S, A> {
    store: Arc<S>,
    auth: A,
}

impl<S: UserStore, A: AuthProvider> UserService<S, A> {
    pub fn new(store: Arc<S>, auth: A) -> Self {
        Self { store, auth }
    }

    pub async fn username_exists(&self, username: &Username) -> Result<bool> {
        Ok(self.store.fetch_user_by_username(username).await?.is_some())
    }

    /// Whether the user has picked a username yet.
    pub async fn has_username(&self, uid: &Id<UserMarker>) -> Result<bool> {
        Ok(self.username_of(uid).await?.is_some())
    }

    pub async fn username_of(&self, uid: &Id<UserMarker>) -> Result<Option<Username>> {
        Ok(self
            .store
            .fetch_user(uid)
            .await?
            .and_then(|user| user.username))
    }

    /// Sets the signed-in user's username. Fails if another user already holds it.
    pub async fn create_update_username(&self, username: &Username) -> Result<()> {
        let caller = self.auth.current_user().ok_or(ClientError::NotSignedIn)?;

        match self.store.fetch_user_by_username(username).await? {
            Some(holder) if holder.uid == caller => {
                debug!(%caller, %username, "Username unchanged");
                return Ok(());
            }
            Some(_) => return Err(ClientError::UsernameTaken(username.clone())),
            None => {}
        }

        self.store.set_username(&caller, username).await?;
        info!(%caller, %username, "Set username");

        Ok(())
    }
}

impl<S: UserStore + WatchUsers, A: AuthProvider> UserService<S, A> {
    pub fn watch_user(&self, uid: &Id<UserMarker>, listener: UserListener) -> Subscription {
        self.store.watch_user(uid, listener)
    }
}
