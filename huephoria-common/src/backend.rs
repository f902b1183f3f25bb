use crate::{
    listener::Subscription,
    model::{
        Id, ModelValidationError,
        cursor::PageCursor,
        like::LikeRecord,
        palette::{PalettePost, PalettePostContent, PostMarker},
        user::{User, UserMarker, Username},
    },
};
use std::{error::Error as StdError, future::Future};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("A document in the backend was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Backend(Box<dyn StdError + Send + Sync>),
}

/// Writes take the caller's identity; rule rejections surface as [`StoreError::PermissionDenied`].
pub trait PaletteStore: Send + Sync + 'static {
    /// Up to `limit` posts ordered by creation time, newest first, starting strictly after
    /// `cursor` when one is given.
    fn fetch_palette_page(
        &self,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<PalettePost>>> + Send;

    fn count_palettes(&self) -> impl Future<Output = StoreResult<u64>> + Send;

    fn fetch_palette(
        &self,
        id: &Id<PostMarker>,
    ) -> impl Future<Output = StoreResult<Option<PalettePost>>> + Send;

    /// Stores a new post owned by `caller`. Id and creation time are assigned by the backend.
    fn create_palette(
        &self,
        caller: &Id<UserMarker>,
        content: &PalettePostContent,
    ) -> impl Future<Output = StoreResult<PalettePost>> + Send;

    fn update_palette(
        &self,
        caller: &Id<UserMarker>,
        id: &Id<PostMarker>,
        content: &PalettePostContent,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn delete_palette(
        &self,
        caller: &Id<UserMarker>,
        id: &Id<PostMarker>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn count_likes(&self, post: &Id<PostMarker>) -> impl Future<Output = StoreResult<u64>> + Send;

    fn fetch_like(
        &self,
        post: &Id<PostMarker>,
        user: &Id<UserMarker>,
    ) -> impl Future<Output = StoreResult<Option<LikeRecord>>> + Send;

    /// Records `caller`'s like of `post`. Liking twice leaves a single record.
    fn create_like(
        &self,
        caller: &Id<UserMarker>,
        post: &Id<PostMarker>,
    ) -> impl Future<Output = StoreResult<LikeRecord>> + Send;

    /// Removes `caller`'s like of `post`, if any.
    fn delete_like(
        &self,
        caller: &Id<UserMarker>,
        post: &Id<PostMarker>,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

pub trait UserStore: Send + Sync + 'static {
    fn fetch_user(
        &self,
        uid: &Id<UserMarker>,
    ) -> impl Future<Output = StoreResult<Option<User>>> + Send;

    fn fetch_user_by_username(
        &self,
        username: &Username,
    ) -> impl Future<Output = StoreResult<Option<User>>> + Send;

    /// Sets `caller`'s username, creating the user document if there is none yet.
    fn set_username(
        &self,
        caller: &Id<UserMarker>,
        username: &Username,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Everything the client reads and writes.
pub trait DocumentStore: PaletteStore + UserStore {}

impl<T: PaletteStore + UserStore> DocumentStore for T {}

pub type UserListener = Box<dyn Fn(Option<&User>) + Send + Sync>;

/// Live updates of single user documents.
pub trait WatchUsers {
    /// Calls `listener` with the user's document whenever it changes; `None` once it is gone.
    fn watch_user(&self, uid: &Id<UserMarker>, listener: UserListener) -> Subscription;
}

pub trait AuthProvider: Send + Sync + 'static {
    /// The signed-in user, if any. Cheap and synchronous.
    fn current_user(&self) -> Option<Id<UserMarker>>;
}
