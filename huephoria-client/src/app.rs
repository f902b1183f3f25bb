use crate::{
    auth::AuthSession,
    config::ClientConfig,
    error::Result,
    feed::{FeedSession, LoadOutcome, ScrollPosition},
    like::{LikeReconciler, ReconcileEvent, ToggleOutcome},
    palettes::PaletteService,
    users::UserService,
};
use huephoria_common::{
    backend::DocumentStore,
    listener::Subscription,
    model::{
        Id,
        palette::{EnrichedPost, PostMarker},
    },
};
use std::sync::Arc;

pub struct Huephoria<S> {
    auth: AuthSession,
    feed: Arc<FeedSession<S, AuthSession>>,
    likes: LikeReconciler<S, AuthSession>,
    palettes: PaletteService<S, AuthSession>,
    users: UserService<S, AuthSession>,
    _reconciled: Subscription,
}

impl<S: DocumentStore> Huephoria<S> {
    pub fn new(store: Arc<S>, auth: AuthSession, config: &ClientConfig) -> Self {
        let feed = Arc::new(FeedSession::from_config(
            Arc::clone(&store),
            auth.clone(),
            config,
        ));
        let likes = LikeReconciler::from_config(Arc::clone(&store), auth.clone(), config);

        let reconciled_feed = Arc::downgrade(&feed);
        let reconciled = likes.subscribe(move |event: &ReconcileEvent| {
            if let Some(feed) = reconciled_feed.upgrade() {
                feed.apply_like_view(&event.post, event.view);
            }
        });

        Self {
            palettes: PaletteService::from_config(Arc::clone(&store), auth.clone(), config),
            users: UserService::new(store, auth.clone()),
            auth,
            feed,
            likes,
            _reconciled: reconciled,
        }
    }

    #[must_use]
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    #[must_use]
    pub fn feed(&self) -> &FeedSession<S, AuthSession> {
        &self.feed
    }

    #[must_use]
    pub fn likes(&self) -> &LikeReconciler<S, AuthSession> {
        &self.likes
    }

    #[must_use]
    pub fn palettes(&self) -> &PaletteService<S, AuthSession> {
        &self.palettes
    }

    #[must_use]
    pub fn users(&self) -> &UserService<S, AuthSession> {
        &self.users
    }

    pub async fn load_feed(&self) -> Result<LoadOutcome> {
        let outcome = self.feed.load_initial().await?;
        self.track_feed();
        Ok(outcome)
    }

    pub async fn on_scroll(&self, position: ScrollPosition) -> Result<LoadOutcome> {
        let outcome = self.feed.on_scroll(position).await?;
        if matches!(outcome, LoadOutcome::Loaded(_)) {
            self.track_feed();
        }
        Ok(outcome)
    }

    /// Loads a post for the detail view and tracks its likes, so it can be toggled even when it
    /// is not part of the loaded feed.
    pub async fn open_palette(&self, id: &Id<PostMarker>) -> Result<EnrichedPost> {
        let mut post = self.palettes.get_palette_post(id).await?;
        let view = self.likes.track(&post);
        post.user_like = view.liked;
        post.likes = view.likes;
        Ok(post)
    }

    /// Toggles a like and shows the optimistic state in the feed right away.
    pub fn toggle_like(&self, post: &Id<PostMarker>) -> Result<ToggleOutcome> {
        let outcome = self.likes.toggle(post)?;
        if let ToggleOutcome::Toggled(view) = outcome {
            self.feed.apply_like_view(post, view);
        }
        Ok(outcome)
    }

    /// Feeds loaded posts to the reconciler; posts with a pending like keep their local state.
    fn track_feed(&self) {
        for post in self.feed.posts() {
            let view = self.likes.track(&post);
            self.feed.apply_like_view(post.id(), view);
        }
    }
}
