use crate::error::Result;
use futures::future::try_join_all;
use huephoria_common::{
    backend::{DocumentStore, StoreResult},
    model::{
        Id,
        palette::{EnrichedPost, PalettePost, PostMarker},
        user::UserMarker,
    },
};
use std::sync::Arc;
use tracing::warn;

/// Resolves author name, like count and the viewer's like for raw posts.
pub struct PostEnricher<S> {
    store: Arc<S>,
    unknown_author: String,
}

impl<S: DocumentStore> PostEnricher<S> {
    pub fn new(store: Arc<S>, unknown_author: impl Into<String>) -> Self {
        Self {
            store,
            unknown_author: unknown_author.into(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The three lookups run concurrently; if any of them fails, the whole post fails.
    pub async fn enrich(
        &self,
        post: PalettePost,
        viewer: Option<&Id<UserMarker>>,
    ) -> Result<EnrichedPost> {
        let (author, likes, user_like) = tokio::try_join!(
            self.author_name(&post.owner),
            self.store.count_likes(&post.id),
            self.viewer_likes(&post.id, viewer),
        )?;

        Ok(EnrichedPost {
            post,
            author,
            likes,
            user_like,
        })
    }

    /// Enriches a whole page, keeping its order.
    pub async fn enrich_all(
        &self,
        posts: Vec<PalettePost>,
        viewer: Option<&Id<UserMarker>>,
    ) -> Result<Vec<EnrichedPost>> {
        try_join_all(posts.into_iter().map(|post| self.enrich(post, viewer))).await
    }

    async fn author_name(&self, owner: &Id<UserMarker>) -> StoreResult<String> {
        let username = self
            .store
            .fetch_user(owner)
            .await?
            .and_then(|user| user.username);

        match username {
            Some(username) => Ok(username.into_inner()),
            None => {
                warn!(%owner, placeholder = %self.unknown_author, "Post owner has no username");
                Ok(self.unknown_author.clone())
            }
        }
    }

    async fn viewer_likes(
        &self,
        post: &Id<PostMarker>,
        viewer: Option<&Id<UserMarker>>,
    ) -> StoreResult<bool> {
        match viewer {
            Some(viewer) => Ok(self.store.fetch_like(post, viewer).await?.is_some()),
            None => Ok(false),
        }
    }
}
