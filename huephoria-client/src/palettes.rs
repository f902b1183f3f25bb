use crate::{
    config::ClientConfig,
    enrich::PostEnricher,
    error::{ClientError, Result},
};
use huephoria_common::{
    backend::{AuthProvider, DocumentStore},
    model::{
        Id,
        palette::{EnrichedPost, PalettePostContent, PostMarker},
        user::UserMarker,
    },
};
use std::sync::Arc;
use tracing::info;

/// Single palette posts: the detail view, submission and owner edits.
pub struct PaletteService<S, A> {
    enricher: PostEnricher<S>,
    auth: A,
}

impl<S: DocumentStore, A: AuthProvider> PaletteService<S, A> {
    pub fn new(store: Arc<S>, auth: A, unknown_author: impl Into<String>) -> Self {
        Self {
            enricher: PostEnricher::new(store, unknown_author),
            auth,
        }
    }

    pub fn from_config(store: Arc<S>, auth: A, config: &ClientConfig) -> Self {
        Self::new(store, auth, config.unknown_author.clone())
    }

    pub async fn get_palette_post(&self, id: &Id<PostMarker>) -> Result<EnrichedPost> {
        let post = self
            .enricher
            .store()
            .fetch_palette(id)
            .await?
            .ok_or_else(|| ClientError::PostNotFound(id.clone()))?;

        let viewer = self.auth.current_user();
        self.enricher.enrich(post, viewer.as_ref()).await
    }

    pub async fn submit_palette(&self, content: &PalettePostContent) -> Result<Id<PostMarker>> {
        let caller = self.caller()?;
        let post = self.enricher.store().create_palette(&caller, content).await?;
        info!(id = %post.id, owner = %caller, "Submitted palette");

        Ok(post.id)
    }

    pub async fn update_palette(
        &self,
        id: &Id<PostMarker>,
        content: &PalettePostContent,
    ) -> Result<()> {
        let caller = self.caller()?;
        self.enricher
            .store()
            .update_palette(&caller, id, content)
            .await?;
        info!(%id, "Updated palette");

        Ok(())
    }

    pub async fn delete_palette(&self, id: &Id<PostMarker>) -> Result<()> {
        let caller = self.caller()?;
        self.enricher.store().delete_palette(&caller, id).await?;
        info!(%id, "Deleted palette");

        Ok(())
    }

    fn caller(&self) -> Result<Id<UserMarker>> {
        self.auth.current_user().ok_or(ClientError::NotSignedIn)
    }
}
