use crate::{config::ClientConfig, enrich::PostEnricher, error::Result, like::LikeView};
use huephoria_common::{
    backend::{AuthProvider, DocumentStore},
    model::{
        Id,
        cursor::PageCursor,
        palette::{EnrichedPost, PostMarker},
    },
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::debug;

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct FeedPage {
    pub posts: Vec<EnrichedPost>,
    /// Number of posts in the whole feed at the time of the fetch.
    pub total: u64,
}

pub struct FeedPager<S, A> {
    enricher: PostEnricher<S>,
    auth: A,
    page_size: usize,
}

impl<S: DocumentStore, A: AuthProvider> FeedPager<S, A> {
    pub fn new(store: Arc<S>, auth: A, page_size: usize, unknown_author: impl Into<String>) -> Self {
        Self {
            enricher: PostEnricher::new(store, unknown_author),
            auth,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(store: Arc<S>, auth: A, config: &ClientConfig) -> Self {
        Self::new(store, auth, config.page_size, config.unknown_author.clone())
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn fetch_initial_page(&self) -> Result<FeedPage> {
        let store = self.enricher.store();
        let (posts, total) = tokio::try_join!(
            store.fetch_palette_page(None, self.page_size),
            store.count_palettes(),
        )?;

        let viewer = self.auth.current_user();
        let posts = self.enricher.enrich_all(posts, viewer.as_ref()).await?;
        debug!(loaded = posts.len(), total, "Fetched initial feed page");

        Ok(FeedPage { posts, total })
    }

    /// Posts created strictly before `last`, which should be the last post of the previous page.
    pub async fn fetch_next_page(&self, last: &EnrichedPost) -> Result<Vec<EnrichedPost>> {
        let cursor = PageCursor::after_enriched(last);
        let posts = self
            .enricher
            .store()
            .fetch_palette_page(Some(cursor), self.page_size)
            .await?;

        let viewer = self.auth.current_user();
        let posts = self.enricher.enrich_all(posts, viewer.as_ref()).await?;
        debug!(loaded = posts.len(), %cursor, "Fetched next feed page");

        Ok(posts)
    }
}

/// Scroll metrics of the view showing the feed.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ScrollPosition {
    pub viewport_height: f64,
    pub scroll_y: f64,
    pub document_height: f64,
}

impl ScrollPosition {
    #[must_use]
    pub fn is_near_bottom(&self, threshold: f64) -> bool {
        self.viewport_height + self.scroll_y >= self.document_height - threshold
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LoadOutcome {
    /// A page was fetched and appended; holds the number of new posts.
    Loaded(usize),
    Skipped(SkipReason),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SkipReason {
    Loading,
    Exhausted,
    NotNearBottom,
    NotStarted,
}

#[derive(Default)]
struct FeedState {
    posts: Vec<EnrichedPost>,
    total: u64,
    started: bool,
    /// A next page came back empty even though `total` promised more.
    exhausted: bool,
}

impl FeedState {
    fn has_more(&self) -> bool {
        self.started && !self.exhausted && self.total > self.posts.len() as u64
    }
}

/// Clears the loading flag however the load ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedSession<S, A> {
    pager: FeedPager<S, A>,
    scroll_threshold: f64,
    loading: AtomicBool,
    state: Mutex<FeedState>,
}

impl<S: DocumentStore, A: AuthProvider> FeedSession<S, A> {
    pub fn new(pager: FeedPager<S, A>, scroll_threshold: f64) -> Self {
        Self {
            pager,
            scroll_threshold,
            loading: AtomicBool::new(false),
            state: Mutex::new(FeedState::default()),
        }
    }

    pub fn from_config(store: Arc<S>, auth: A, config: &ClientConfig) -> Self {
        Self::new(
            FeedPager::from_config(store, auth, config),
            config.scroll_threshold,
        )
    }

    /// Loads the first page, replacing anything loaded before.
    pub async fn load_initial(&self) -> Result<LoadOutcome> {
        let Some(_guard) = LoadingGuard::acquire(&self.loading) else {
            return Ok(LoadOutcome::Skipped(SkipReason::Loading));
        };

        let page = self.pager.fetch_initial_page().await?;
        let loaded = page.posts.len();

        let mut state = self.state.lock();
        *state = FeedState {
            posts: page.posts,
            total: page.total,
            started: true,
            exhausted: false,
        };

        Ok(LoadOutcome::Loaded(loaded))
    }

    /// Appends the next page if one may be loaded right now.
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        let Some(_guard) = LoadingGuard::acquire(&self.loading) else {
            debug!("Suppressing feed load while another is in flight");
            return Ok(LoadOutcome::Skipped(SkipReason::Loading));
        };

        let last = {
            let state = self.state.lock();
            if !state.started {
                return Ok(LoadOutcome::Skipped(SkipReason::NotStarted));
            }
            if !state.has_more() {
                return Ok(LoadOutcome::Skipped(SkipReason::Exhausted));
            }
            match state.posts.last() {
                Some(last) => last.clone(),
                None => return Ok(LoadOutcome::Skipped(SkipReason::Exhausted)),
            }
        };

        let page = self.pager.fetch_next_page(&last).await?;
        let loaded = page.len();

        let mut state = self.state.lock();
        if page.is_empty() {
            debug!(
                loaded = state.posts.len(),
                total = state.total,
                "Next page was empty, feed exhausted"
            );
            state.exhausted = true;
        }
        state.posts.extend(page);

        Ok(LoadOutcome::Loaded(loaded))
    }

    /// Scroll handler: loads more when the view is within the scroll threshold of the bottom.
    pub async fn on_scroll(&self, position: ScrollPosition) -> Result<LoadOutcome> {
        if !position.is_near_bottom(self.scroll_threshold) {
            return Ok(LoadOutcome::Skipped(SkipReason::NotNearBottom));
        }

        self.load_more().await
    }

    /// Mirrors a post's local like state into the loaded list. Returns whether the post is loaded.
    pub fn apply_like_view(&self, post: &Id<PostMarker>, view: LikeView) -> bool {
        let mut state = self.state.lock();
        match state.posts.iter_mut().find(|loaded| loaded.id() == post) {
            Some(loaded) => {
                loaded.user_like = view.liked;
                loaded.likes = view.likes;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn posts(&self) -> Vec<EnrichedPost> {
        self.state.lock().posts.clone()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.state.lock().has_more()
    }

    #[must_use]
    pub fn next_cursor(&self) -> Option<PageCursor> {
        self.state.lock().posts.last().map(PageCursor::after_enriched)
    }

    #[must_use]
    pub fn pager(&self) -> &FeedPager<S, A> {
        &self.pager
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        auth::AuthSession,
        feed::{FeedPager, FeedSession, LoadOutcome, ScrollPosition, SkipReason},
        like::LikeView,
        testing::{seed_posts, seed_user, uid},
    };
    use huephoria_common::{backend::PaletteStore, model::palette::EnrichedPost};
    use huephoria_db::memory::MemoryStore;
    use std::{collections::HashSet, sync::Arc, time::Duration};

    fn session(store: &Arc<MemoryStore>, page_size: usize) -> FeedSession<MemoryStore, AuthSession> {
        let pager = FeedPager::new(Arc::clone(store), AuthSession::new(), page_size, "Unknown");
        FeedSession::new(pager, 100.0)
    }

    fn seeded_store(count: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let owner = uid("owner");
        seed_user(&store, &owner, "painter");
        seed_posts(&store, &owner, count);
        store
    }

    #[tokio::test]
    async fn pages_are_disjoint_and_contiguous() {
        let store = seeded_store(30);
        let pager = FeedPager::new(Arc::clone(&store), AuthSession::new(), 12, "Unknown");

        let initial = pager.fetch_initial_page().await.unwrap();
        assert_eq!(initial.posts.len(), 12);
        assert_eq!(initial.total, 30);

        let mut pages: Vec<Vec<EnrichedPost>> = vec![initial.posts];
        loop {
            let last = pages.last().and_then(|page| page.last()).unwrap().clone();
            let next = pager.fetch_next_page(&last).await.unwrap();
            if next.is_empty() {
                break;
            }
            pages.push(next);
        }
        assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![12, 12, 6]);

        for pair in pages.windows(2) {
            let newest_next = pair[1].iter().map(EnrichedPost::created_at).max().unwrap();
            let oldest_prev = pair[0].iter().map(EnrichedPost::created_at).min().unwrap();
            assert!(newest_next <= oldest_prev);
        }

        let ids: HashSet<_> = pages.iter().flatten().map(|p| p.id().clone()).collect();
        assert_eq!(ids.len(), 30);
    }

    #[tokio::test]
    async fn session_stops_when_total_reached() {
        let store = seeded_store(20);
        let session = session(&store, 12);

        assert_eq!(
            session.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::NotStarted)
        );
        assert_eq!(session.load_initial().await.unwrap(), LoadOutcome::Loaded(12));
        assert!(session.has_more());
        assert_eq!(session.load_more().await.unwrap(), LoadOutcome::Loaded(8));
        assert!(!session.has_more());
        assert_eq!(
            session.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::Exhausted)
        );
        assert_eq!(session.posts().len(), 20);
        assert_eq!(session.total(), 20);
    }

    #[tokio::test]
    async fn empty_next_page_exhausts_feed() {
        let store = seeded_store(13);
        let session = session(&store, 12);
        session.load_initial().await.unwrap();

        let oldest = store.fetch_palette_page(None, 13).await.unwrap().pop().unwrap();
        store.delete_palette(&oldest.owner, &oldest.id).await.unwrap();

        assert!(session.has_more());
        assert_eq!(session.load_more().await.unwrap(), LoadOutcome::Loaded(0));
        assert!(!session.has_more());
        assert_eq!(
            session.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::Exhausted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_load_is_suppressed_while_in_flight() {
        let store = seeded_store(30);
        let session = Arc::new(session(&store, 12));
        session.load_initial().await.unwrap();

        store.set_latency(Duration::from_millis(100));
        let background = Arc::clone(&session);
        let in_flight = tokio::spawn(async move { background.load_more().await });
        tokio::task::yield_now().await;

        assert!(session.is_loading());
        assert_eq!(
            session.load_more().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::Loading)
        );
        assert_eq!(
            session.load_initial().await.unwrap(),
            LoadOutcome::Skipped(SkipReason::Loading)
        );

        assert_eq!(in_flight.await.unwrap().unwrap(), LoadOutcome::Loaded(12));
        assert!(!session.is_loading());
        assert_eq!(session.posts().len(), 24);
    }

    #[tokio::test]
    async fn loading_flag_resets_after_failure() {
        let store = seeded_store(5);
        let session = session(&store, 12);

        store.set_offline(true);
        assert!(session.load_initial().await.is_err());
        assert!(!session.is_loading());

        store.set_offline(false);
        assert_eq!(session.load_initial().await.unwrap(), LoadOutcome::Loaded(5));
    }

    #[tokio::test]
    async fn scroll_triggers_only_near_bottom() {
        let store = seeded_store(15);
        let session = session(&store, 12);
        session.load_initial().await.unwrap();

        let far = ScrollPosition {
            viewport_height: 800.0,
            scroll_y: 1000.0,
            document_height: 3000.0,
        };
        assert_eq!(
            session.on_scroll(far).await.unwrap(),
            LoadOutcome::Skipped(SkipReason::NotNearBottom)
        );

        let near = ScrollPosition {
            scroll_y: 2150.0,
            ..far
        };
        assert_eq!(session.on_scroll(near).await.unwrap(), LoadOutcome::Loaded(3));
    }

    #[test]
    fn near_bottom_threshold() {
        let position = ScrollPosition {
            viewport_height: 600.0,
            scroll_y: 300.0,
            document_height: 1000.0,
        };
        assert!(position.is_near_bottom(100.0));
        assert!(!position.is_near_bottom(99.0));
    }

    #[tokio::test]
    async fn like_view_is_mirrored_into_loaded_posts() {
        let store = seeded_store(3);
        let session = session(&store, 12);
        session.load_initial().await.unwrap();
        let post = session.posts()[1].id().clone();

        assert!(session.apply_like_view(&post, LikeView { liked: true, likes: 7 }));

        let updated = session.posts().into_iter().find(|p| p.id() == &post).unwrap();
        assert!(updated.user_like);
        assert_eq!(updated.likes, 7);
        assert_eq!(session.next_cursor().unwrap().created_at(), session.posts()[2].created_at());
    }
}
