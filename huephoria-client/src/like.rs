//! Optimistic likes with debounced reconciliation.

use crate::{
    config::ClientConfig,
    debounce::Debouncer,
    error::{ClientError, Result},
};
use huephoria_common::{
    backend::{AuthProvider, PaletteStore, StoreError, StoreResult},
    listener::{ListenerRegistry, Subscription},
    model::{
        Id,
        palette::{EnrichedPost, PostMarker},
        user::UserMarker,
    },
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{Arc, Weak},
    time::Duration,
};
use tracing::{debug, error, warn};

/// What the viewer sees of a post's likes.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Serialize)]
pub struct LikeView {
    pub liked: bool,
    pub likes: u64,
}

impl LikeView {
    #[must_use]
    pub fn toggled(self) -> Self {
        if self.liked {
            Self {
                liked: false,
                likes: self.likes.saturating_sub(1),
            }
        } else {
            Self {
                liked: true,
                likes: self.likes.saturating_add(1),
            }
        }
    }
}

impl From<&EnrichedPost> for LikeView {
    fn from(post: &EnrichedPost) -> Self {
        Self {
            liked: post.user_like,
            likes: post.likes,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LikeState {
    Unliked,
    Liked,
    /// The local state changed and has not been reconciled with the backend yet.
    PendingReconcile,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ToggleOutcome {
    Toggled(LikeView),
    /// Nobody is signed in. Nothing was changed; the viewer should be sent to sign in.
    LoginRequired,
}

/// What to do with the optimistic state when a reconciliation gives up.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    #[default]
    KeepOptimistic,
    /// Restore the last state the backend confirmed, unless the viewer toggled again meanwhile.
    Rollback,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ReconcilePolicy {
    /// Additional attempts after the first failed one.
    pub retries: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
    pub on_failure: FailureAction,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff: Duration::from_millis(250),
            on_failure: FailureAction::KeepOptimistic,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LikeWrite {
    Created,
    Deleted,
}

#[derive(Clone, Debug)]
pub enum ReconcileOutcome {
    /// The backend already agreed with the local state.
    Unchanged,
    Wrote(LikeWrite),
    Failed {
        error: Arc<StoreError>,
        attempts: u32,
        action: FailureAction,
    },
}

/// Published after every reconciliation.
#[derive(Clone, Debug)]
pub struct ReconcileEvent {
    pub post: Id<PostMarker>,
    pub viewer: Id<UserMarker>,
    /// The local state after the reconciliation settled.
    pub view: LikeView,
    pub outcome: ReconcileOutcome,
}

struct LikeEntry {
    local: LikeView,
    confirmed: LikeView,
    viewer: Option<Id<UserMarker>>,
    pending: bool,
    /// Bumped by every toggle. Only the reconciliation started for the latest toggle settles.
    generation: u64,
}

impl LikeEntry {
    fn state(&self) -> LikeState {
        if self.pending {
            LikeState::PendingReconcile
        } else if self.local.liked {
            LikeState::Liked
        } else {
            LikeState::Unliked
        }
    }
}

struct ReconcilerInner<S, A> {
    store: Arc<S>,
    auth: A,
    debounce: Duration,
    policy: ReconcilePolicy,
    entries: Mutex<HashMap<Id<PostMarker>, LikeEntry>>,
    debouncer: Debouncer<Id<PostMarker>>,
    events: ListenerRegistry<ReconcileEvent>,
}

pub struct LikeReconciler<S, A> {
    inner: Arc<ReconcilerInner<S, A>>,
}

impl<S: PaletteStore, A: AuthProvider> LikeReconciler<S, A> {
    pub fn new(store: Arc<S>, auth: A, debounce: Duration, policy: ReconcilePolicy) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                store,
                auth,
                debounce,
                policy,
                entries: Mutex::new(HashMap::new()),
                debouncer: Debouncer::new(),
                events: ListenerRegistry::new(),
            }),
        }
    }

    pub fn from_config(store: Arc<S>, auth: A, config: &ClientConfig) -> Self {
        Self::new(store, auth, config.like_debounce(), config.reconcile_policy())
    }

    /// Starts tracking a post as it was loaded. A post with a pending reconciliation keeps its
    /// local state.
    pub fn track(&self, post: &EnrichedPost) -> LikeView {
        let loaded = LikeView::from(post);
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(post.id().clone()).or_insert(LikeEntry {
            local: loaded,
            confirmed: loaded,
            viewer: None,
            pending: false,
            generation: 0,
        });
        if !entry.pending {
            entry.local = loaded;
            entry.confirmed = loaded;
        }
        entry.local
    }

    /// Stops tracking a post. Refused while a reconciliation is pending.
    pub fn untrack(&self, post: &Id<PostMarker>) -> bool {
        let mut entries = self.inner.entries.lock();
        match entries.get(post) {
            Some(entry) if !entry.pending => {
                entries.remove(post);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn view(&self, post: &Id<PostMarker>) -> Option<LikeView> {
        self.inner.with_entry(post, |entry| entry.local)
    }

    #[must_use]
    pub fn state(&self, post: &Id<PostMarker>) -> Option<LikeState> {
        self.inner.with_entry(post, |entry| entry.state())
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&ReconcileEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.register(listener)
    }

    /// Flips the like of `post` locally and schedules its reconciliation.
    pub fn toggle(&self, post: &Id<PostMarker>) -> Result<ToggleOutcome> {
        let Some(viewer) = self.inner.auth.current_user() else {
            debug!(%post, "Like toggled without a signed-in user");
            return Ok(ToggleOutcome::LoginRequired);
        };

        let view = self
            .inner
            .with_entry(post, |entry| {
                entry.local = entry.local.toggled();
                entry.viewer = Some(viewer);
                entry.pending = true;
                entry.generation += 1;
                entry.local
            })
            .ok_or_else(|| ClientError::PostNotTracked(post.clone()))?;
        debug!(%post, liked = view.liked, likes = view.likes, "Toggled like locally");

        let inner = Arc::downgrade(&self.inner);
        let key = post.clone();
        self.inner
            .debouncer
            .schedule(post.clone(), self.inner.debounce, async move {
                if let Some(inner) = Weak::upgrade(&inner) {
                    inner.reconcile(key).await;
                }
            });

        Ok(ToggleOutcome::Toggled(view))
    }

    /// Drops a scheduled reconciliation; the local state stays as it is.
    pub fn cancel_pending(&self, post: &Id<PostMarker>) -> bool {
        let cancelled = self.inner.debouncer.cancel(post);
        if cancelled {
            self.inner.with_entry(post, |entry| entry.pending = false);
        }
        cancelled
    }

    #[must_use]
    pub fn policy(&self) -> ReconcilePolicy {
        self.inner.policy
    }
}

impl<S, A> Debug for LikeReconciler<S, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikeReconciler")
            .field("tracked", &self.inner.entries.lock().len())
            .field("debouncer", &self.inner.debouncer)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl<S: PaletteStore, A: AuthProvider> ReconcilerInner<S, A> {
    fn with_entry<R>(&self, post: &Id<PostMarker>, f: impl FnOnce(&mut LikeEntry) -> R) -> Option<R> {
        self.entries.lock().get_mut(post).map(f)
    }

    async fn reconcile(&self, post: Id<PostMarker>) {
        let Some((viewer, scheduled, generation)) = self
            .with_entry(&post, |entry| {
                let viewer = entry.viewer.clone()?;
                Some((viewer, entry.local, entry.generation))
            })
            .flatten()
        else {
            return;
        };

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self.sync_once(&post, &viewer, scheduled).await {
                Ok(synced) => break Ok(synced),
                Err(e) if attempts <= self.policy.retries => {
                    warn!(%post, attempts, "Like reconciliation failed, retrying: {e}");
                    tokio::time::sleep(self.policy.backoff * attempts).await;
                }
                Err(e) => break Err(e),
            }
        };

        let (view, outcome) = match result {
            Ok((confirmed, outcome)) => (
                self.settle_success(&post, generation, confirmed),
                outcome,
            ),
            Err(e) => {
                error!(%post, attempts, "Like reconciliation gave up: {e}");
                let (view, action) = self.settle_failure(&post, generation);
                let outcome = ReconcileOutcome::Failed {
                    error: Arc::new(e),
                    attempts,
                    action,
                };
                (view, outcome)
            }
        };

        self.events.notify(&ReconcileEvent {
            post,
            viewer,
            view,
            outcome,
        });
    }

    /// Brings the like record in line with the local state as of after the read.
    async fn sync_once(
        &self,
        post: &Id<PostMarker>,
        viewer: &Id<UserMarker>,
        scheduled: LikeView,
    ) -> StoreResult<(LikeView, ReconcileOutcome)> {
        let on_server = self.store.fetch_like(post, viewer).await?.is_some();
        let local = self
            .with_entry(post, |entry| entry.local)
            .unwrap_or(scheduled);

        if on_server == local.liked {
            debug!(%post, liked = local.liked, "Like already in sync");
            return Ok((local, ReconcileOutcome::Unchanged));
        }

        let write = if local.liked {
            self.store.create_like(viewer, post).await?;
            LikeWrite::Created
        } else {
            self.store.delete_like(viewer, post).await?;
            LikeWrite::Deleted
        };
        debug!(%post, ?write, "Reconciled like");

        Ok((local, ReconcileOutcome::Wrote(write)))
    }

    /// A run superseded by a newer toggle leaves the entry pending; the newer run settles it.
    fn settle_success(&self, post: &Id<PostMarker>, generation: u64, confirmed: LikeView) -> LikeView {
        self.with_entry(post, |entry| {
            entry.confirmed = confirmed;
            if entry.generation == generation {
                entry.pending = false;
            }
            entry.local
        })
        .unwrap_or(confirmed)
    }

    fn settle_failure(&self, post: &Id<PostMarker>, generation: u64) -> (LikeView, FailureAction) {
        self.with_entry(post, |entry| {
            let latest = entry.generation == generation;
            let action = match self.policy.on_failure {
                FailureAction::Rollback if latest => {
                    entry.local = entry.confirmed;
                    FailureAction::Rollback
                }
                _ => FailureAction::KeepOptimistic,
            };
            if latest {
                entry.pending = false;
            }
            (entry.local, action)
        })
        .unwrap_or((LikeView::default(), FailureAction::KeepOptimistic))
    }
}
