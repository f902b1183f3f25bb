use huephoria_common::{
    backend::{
        PaletteStore, StoreError, StoreResult, UserListener, UserStore, WatchUsers,
    },
    listener::{ListenerRegistry, Subscription},
    model::{
        Id, Timestamp,
        cursor::PageCursor,
        like::LikeRecord,
        palette::{PalettePost, PalettePostContent, PostMarker},
        user::{User, UserMarker, Username},
    },
};
use parking_lot::Mutex;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::trace;

#[derive(Clone, Debug)]
struct UserChange {
    uid: Id<UserMarker>,
    user: Option<User>,
}

#[derive(Default)]
struct MemoryState {
    palettes: HashMap<Id<PostMarker>, PalettePost>,
    likes: HashMap<Id<PostMarker>, BTreeMap<Id<UserMarker>, LikeRecord>>,
    users: HashMap<Id<UserMarker>, User>,
    last_created_at: Option<Timestamp>,
}

impl MemoryState {
    /// Creation times handed out by this store strictly increase.
    fn next_created_at(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let next = match self.last_created_at {
            Some(last) if now <= last => {
                Timestamp::from(last.get() + time::Duration::nanoseconds(1))
            }
            _ => now,
        };
        self.last_created_at = Some(next);
        next
    }
}

/// In-process stand-in for the hosted backend, with adjustable latency and connectivity.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Mutex<Duration>,
    offline: AtomicBool,
    like_writes: AtomicU64,
    user_changes: ListenerRegistry<UserChange>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request waits this long before it is answered.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// While offline every request fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of like create/delete requests that reached the store.
    #[must_use]
    pub fn like_writes(&self) -> u64 {
        self.like_writes.load(Ordering::SeqCst)
    }

    /// Seeds a post with a fixed creation time, bypassing rules and latency.
    pub fn insert_palette(
        &self,
        owner: Id<UserMarker>,
        content: PalettePostContent,
        created_at: Timestamp,
    ) -> PalettePost {
        let post = PalettePost {
            id: Id::generate(),
            owner,
            content,
            created_at,
        };

        let mut state = self.state.lock();
        state.last_created_at = state.last_created_at.max(Some(created_at));
        state.palettes.insert(post.id.clone(), post.clone());
        post
    }

    /// Seeds a like, bypassing rules and latency.
    pub fn insert_like(&self, post: &Id<PostMarker>, user: &Id<UserMarker>) {
        let record = LikeRecord {
            post: post.clone(),
            user: user.clone(),
            created_at: Timestamp::now(),
        };
        self.state
            .lock()
            .likes
            .entry(post.clone())
            .or_default()
            .insert(user.clone(), record);
    }

    /// Seeds or replaces a user document and notifies watchers.
    pub fn insert_user(&self, user: User) {
        self.state.lock().users.insert(user.uid.clone(), user.clone());
        self.user_changes.notify(&UserChange {
            uid: user.uid.clone(),
            user: Some(user),
        });
    }

    /// Deletes a user document and notifies watchers.
    pub fn remove_user(&self, uid: &Id<UserMarker>) {
        self.state.lock().users.remove(uid);
        self.user_changes.notify(&UserChange {
            uid: uid.clone(),
            user: None,
        });
    }

    async fn round_trip(&self, operation: &'static str) -> StoreResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            trace!(operation, "Rejecting request while offline");
            return Err(StoreError::Unavailable(format!("{operation}: store is offline")));
        }

        Ok(())
    }

    fn owned_palette_mut<'a>(
        state: &'a mut MemoryState,
        caller: &Id<UserMarker>,
        id: &Id<PostMarker>,
    ) -> StoreResult<&'a mut PalettePost> {
        match state.palettes.get_mut(id) {
            Some(post) if post.owner == *caller => Ok(post),
            Some(_) => Err(StoreError::PermissionDenied(format!(
                "palette {id} is not owned by {caller}"
            ))),
            None => Err(StoreError::PermissionDenied(format!("palette {id} does not exist"))),
        }
    }
}

impl PaletteStore for MemoryStore {
    async fn fetch_palette_page(
        &self,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> StoreResult<Vec<PalettePost>> {
        self.round_trip("fetch_palette_page").await?;

        let state = self.state.lock();
        let mut page: Vec<PalettePost> = state
            .palettes
            .values()
            .filter(|post| cursor.is_none_or(|cursor| cursor.admits(post.created_at)))
            .cloned()
            .collect();
        page.sort_by(|a, b| {
            Reverse(a.created_at)
                .cmp(&Reverse(b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        page.truncate(limit);

        Ok(page)
    }

    async fn count_palettes(&self) -> StoreResult<u64> {
        self.round_trip("count_palettes").await?;

        Ok(self.state.lock().palettes.len() as u64)
    }

    async fn fetch_palette(&self, id: &Id<PostMarker>) -> StoreResult<Option<PalettePost>> {
        self.round_trip("fetch_palette").await?;

        Ok(self.state.lock().palettes.get(id).cloned())
    }

    async fn create_palette(
        &self,
        caller: &Id<UserMarker>,
        content: &PalettePostContent,
    ) -> StoreResult<PalettePost> {
        self.round_trip("create_palette").await?;

        let mut state = self.state.lock();
        let post = PalettePost {
            id: Id::generate(),
            owner: caller.clone(),
            content: content.clone(),
            created_at: state.next_created_at(),
        };
        state.palettes.insert(post.id.clone(), post.clone());

        Ok(post)
    }

    async fn update_palette(
        &self,
        caller: &Id<UserMarker>,
        id: &Id<PostMarker>,
        content: &PalettePostContent,
    ) -> StoreResult<()> {
        self.round_trip("update_palette").await?;

        let mut state = self.state.lock();
        let post = Self::owned_palette_mut(&mut state, caller, id)?;
        post.content = content.clone();

        Ok(())
    }

    async fn delete_palette(&self, caller: &Id<UserMarker>, id: &Id<PostMarker>) -> StoreResult<()> {
        self.round_trip("delete_palette").await?;

        let mut state = self.state.lock();
        Self::owned_palette_mut(&mut state, caller, id)?;
        state.palettes.remove(id);
        state.likes.remove(id);

        Ok(())
    }

    async fn count_likes(&self, post: &Id<PostMarker>) -> StoreResult<u64> {
        self.round_trip("count_likes").await?;

        let state = self.state.lock();
        Ok(state.likes.get(post).map_or(0, |likes| likes.len() as u64))
    }

    async fn fetch_like(
        &self,
        post: &Id<PostMarker>,
        user: &Id<UserMarker>,
    ) -> StoreResult<Option<LikeRecord>> {
        self.round_trip("fetch_like").await?;

        let state = self.state.lock();
        Ok(state.likes.get(post).and_then(|likes| likes.get(user)).cloned())
    }

    async fn create_like(
        &self,
        caller: &Id<UserMarker>,
        post: &Id<PostMarker>,
    ) -> StoreResult<LikeRecord> {
        self.round_trip("create_like").await?;
        self.like_writes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        let record = state
            .likes
            .entry(post.clone())
            .or_default()
            .entry(caller.clone())
            .or_insert_with(|| LikeRecord {
                post: post.clone(),
                user: caller.clone(),
                created_at: Timestamp::now(),
            });

        Ok(record.clone())
    }

    async fn delete_like(&self, caller: &Id<UserMarker>, post: &Id<PostMarker>) -> StoreResult<()> {
        self.round_trip("delete_like").await?;
        self.like_writes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if let Some(likes) = state.likes.get_mut(post) {
            likes.remove(caller);
        }

        Ok(())
    }
}

impl UserStore for MemoryStore {
    async fn fetch_user(&self, uid: &Id<UserMarker>) -> StoreResult<Option<User>> {
        self.round_trip("fetch_user").await?;

        Ok(self.state.lock().users.get(uid).cloned())
    }

    async fn fetch_user_by_username(&self, username: &Username) -> StoreResult<Option<User>> {
        self.round_trip("fetch_user_by_username").await?;

        let state = self.state.lock();
        Ok(state
            .users
            .values()
            .find(|user| user.username.as_ref() == Some(username))
            .cloned())
    }

    async fn set_username(&self, caller: &Id<UserMarker>, username: &Username) -> StoreResult<()> {
        self.round_trip("set_username").await?;

        let user = {
            let mut state = self.state.lock();
            let user = state.users.entry(caller.clone()).or_insert_with(|| User {
                uid: caller.clone(),
                username: None,
            });
            user.username = Some(username.clone());
            user.clone()
        };

        self.user_changes.notify(&UserChange {
            uid: caller.clone(),
            user: Some(user),
        });

        Ok(())
    }
}

impl WatchUsers for MemoryStore {
    fn watch_user(&self, uid: &Id<UserMarker>, listener: UserListener) -> Subscription {
        let listener = Arc::new(listener);

        let watched = uid.clone();
        let on_change = Arc::clone(&listener);
        let subscription = self.user_changes.register(move |change| {
            if change.uid == watched {
                on_change(change.user.as_ref());
            }
        });

        let current = self.state.lock().users.get(uid).cloned();
        listener(current.as_ref());

        subscription
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::MemoryStore;
    use huephoria_common::{
        backend::{PaletteStore, StoreError, UserStore, WatchUsers},
        model::{
            Id, Timestamp,
            cursor::PageCursor,
            palette::{HexColor, PalettePostContent, Title},
            user::{User, Username},
        },
    };
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};
    use time::{Duration as TimeDuration, macros::utc_datetime};

    fn content(title: &str) -> PalettePostContent {
        PalettePostContent::new(
            Title::new(title.to_owned()).unwrap(),
            String::new(),
            false,
            ["#000", "#777", "#fff"]
                .into_iter()
                .map(|c| HexColor::new(c.to_owned()).unwrap())
                .collect(),
            ["mono".to_owned()],
        )
        .unwrap()
    }

    fn minutes_after_base(minutes: i64) -> Timestamp {
        Timestamp::from(utc_datetime!(2024-06-01 00:00) + TimeDuration::minutes(minutes))
    }

    #[tokio::test]
    async fn pages_newest_first_after_cursor() {
        let store = MemoryStore::new();
        let owner = Id::new("owner").unwrap();
        for minute in 0..5 {
            store.insert_palette(owner.clone(), content("p"), minutes_after_base(minute));
        }

        let first = store.fetch_palette_page(None, 2).await.unwrap();
        let times: Vec<_> = first.iter().map(|p| p.created_at).collect();
        assert_eq!(times, vec![minutes_after_base(4), minutes_after_base(3)]);

        let cursor = PageCursor::after(first.last().unwrap());
        let second = store.fetch_palette_page(Some(cursor), 10).await.unwrap();
        let times: Vec<_> = second.iter().map(|p| p.created_at).collect();
        assert_eq!(
            times,
            vec![minutes_after_base(2), minutes_after_base(1), minutes_after_base(0)]
        );
        assert_eq!(store.count_palettes().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn created_at_strictly_increases() {
        let store = MemoryStore::new();
        let owner = Id::new("owner").unwrap();

        let a = store.create_palette(&owner, &content("a")).await.unwrap();
        let b = store.create_palette(&owner, &content("b")).await.unwrap();
        assert!(b.created_at > a.created_at);
        assert_eq!(a.owner, owner);
    }

    #[tokio::test]
    async fn writes_are_owner_only() {
        let store = MemoryStore::new();
        let owner = Id::new("owner").unwrap();
        let other = Id::new("other").unwrap();
        let post = store.create_palette(&owner, &content("mine")).await.unwrap();

        assert!(matches!(
            store.update_palette(&other, &post.id, &content("theirs")).await,
            Err(StoreError::PermissionDenied(_))
        ));
        assert!(matches!(
            store.delete_palette(&other, &post.id).await,
            Err(StoreError::PermissionDenied(_))
        ));

        store.update_palette(&owner, &post.id, &content("renamed")).await.unwrap();
        let fetched = store.fetch_palette(&post.id).await.unwrap().unwrap();
        assert_eq!(fetched.content.title().get(), "renamed");

        store.delete_palette(&owner, &post.id).await.unwrap();
        assert!(store.fetch_palette(&post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn likes_are_unique_per_user() {
        let store = MemoryStore::new();
        let post = Id::new("post").unwrap();
        let alice = Id::new("alice").unwrap();
        let bob = Id::new("bob").unwrap();

        store.create_like(&alice, &post).await.unwrap();
        store.create_like(&alice, &post).await.unwrap();
        store.create_like(&bob, &post).await.unwrap();
        assert_eq!(store.count_likes(&post).await.unwrap(), 2);
        assert!(store.fetch_like(&post, &alice).await.unwrap().is_some());

        store.delete_like(&alice, &post).await.unwrap();
        assert_eq!(store.count_likes(&post).await.unwrap(), 1);
        assert!(store.fetch_like(&post, &alice).await.unwrap().is_none());
        assert_eq!(store.like_writes(), 4);
    }

    #[tokio::test]
    async fn deleting_a_palette_deletes_its_likes() {
        let store = MemoryStore::new();
        let owner = Id::new("owner").unwrap();
        let fan = Id::new("fan").unwrap();
        let post = store.create_palette(&owner, &content("short-lived")).await.unwrap();
        store.create_like(&fan, &post.id).await.unwrap();

        store.delete_palette(&owner, &post.id).await.unwrap();
        assert_eq!(store.count_likes(&post.id).await.unwrap(), 0);
        assert!(store.fetch_like(&post.id, &fan).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_and_latency() {
        let store = MemoryStore::new();
        store.set_latency(Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        store.count_palettes().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));

        store.set_offline(true);
        assert!(matches!(
            store.count_palettes().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn watch_user_delivers_current_and_changes() {
        let store = MemoryStore::new();
        let uid = Id::new("alice").unwrap();
        store.insert_user(User {
            uid: uid.clone(),
            username: None,
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let subscription = store.watch_user(
            &uid,
            Box::new(move |user| {
                recorded
                    .lock()
                    .push(user.and_then(|u| u.username.clone()).map(Username::into_inner));
            }),
        );

        let username = Username::new("alice".to_owned()).unwrap();
        store.set_username(&uid, &username).await.unwrap();
        store.remove_user(&uid);
        subscription.unsubscribe();
        store.set_username(&uid, &username).await.unwrap();

        assert_eq!(*seen.lock(), vec![None, Some("alice".to_owned()), None]);
        assert_eq!(
            store.fetch_user_by_username(&username).await.unwrap().map(|u| u.uid),
            Some(uid)
        );
    }
}
