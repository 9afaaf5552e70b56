//! An in-process [`Store`](crate::Store) for tests and local development.
//!
//! Individual operations can be made to fail, and the whole store can be made
//! unreachable, to exercise the partial-write paths of the thread service.

use crate::{
    error::{StoreError, StoreResult},
    links::{DanglingChild, LinkReport, OrphanReply, UnlinkedThread},
    store::{Connect, LinkAudit, PostStore, UserStore},
};
use async_trait::async_trait;
use spindle_common::{
    model::{
        Id, SpindleSnowflakeGenerator,
        post::{CreatePost, Post, PostMarker},
        user::{AuthorPreview, User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum StoreOp {
    Connect,
    InsertPost,
    AppendChild,
    FetchPost,
    FetchPosts,
    CountRootPosts,
    FetchRootPosts,
    FetchUser,
    FetchUsers,
    FetchAuthorPreviews,
    AppendThread,
    FindLinkIssues,
}

#[derive(Debug)]
struct MemoryState {
    posts: BTreeMap<Id<PostMarker>, Post>,
    users: BTreeMap<Id<UserMarker>, User>,
    snowflake_generator: SpindleSnowflakeGenerator,
    last_created_at: Option<OffsetDateTime>,
    failing: HashSet<StoreOp>,
    unreachable: bool,
    connected: bool,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let snowflake_generator =
            SpindleSnowflakeGenerator::new(WorkerId::default(), ProcessId::default());

        Self {
            state: Mutex::new(MemoryState {
                posts: BTreeMap::new(),
                users: BTreeMap::new(),
                snowflake_generator,
                last_created_at: None,
                failing: HashSet::new(),
                unreachable: false,
                connected: false,
            }),
            latency: None,
        }
    }

    /// Delays every operation by `latency` before it touches the data.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    pub fn fail(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.lock().failing.remove(&op);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    #[must_use]
    pub fn post(&self, id: Id<PostMarker>) -> Option<Post> {
        self.lock().posts.get(&id).cloned()
    }

    #[must_use]
    pub fn posts(&self) -> Vec<Post> {
        self.lock().posts.values().cloned().collect()
    }

    #[must_use]
    pub fn user(&self, id: Id<UserMarker>) -> Option<User> {
        self.lock().users.get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, op: StoreOp) -> StoreResult<MutexGuard<'_, MemoryState>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.lock();
        if state.unreachable {
            return Err(StoreError::unreachable("memory store is offline"));
        }
        if state.failing.contains(&op) {
            return Err(StoreError::backend(format!("injected failure in {op:?}")));
        }
        Ok(state)
    }
}

impl MemoryState {
    /// Timestamps strictly increase so listings have a total order.
    fn next_created_at(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + time::Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl Connect for MemoryStore {
    async fn connect(&self) -> StoreResult<()> {
        self.enter(StoreOp::Connect).await?.connected = true;
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, post: &CreatePost) -> StoreResult<Post> {
        let mut state = self.enter(StoreOp::InsertPost).await?;
        let id: Id<PostMarker> = state
            .snowflake_generator
            .generate()
            .map_err(StoreError::backend)?
            .into();
        let created_at = state.next_created_at();

        let post = Post {
            id,
            text: post.text.clone(),
            author: post.author,
            community: post.community,
            parent_id: post.parent_id,
            children: Vec::new(),
            created_at,
        };
        state.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn append_child(
        &self,
        parent: Id<PostMarker>,
        child: Id<PostMarker>,
    ) -> StoreResult<()> {
        let mut state = self.enter(StoreOp::AppendChild).await?;
        let parent_post = state.posts.get_mut(&parent).ok_or(StoreError::Missing {
            kind: "Post",
            id: parent.get(),
        })?;
        if !parent_post.children.contains(&child) {
            parent_post.children.push(child);
        }
        Ok(())
    }

    async fn fetch_post(&self, id: Id<PostMarker>) -> StoreResult<Option<Post>> {
        let state = self.enter(StoreOp::FetchPost).await?;
        Ok(state.posts.get(&id).cloned())
    }

    async fn fetch_posts(&self, ids: &[Id<PostMarker>]) -> StoreResult<Vec<Post>> {
        let state = self.enter(StoreOp::FetchPosts).await?;
        let wanted: HashSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.posts.get(&id).cloned())
            .collect())
    }

    async fn count_root_posts(&self) -> StoreResult<u64> {
        let state = self.enter(StoreOp::CountRootPosts).await?;
        let count = state.posts.values().filter(|post| post.is_root()).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn fetch_root_posts(&self, skip: u64, limit: u64) -> StoreResult<Vec<Post>> {
        let state = self.enter(StoreOp::FetchRootPosts).await?;
        let mut roots: Vec<&Post> = state.posts.values().filter(|post| post.is_root()).collect();
        roots.sort_unstable_by_key(|post| Reverse((post.created_at, post.id)));

        Ok(roots
            .into_iter()
            .skip(to_usize(skip))
            .take(to_usize(limit))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn fetch_user(&self, id: Id<UserMarker>) -> StoreResult<Option<User>> {
        let state = self.enter(StoreOp::FetchUser).await?;
        Ok(state.users.get(&id).cloned())
    }

    async fn fetch_users(&self, ids: &[Id<UserMarker>]) -> StoreResult<Vec<User>> {
        let state = self.enter(StoreOp::FetchUsers).await?;
        let wanted: HashSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.users.get(&id).cloned())
            .collect())
    }

    async fn fetch_author_previews(
        &self,
        ids: &[Id<UserMarker>],
    ) -> StoreResult<Vec<AuthorPreview>> {
        let state = self.enter(StoreOp::FetchAuthorPreviews).await?;
        let wanted: HashSet<_> = ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.users.get(&id).map(AuthorPreview::from))
            .collect())
    }

    async fn append_thread(&self, user: Id<UserMarker>, post: Id<PostMarker>) -> StoreResult<()> {
        let mut state = self.enter(StoreOp::AppendThread).await?;
        let author = state.users.get_mut(&user).ok_or(StoreError::Missing {
            kind: "User",
            id: user.get(),
        })?;
        if !author.threads.contains(&post) {
            author.threads.push(post);
        }
        Ok(())
    }
}

#[async_trait]
impl LinkAudit for MemoryStore {
    async fn find_link_issues(&self) -> StoreResult<LinkReport> {
        let state = self.enter(StoreOp::FindLinkIssues).await?;
        let mut report = LinkReport::default();

        for post in state.posts.values() {
            if let Some(parent) = post.parent_id
                && let Some(parent_post) = state.posts.get(&parent)
                && !parent_post.children.contains(&post.id)
            {
                report.orphan_replies.push(OrphanReply {
                    reply: post.id,
                    parent,
                });
            }

            for &child in &post.children {
                let points_back = state
                    .posts
                    .get(&child)
                    .is_some_and(|child_post| child_post.parent_id == Some(post.id));
                if !points_back {
                    report.dangling_children.push(DanglingChild {
                        parent: post.id,
                        child,
                    });
                }
            }

            if post.is_root()
                && let Some(author) = state.users.get(&post.author)
                && !author.threads.contains(&post.id)
            {
                report.unlinked_threads.push(UnlinkedThread {
                    post: post.id,
                    author: author.id,
                });
            }
        }

        report.normalize();
        Ok(report)
    }
}
