use crate::{
    error::{Result, StoreError, StoreResult, ThreadError},
    invalidate::InvalidationSink,
    links::{LinkReport, RepairSummary},
    store::Store,
};
use serde::Deserialize;
use spindle_common::model::{
    Id,
    community::CommunityMarker,
    post::{CreatePost, Post, PostMarker, PostText},
    user::{AuthorPreview, User, UserMarker},
    view::{FeedPost, PostPage, Replies, ReplyPreview, ThreadNode},
};
use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    num::NonZeroU64,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

pub const DEFAULT_REPLY_DEPTH: usize = 2;
pub const DEFAULT_PAGE_SIZE: NonZeroU64 = NonZeroU64::new(20).unwrap();
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ThreadServiceConfig {
    /// How many levels of replies `fetch_thread_by_id` expands.
    pub reply_depth: usize,
    /// Upper bound for every single store call. `None` waits forever.
    pub store_timeout: Option<Duration>,
    pub default_page_size: NonZeroU64,
}

impl Default for ThreadServiceConfig {
    fn default() -> Self {
        Self {
            reply_depth: DEFAULT_REPLY_DEPTH,
            store_timeout: Some(DEFAULT_STORE_TIMEOUT),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreateThread {
    pub text: String,
    pub author: Id<UserMarker>,
    /// Accepted for compatibility; threads are always stored without a community.
    #[serde(default)]
    pub community_id: Option<Id<CommunityMarker>>,
    pub path: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreateComment {
    pub text: String,
    pub author: Id<UserMarker>,
    pub path: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct PageRequest {
    #[serde(default, alias = "page")]
    pub page_number: Option<NonZeroU64>,
    #[serde(default)]
    pub page_size: Option<NonZeroU64>,
}

impl PageRequest {
    #[must_use]
    pub fn new(page_number: u64, page_size: u64) -> Self {
        Self {
            page_number: NonZeroU64::new(page_number),
            page_size: NonZeroU64::new(page_size),
        }
    }
}

/// Creates, lists and assembles threads on top of a [`Store`].
///
/// Writes touching two records happen as two separate store calls. When the
/// second one fails the first is kept; [`ThreadService::audit_links`] finds
/// the resulting inconsistencies and [`ThreadService::repair_links`] fixes
/// the ones that can be fixed by appending.
#[derive(Clone)]
pub struct ThreadService {
    store: Arc<dyn Store>,
    invalidator: Arc<dyn InvalidationSink>,
    config: ThreadServiceConfig,
}

impl ThreadService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        invalidator: Arc<dyn InvalidationSink>,
        config: ThreadServiceConfig,
    ) -> Self {
        Self {
            store,
            invalidator,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> ThreadServiceConfig {
        self.config
    }

    pub async fn create_thread(&self, thread: CreateThread) -> Result<Id<PostMarker>> {
        let text = PostText::new(thread.text)?;
        if let Some(community) = thread.community_id {
            debug!(%community, "Dropping community, threads are stored without one");
        }

        self.connect().await?;

        let post = self
            .call(
                self.store.insert_post(&CreatePost {
                    text,
                    author: thread.author,
                    community: None,
                    parent_id: None,
                }),
                ThreadError::Create,
            )
            .await?;

        self.call(
            self.store.append_thread(thread.author, post.id),
            ThreadError::Create,
        )
        .await
        .inspect_err(|err| {
            warn!(post = %post.id, author = %thread.author, %err, "Thread stored but not linked to its author");
        })?;

        self.invalidator.invalidate(&thread.path);
        info!(post = %post.id, author = %thread.author, "Created thread");

        Ok(post.id)
    }

    pub async fn add_comment_to_thread(
        &self,
        thread_id: Id<PostMarker>,
        comment: CreateComment,
    ) -> Result<Id<PostMarker>> {
        let text = PostText::new(comment.text)?;

        self.connect().await?;

        let target = self
            .call(self.store.fetch_post(thread_id), ThreadError::Reply)
            .await?
            .ok_or(ThreadError::NotFound(thread_id))?;

        let reply = self
            .call(
                self.store.insert_post(&CreatePost {
                    text,
                    author: comment.author,
                    community: None,
                    parent_id: Some(target.id),
                }),
                ThreadError::Reply,
            )
            .await?;

        self.call(
            self.store.append_child(target.id, reply.id),
            ThreadError::Reply,
        )
        .await
        .inspect_err(|err| {
            warn!(reply = %reply.id, parent = %target.id, %err, "Reply stored but not linked to its parent");
        })?;

        self.invalidator.invalidate(&comment.path);
        info!(reply = %reply.id, parent = %target.id, author = %comment.author, "Added reply");

        Ok(reply.id)
    }

    /// Lists root posts, newest first.
    ///
    /// The total count and the page come from two separate reads, so
    /// `is_next` may be stale when roots are created concurrently.
    pub async fn fetch_posts(&self, page: PageRequest) -> Result<PostPage> {
        let page_number = page.page_number.unwrap_or(NonZeroU64::MIN);
        let page_size = page.page_size.unwrap_or(self.config.default_page_size);
        let skip = (page_number.get() - 1).saturating_mul(page_size.get());

        self.connect().await?;

        let total = self
            .call(self.store.count_root_posts(), ThreadError::Query)
            .await?;
        let roots = self
            .call(
                self.store.fetch_root_posts(skip, page_size.get()),
                ThreadError::Query,
            )
            .await?;

        let author_ids = unique(roots.iter().map(|post| post.author));
        let authors: HashMap<Id<UserMarker>, User> = self
            .call(self.store.fetch_users(&author_ids), ThreadError::Query)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let child_ids = unique(roots.iter().flat_map(|post| post.children.iter().copied()));
        let child_posts = self.fetch_post_map(&child_ids, ThreadError::Query).await?;
        let child_authors = self
            .author_previews(
                unique(child_posts.values().map(|child| child.author)),
                ThreadError::Query,
            )
            .await?;

        let posts: Vec<FeedPost> = roots
            .into_iter()
            .map(|root| {
                let children = root
                    .children
                    .iter()
                    .filter_map(|child_id| {
                        linked_child(&root, child_posts.get(child_id), *child_id)
                    })
                    .map(|child| ReplyPreview {
                        id: child.id,
                        parent_id: child.parent_id,
                        author: child_authors.get(&child.author).cloned(),
                    })
                    .collect();

                FeedPost {
                    id: root.id,
                    author: authors.get(&root.author).cloned(),
                    text: root.text,
                    community: root.community,
                    created_at: root.created_at,
                    children,
                }
            })
            .collect();

        let returned = u64::try_from(posts.len()).unwrap_or(u64::MAX);
        let is_next = total > skip.saturating_add(returned);

        Ok(PostPage { posts, is_next })
    }

    /// Fetches a post with its replies expanded `reply_depth` levels deep.
    pub async fn fetch_thread_by_id(&self, id: Id<PostMarker>) -> Result<ThreadNode> {
        self.connect().await?;

        let post = self
            .call(self.store.fetch_post(id), ThreadError::Fetch)
            .await?
            .ok_or(ThreadError::NotFound(id))?;

        self.resolve_level(vec![post], self.config.reply_depth)
            .await?
            .pop()
            .ok_or(ThreadError::NotFound(id))
    }

    pub async fn fetch_user(&self, id: Id<UserMarker>) -> Result<User> {
        self.connect().await?;

        self.call(self.store.fetch_user(id), ThreadError::Query)
            .await?
            .ok_or(ThreadError::UserNotFound(id))
    }

    pub async fn audit_links(&self) -> Result<LinkReport> {
        self.connect().await?;

        let mut report = self
            .call(self.store.find_link_issues(), ThreadError::Query)
            .await?;
        report.normalize();

        if !report.is_consistent() {
            warn!(
                orphan_replies = report.orphan_replies.len(),
                dangling_children = report.dangling_children.len(),
                unlinked_threads = report.unlinked_threads.len(),
                "Found inconsistent links"
            );
        }

        Ok(report)
    }

    /// Re-appends orphan replies and unlinked threads. Dangling children are
    /// only counted since replies are never removed.
    pub async fn repair_links(&self) -> Result<RepairSummary> {
        let report = self.audit_links().await?;
        let mut summary = RepairSummary {
            dangling_children: report.dangling_children.len(),
            ..RepairSummary::default()
        };

        for orphan in &report.orphan_replies {
            self.call(
                self.store.append_child(orphan.parent, orphan.reply),
                ThreadError::Repair,
            )
            .await?;
            summary.relinked_replies += 1;
        }

        for unlinked in &report.unlinked_threads {
            self.call(
                self.store.append_thread(unlinked.author, unlinked.post),
                ThreadError::Repair,
            )
            .await?;
            summary.relinked_threads += 1;
        }

        info!(?summary, "Repaired links");
        Ok(summary)
    }

    async fn connect(&self) -> Result<()> {
        self.call(self.store.connect(), ThreadError::Connection)
            .await
    }

    /// Runs one store call under the configured timeout.
    async fn call<T>(
        &self,
        operation: impl Future<Output = StoreResult<T>>,
        wrap: impl FnOnce(StoreError) -> ThreadError,
    ) -> Result<T> {
        let result = match self.config.store_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| ThreadError::Timeout(limit))?,
            None => operation.await,
        };

        result.map_err(wrap)
    }

    async fn fetch_post_map(
        &self,
        ids: &[Id<PostMarker>],
        wrap: fn(StoreError) -> ThreadError,
    ) -> Result<HashMap<Id<PostMarker>, Post>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        Ok(self
            .call(self.store.fetch_posts(ids), wrap)
            .await?
            .into_iter()
            .map(|post| (post.id, post))
            .collect())
    }

    async fn author_previews(
        &self,
        ids: Vec<Id<UserMarker>>,
        wrap: fn(StoreError) -> ThreadError,
    ) -> Result<HashMap<Id<UserMarker>, AuthorPreview>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        Ok(self
            .call(self.store.fetch_author_previews(&ids), wrap)
            .await?
            .into_iter()
            .map(|author| (author.id, author))
            .collect())
    }

    /// Turns one level of posts into nodes, resolving their replies while
    /// `depth` allows. Each level costs one post read and one author read.
    fn resolve_level(
        &self,
        posts: Vec<Post>,
        depth: usize,
    ) -> BoxFuture<'_, Result<Vec<ThreadNode>>> {
        Box::pin(async move {
            // the chain ended before the depth limit
            if posts.is_empty() {
                return Ok(Vec::new());
            }

            let authors = self
                .author_previews(unique(posts.iter().map(|post| post.author)), ThreadError::Fetch)
                .await?;

            let replies: HashMap<Id<PostMarker>, ThreadNode> = match depth.checked_sub(1) {
                Some(remaining) => {
                    let child_ids =
                        unique(posts.iter().flat_map(|post| post.children.iter().copied()));
                    let children = self.fetch_post_map(&child_ids, ThreadError::Fetch).await?;
                    self.resolve_level(children.into_values().collect(), remaining)
                        .await?
                        .into_iter()
                        .map(|node| (node.id, node))
                        .collect()
                }
                None => HashMap::new(),
            };

            Ok(posts
                .into_iter()
                .map(|post| {
                    let children = if depth == 0 {
                        Replies::Collapsed(post.children.clone())
                    } else {
                        Replies::Expanded(
                            post.children
                                .iter()
                                .filter_map(|child_id| {
                                    let node = replies.get(child_id);
                                    let linked = node.filter(|node| node.parent_id == Some(post.id));
                                    if linked.is_none() {
                                        warn!(parent = %post.id, child = %child_id, "Skipping dangling reply reference");
                                    }
                                    linked.cloned()
                                })
                                .collect(),
                        )
                    };

                    ThreadNode {
                        id: post.id,
                        author: authors.get(&post.author).cloned(),
                        text: post.text,
                        community: post.community,
                        parent_id: post.parent_id,
                        created_at: post.created_at,
                        children,
                    }
                })
                .collect())
        })
    }
}

fn unique<T: Ord + Copy>(ids: impl Iterator<Item = T>) -> Vec<T> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}

/// Returns the child only if it exists and points back at `parent`.
fn linked_child<'a>(
    parent: &Post,
    child: Option<&'a Post>,
    child_id: Id<PostMarker>,
) -> Option<&'a Post> {
    let linked = child.filter(|child| child.parent_id == Some(parent.id));
    if linked.is_none() {
        warn!(parent = %parent.id, child = %child_id, "Skipping dangling reply reference");
    }
    linked
}
