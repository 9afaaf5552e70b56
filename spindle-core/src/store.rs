//! Ports the thread service uses to reach persistent state.
//!
//! A single backend usually implements all of them; the service only sees the
//! combined [`Store`].

use crate::{error::StoreResult, links::LinkReport};
use async_trait::async_trait;
use spindle_common::model::{
    Id,
    post::{CreatePost, Post, PostMarker},
    user::{AuthorPreview, User, UserMarker},
};

#[async_trait]
pub trait Connect: Send + Sync {
    /// Establishes the backing connection unless one is already up.
    ///
    /// Must be idempotent and safe to race from several tasks.
    async fn connect(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persists a new post and returns it with its generated id and timestamp.
    async fn insert_post(&self, post: &CreatePost) -> StoreResult<Post>;

    /// Appends `child` to the end of `parent`'s replies. A child that is
    /// already listed is left where it is.
    async fn append_child(&self, parent: Id<PostMarker>, child: Id<PostMarker>)
    -> StoreResult<()>;

    async fn fetch_post(&self, id: Id<PostMarker>) -> StoreResult<Option<Post>>;

    /// Fetches every existing post among `ids`, in no particular order.
    async fn fetch_posts(&self, ids: &[Id<PostMarker>]) -> StoreResult<Vec<Post>>;

    async fn count_root_posts(&self) -> StoreResult<u64>;

    /// Root posts, newest first, ties broken by descending id.
    async fn fetch_root_posts(&self, skip: u64, limit: u64) -> StoreResult<Vec<Post>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn fetch_user(&self, id: Id<UserMarker>) -> StoreResult<Option<User>>;

    async fn fetch_users(&self, ids: &[Id<UserMarker>]) -> StoreResult<Vec<User>>;

    async fn fetch_author_previews(&self, ids: &[Id<UserMarker>])
    -> StoreResult<Vec<AuthorPreview>>;

    /// Appends `post` to the end of `user`'s authored threads unless it is
    /// already listed.
    async fn append_thread(&self, user: Id<UserMarker>, post: Id<PostMarker>) -> StoreResult<()>;
}

#[async_trait]
pub trait LinkAudit: Send + Sync {
    /// Scans for parent/child and author/thread references that disagree.
    async fn find_link_issues(&self) -> StoreResult<LinkReport>;
}

pub trait Store: Connect + PostStore + UserStore + LinkAudit {}

impl<T> Store for T where T: Connect + PostStore + UserStore + LinkAudit + ?Sized {}
