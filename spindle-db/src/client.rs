use crate::record::{
    AuthorPreviewRecord, PostRecord, UserRecord, id, snowflake, snowflakes,
};
use async_trait::async_trait;
use spindle_common::{
    model::{
        Id, ModelValidationError, SpindleSnowflakeGenerator,
        post::{CreatePost, Post, PostMarker},
        user::{AuthorPreview, User, UserMarker},
    },
    snowflake::{ProcessId, SnowflakeTimestampError, WorkerId},
};
use spindle_core::{
    error::{StoreError, StoreResult},
    links::{DanglingChild, LinkReport, OrphanReply, UnlinkedThread},
    store::{Connect, LinkAudit, PostStore, UserStore},
};
use sqlx::{
    PgPool,
    migrate::{MigrateError, Migrator},
    postgres::PgPoolOptions,
    query, query_as, query_scalar,
};
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Error migrating the database: {0}")]
    Migrate(#[from] MigrateError),
    #[error("Error generating a snowflake: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error("{kind} with id {id} does not exist")]
    Missing { kind: &'static str, id: u64 },
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Data(err) => StoreError::Data(err),
            DbError::Missing { kind, id } => StoreError::Missing { kind, id },
            DbError::Sqlx(
                err @ (sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed),
            ) => StoreError::unreachable(err),
            DbError::Migrate(err) => StoreError::unreachable(err),
            other => StoreError::backend(other),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL-backed store. The pool is opened (and migrations run) on first
/// use and shared afterwards.
pub struct DbClient {
    database_url: String,
    pool_config: PoolConfig,
    pool: OnceCell<PgPool>,
    snowflake_generator: Mutex<SpindleSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(
        database_url: impl Into<String>,
        pool_config: PoolConfig,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Self {
        let snowflake_generator =
            Mutex::new(SpindleSnowflakeGenerator::new(worker_id, process_id));

        Self {
            database_url: database_url.into(),
            pool_config,
            pool: OnceCell::new(),
            snowflake_generator,
        }
    }

    /// Returns the shared pool, opening it first if needed. Concurrent first
    /// callers wait for a single initialisation.
    pub async fn pool(&self) -> Result<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                debug!(
                    max_connections = self.pool_config.max_connections,
                    "Opening database pool"
                );
                let pool = PgPoolOptions::new()
                    .max_connections(self.pool_config.max_connections)
                    .acquire_timeout(self.pool_config.acquire_timeout)
                    .connect(&self.database_url)
                    .await?;
                MIGRATOR.run(&pool).await?;
                info!("Database pool ready");
                Ok::<_, DbError>(pool)
            })
            .await
    }

    fn next_snowflake(&self) -> Result<i64> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake.get().cast_signed())
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let post_snowflake = self.next_snowflake()?;

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts
                (post_snowflake, content, user_snowflake, community_snowflake, parent_snowflake)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING
                post_snowflake,
                content,
                user_snowflake,
                community_snowflake,
                parent_snowflake,
                child_snowflakes,
                created_at
            ",
        )
        .bind(post_snowflake)
        .bind(post.text.get())
        .bind(snowflake(post.author))
        .bind(post.community.map(snowflake))
        .bind(post.parent_id.map(snowflake))
        .fetch_one(self.pool().await?)
        .await?;

        Ok(Post::try_from(record)?)
    }

    pub async fn push_child(&self, parent: Id<PostMarker>, child: Id<PostMarker>) -> Result<()> {
        let result = query(
            "
            UPDATE posts.posts
            SET child_snowflakes = CASE
                WHEN $2 = ANY(child_snowflakes) THEN child_snowflakes
                ELSE array_append(child_snowflakes, $2)
            END
            WHERE post_snowflake = $1
            ",
        )
        .bind(snowflake(parent))
        .bind(snowflake(child))
        .execute(self.pool().await?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Missing {
                kind: "Post",
                id: parent.get(),
            });
        }
        Ok(())
    }

    pub async fn select_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                post_snowflake,
                content,
                user_snowflake,
                community_snowflake,
                parent_snowflake,
                child_snowflakes,
                created_at
            FROM
                posts.posts
            WHERE
                post_snowflake = $1
            ",
        )
        .bind(snowflake(post_id))
        .fetch_optional(self.pool().await?)
        .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    pub async fn select_posts(&self, post_ids: &[Id<PostMarker>]) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT
                post_snowflake,
                content,
                user_snowflake,
                community_snowflake,
                parent_snowflake,
                child_snowflakes,
                created_at
            FROM
                posts.posts
            WHERE
                post_snowflake = ANY($1)
            ",
        )
        .bind(snowflakes(post_ids))
        .fetch_all(self.pool().await?)
        .await?;

        Ok(records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub async fn count_roots(&self) -> Result<u64> {
        let count: i64 = query_scalar(
            "
            SELECT COUNT(*)
            FROM posts.posts
            WHERE parent_snowflake IS NULL
            ",
        )
        .fetch_one(self.pool().await?)
        .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn select_root_posts(&self, skip: u64, limit: u64) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT
                post_snowflake,
                content,
                user_snowflake,
                community_snowflake,
                parent_snowflake,
                child_snowflakes,
                created_at
            FROM
                posts.posts
            WHERE
                parent_snowflake IS NULL
            ORDER BY
                created_at DESC,
                post_snowflake DESC
            OFFSET $1
            LIMIT $2
            ",
        )
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool().await?)
        .await?;

        Ok(records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub async fn select_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                user_snowflake,
                handle,
                name,
                image,
                thread_snowflakes
            FROM
                users.users
            WHERE
                user_snowflake = $1
            ",
        )
        .bind(snowflake(user_id))
        .fetch_optional(self.pool().await?)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    pub async fn select_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<User>> {
        let records = query_as::<_, UserRecord>(
            "
            SELECT
                user_snowflake,
                handle,
                name,
                image,
                thread_snowflakes
            FROM
                users.users
            WHERE
                user_snowflake = ANY($1)
            ",
        )
        .bind(snowflakes(user_ids))
        .fetch_all(self.pool().await?)
        .await?;

        Ok(records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?)
    }

    pub async fn select_author_previews(
        &self,
        user_ids: &[Id<UserMarker>],
    ) -> Result<Vec<AuthorPreview>> {
        let records = query_as::<_, AuthorPreviewRecord>(
            "
            SELECT
                user_snowflake,
                name,
                image
            FROM
                users.users
            WHERE
                user_snowflake = ANY($1)
            ",
        )
        .bind(snowflakes(user_ids))
        .fetch_all(self.pool().await?)
        .await?;

        Ok(records.into_iter().map(AuthorPreview::from).collect())
    }

    pub async fn push_thread(&self, user: Id<UserMarker>, post: Id<PostMarker>) -> Result<()> {
        let result = query(
            "
            UPDATE users.users
            SET thread_snowflakes = CASE
                WHEN $2 = ANY(thread_snowflakes) THEN thread_snowflakes
                ELSE array_append(thread_snowflakes, $2)
            END
            WHERE user_snowflake = $1
            ",
        )
        .bind(snowflake(user))
        .bind(snowflake(post))
        .execute(self.pool().await?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Missing {
                kind: "User",
                id: user.get(),
            });
        }
        Ok(())
    }

    pub async fn scan_links(&self) -> Result<LinkReport> {
        let pool = self.pool().await?;

        let orphan_replies = query_as::<_, (i64, i64)>(
            "
            SELECT reply.post_snowflake, reply.parent_snowflake
            FROM posts.posts reply
            JOIN posts.posts parent ON parent.post_snowflake = reply.parent_snowflake
            WHERE NOT (reply.post_snowflake = ANY(parent.child_snowflakes))
            ",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(reply, parent)| OrphanReply {
            reply: id(reply),
            parent: id(parent),
        })
        .collect();

        let dangling_children = query_as::<_, (i64, i64)>(
            "
            SELECT parent.post_snowflake, linked.child_snowflake
            FROM posts.posts parent
            CROSS JOIN LATERAL unnest(parent.child_snowflakes) AS linked(child_snowflake)
            LEFT JOIN posts.posts child ON child.post_snowflake = linked.child_snowflake
            WHERE child.parent_snowflake IS DISTINCT FROM parent.post_snowflake
            ",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(parent, child)| DanglingChild {
            parent: id(parent),
            child: id(child),
        })
        .collect();

        let unlinked_threads = query_as::<_, (i64, i64)>(
            "
            SELECT posts.post_snowflake, users.user_snowflake
            FROM posts.posts posts
            JOIN users.users users ON users.user_snowflake = posts.user_snowflake
            WHERE posts.parent_snowflake IS NULL
                AND NOT (posts.post_snowflake = ANY(users.thread_snowflakes))
            ",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(post, author)| UnlinkedThread {
            post: id(post),
            author: id(author),
        })
        .collect();

        let mut report = LinkReport {
            orphan_replies,
            dangling_children,
            unlinked_threads,
        };
        report.normalize();
        Ok(report)
    }
}

#[async_trait]
impl Connect for DbClient {
    async fn connect(&self) -> StoreResult<()> {
        self.pool().await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for DbClient {
    async fn insert_post(&self, post: &CreatePost) -> StoreResult<Post> {
        Ok(self.create_post(post).await?)
    }

    async fn append_child(
        &self,
        parent: Id<PostMarker>,
        child: Id<PostMarker>,
    ) -> StoreResult<()> {
        Ok(self.push_child(parent, child).await?)
    }

    async fn fetch_post(&self, id: Id<PostMarker>) -> StoreResult<Option<Post>> {
        Ok(self.select_post(id).await?)
    }

    async fn fetch_posts(&self, ids: &[Id<PostMarker>]) -> StoreResult<Vec<Post>> {
        Ok(self.select_posts(ids).await?)
    }

    async fn count_root_posts(&self) -> StoreResult<u64> {
        Ok(self.count_roots().await?)
    }

    async fn fetch_root_posts(&self, skip: u64, limit: u64) -> StoreResult<Vec<Post>> {
        Ok(self.select_root_posts(skip, limit).await?)
    }
}

#[async_trait]
impl UserStore for DbClient {
    async fn fetch_user(&self, id: Id<UserMarker>) -> StoreResult<Option<User>> {
        Ok(self.select_user(id).await?)
    }

    async fn fetch_users(&self, ids: &[Id<UserMarker>]) -> StoreResult<Vec<User>> {
        Ok(self.select_users(ids).await?)
    }

    async fn fetch_author_previews(
        &self,
        ids: &[Id<UserMarker>],
    ) -> StoreResult<Vec<AuthorPreview>> {
        Ok(self.select_author_previews(ids).await?)
    }

    async fn append_thread(&self, user: Id<UserMarker>, post: Id<PostMarker>) -> StoreResult<()> {
        Ok(self.push_thread(user, post).await?)
    }
}

#[async_trait]
impl LinkAudit for DbClient {
    async fn find_link_issues(&self) -> StoreResult<LinkReport> {
        Ok(self.scan_links().await?)
    }
}
