use spindle_common::model::{
    Id, ModelValidationError,
    post::{Post, PostText},
    user::{AuthorPreview, User, UserHandle},
};
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, sqlx::FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub content: String,
    pub user_snowflake: i64,
    pub community_snowflake: Option<i64>,
    pub parent_snowflake: Option<i64>,
    pub child_snowflakes: Vec<i64>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, sqlx::FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub handle: String,
    pub name: String,
    pub image: Option<String>,
    pub thread_snowflakes: Vec<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, sqlx::FromRow)]
pub(crate) struct AuthorPreviewRecord {
    pub user_snowflake: i64,
    pub name: String,
    pub image: Option<String>,
}

pub(crate) fn id<Marker>(snowflake: i64) -> Id<Marker> {
    Id::from_signed(snowflake)
}

pub(crate) fn snowflake<Marker>(id: Id<Marker>) -> i64 {
    id.to_signed()
}

pub(crate) fn snowflakes<Marker: Copy>(ids: &[Id<Marker>]) -> Vec<i64> {
    ids.iter().copied().map(snowflake).collect()
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: id(value.post_snowflake),
            text: PostText::new(value.content)?,
            author: id(value.user_snowflake),
            community: value.community_snowflake.map(id),
            parent_id: value.parent_snowflake.map(id),
            children: value.child_snowflakes.into_iter().map(id).collect(),
            created_at: value.created_at,
        })
    }
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: id(value.user_snowflake),
            handle: UserHandle::new(value.handle)?,
            name: value.name,
            image: value.image,
            threads: value.thread_snowflakes.into_iter().map(id).collect(),
        })
    }
}

impl From<AuthorPreviewRecord> for AuthorPreview {
    fn from(value: AuthorPreviewRecord) -> Self {
        Self {
            id: id(value.user_snowflake),
            name: value.name,
            image: value.image,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::record::{PostRecord, UserRecord, id, snowflake};
    use spindle_common::model::{
        Id, ModelValidationError,
        post::{Post, PostMarker},
        user::User,
    };
    use time::macros::datetime;

    #[test]
    fn snowflakes_survive_the_sign_cast() {
        let large: Id<PostMarker> = u64::MAX.into();
        assert_eq!(snowflake(large), -1);
        assert_eq!(id::<PostMarker>(snowflake(large)), large);
    }

    #[test]
    fn post_record_keeps_reply_order() {
        let record = PostRecord {
            post_snowflake: 10,
            content: "hello".to_owned(),
            user_snowflake: 1,
            community_snowflake: None,
            parent_snowflake: Some(3),
            child_snowflakes: vec![30, 20, 40],
            created_at: datetime!(2025-06-01 12:00 UTC),
        };

        let post = Post::try_from(record).unwrap();
        assert_eq!(post.parent_id, Some(3.into()));
        assert_eq!(
            post.children,
            vec![30u64.into(), 20u64.into(), 40u64.into()] as Vec<Id<PostMarker>>
        );
    }

    #[test]
    fn blank_stored_content_is_invalid() {
        let record = PostRecord {
            post_snowflake: 10,
            content: "  ".to_owned(),
            user_snowflake: 1,
            community_snowflake: None,
            parent_snowflake: None,
            child_snowflakes: Vec::new(),
            created_at: datetime!(2025-06-01 12:00 UTC),
        };

        assert!(matches!(
            Post::try_from(record),
            Err(ModelValidationError::PostText(_))
        ));
    }

    #[test]
    fn overlong_handle_is_invalid() {
        let record = UserRecord {
            handle: "x".repeat(51),
            ..UserRecord::default()
        };

        assert!(matches!(
            User::try_from(record),
            Err(ModelValidationError::UserHandle(_))
        ));
    }
}
