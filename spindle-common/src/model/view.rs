//! Read-side shapes of posts with their references resolved.

use crate::model::{
    Id,
    community::CommunityMarker,
    post::{PostMarker, PostText},
    user::{AuthorPreview, User},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Who replied to a post, without the reply body.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ReplyPreview {
    pub id: Id<PostMarker>,
    pub parent_id: Option<Id<PostMarker>>,
    pub author: Option<AuthorPreview>,
}

/// A root post as it appears in the paginated listing.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct FeedPost {
    pub id: Id<PostMarker>,
    pub text: PostText,
    pub author: Option<User>,
    pub community: Option<Id<CommunityMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub children: Vec<ReplyPreview>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct PostPage {
    pub posts: Vec<FeedPost>,
    pub is_next: bool,
}

/// A post with its author and replies resolved down to some depth.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ThreadNode {
    pub id: Id<PostMarker>,
    pub text: PostText,
    pub author: Option<AuthorPreview>,
    pub community: Option<Id<CommunityMarker>>,
    pub parent_id: Option<Id<PostMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub children: Replies,
}

/// Replies are either resolved nodes or, past the depth limit, bare ids.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Replies {
    Expanded(Vec<ThreadNode>),
    Collapsed(Vec<Id<PostMarker>>),
}

impl Replies {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Replies::Expanded(nodes) => nodes.len(),
            Replies::Collapsed(ids) => ids.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn expanded(&self) -> Option<&[ThreadNode]> {
        match self {
            Replies::Expanded(nodes) => Some(nodes),
            Replies::Collapsed(_) => None,
        }
    }
}
