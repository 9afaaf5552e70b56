use crate::model::{Id, community::CommunityMarker, user::UserMarker};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A post as it is stored, with its adjacency fields unresolved.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: PostText,
    pub author: Id<UserMarker>,
    pub community: Option<Id<CommunityMarker>>,
    pub parent_id: Option<Id<PostMarker>>,
    /// Replies in the order they arrived.
    pub children: Vec<Id<PostMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Post {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub text: PostText,
    pub author: Id<UserMarker>,
    pub community: Option<Id<CommunityMarker>>,
    pub parent_id: Option<Id<PostMarker>>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PostText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Post text must not be blank: {0:?}")]
pub struct InvalidPostTextError(String);

impl PostText {
    pub fn new(text: String) -> Result<Self, InvalidPostTextError> {
        if text.trim().is_empty() {
            Err(InvalidPostTextError(text))
        } else {
            Ok(PostText(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for PostText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostText::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"non-blank post text"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::PostText;

    #[test]
    fn blank_text_is_rejected() {
        assert!(PostText::new(String::new()).is_err());
        assert!(PostText::new(" \n\t".to_owned()).is_err());
        assert_eq!(PostText::new("hello".to_owned()).unwrap().get(), "hello");
    }

    #[test]
    fn deserializing_validates() {
        assert!(serde_json::from_str::<PostText>(r#""""#).is_err());
        assert_eq!(
            serde_json::from_str::<PostText>(r#""hi back""#)
                .unwrap()
                .into_inner(),
            "hi back"
        );
    }
}
