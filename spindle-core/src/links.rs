use serde::{Deserialize, Serialize};
use spindle_common::model::{Id, post::PostMarker, user::UserMarker};

/// A reply that points at its parent but is missing from the parent's replies.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub struct OrphanReply {
    pub reply: Id<PostMarker>,
    pub parent: Id<PostMarker>,
}

/// A reply reference whose post is gone or names another parent.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub struct DanglingChild {
    pub parent: Id<PostMarker>,
    pub child: Id<PostMarker>,
}

/// A root post missing from its author's threads.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
pub struct UnlinkedThread {
    pub post: Id<PostMarker>,
    pub author: Id<UserMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct LinkReport {
    pub orphan_replies: Vec<OrphanReply>,
    pub dangling_children: Vec<DanglingChild>,
    pub unlinked_threads: Vec<UnlinkedThread>,
}

impl LinkReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.orphan_replies.is_empty()
            && self.dangling_children.is_empty()
            && self.unlinked_threads.is_empty()
    }

    /// Sorts every list so reports from different backends compare equal.
    pub fn normalize(&mut self) {
        self.orphan_replies.sort_unstable();
        self.dangling_children.sort_unstable();
        self.unlinked_threads.sort_unstable();
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct RepairSummary {
    pub relinked_replies: usize,
    pub relinked_threads: usize,
    /// Dangling children are reported only; replies are never removed.
    pub dangling_children: usize,
}
