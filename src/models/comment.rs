use serde::{Deserialize, Serialize};

use crate::identity::IdentityKey;

/// Collection holding the comment board.
pub const COMMENTS: &str = "comments";

/// A comment as stored at `comments/<push id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Author's address at posting time; doubles as the ownership token
    pub ip_address: String,
    pub text: String,
}

impl Comment {
    /// Ownership check: exact string equality with the stored author address.
    pub fn is_owned_by(&self, key: &IdentityKey) -> bool {
        self.ip_address == key.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentWithId {
    pub id: String,
    pub comment: Comment,
}

impl CommentWithId {
    pub fn view_for(&self, caller: Option<&IdentityKey>) -> CommentView {
        CommentView {
            id: self.id.clone(),
            text: self.comment.text.clone(),
            owned: caller.is_some_and(|key| self.comment.is_owned_by(key)),
        }
    }
}

/// What a particular caller gets to see of a comment. The author address
/// never leaves the server; only whether the caller owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub text: String,
    pub owned: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct EditCommentRequest {
    pub text: String,
}
