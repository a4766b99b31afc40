//! Comment board
//!
//! Anyone may post. Editing and deleting require the caller's identity to
//! match the address stored on the comment; a mismatch is a silent no-op so
//! that callers cannot probe which comments belong to whom.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::identity::{display_label, IdentityKey};
use crate::models::comment::COMMENTS;
use crate::models::{Comment, CommentWithId};
use crate::storage::{LiveStore, Snapshot, Storage, StorageResult, Subscription};

#[derive(Clone)]
pub struct CommentBoard {
    store: Arc<LiveStore>,
}

impl CommentBoard {
    pub fn new(store: Arc<LiveStore>) -> Self {
        Self { store }
    }

    /// Live list of all comments in key order.
    pub async fn list_comments(&self) -> StorageResult<CommentFeed> {
        Ok(CommentFeed {
            subscription: self.store.subscribe(COMMENTS).await?,
        })
    }

    /// All comments, read once.
    pub async fn comments(&self) -> StorageResult<Vec<CommentWithId>> {
        let entries = self.store.children(COMMENTS).await?;
        Ok(decode_comments(&Snapshot { entries }))
    }

    /// Post `text` as `User<label>: <text>`. Blank text is ignored.
    ///
    /// Without an identity the comment is still posted, labelled with the
    /// placeholder and owned by nobody.
    pub async fn add_comment(
        &self,
        text: &str,
        author: Option<&IdentityKey>,
    ) -> StorageResult<Option<String>> {
        if text.trim().is_empty() {
            tracing::debug!("ignoring blank comment");
            return Ok(None);
        }

        let ip_address = author.map(IdentityKey::as_str).unwrap_or_default();
        let comment = Comment {
            ip_address: ip_address.to_string(),
            text: format!("User{}: {}", display_label(ip_address), text),
        };

        let id = self
            .store
            .push(COMMENTS, serde_json::to_value(&comment)?)
            .await?;
        tracing::info!(comment_id = %id, "comment added");
        Ok(Some(id))
    }

    /// Current text of the comment if `caller` owns it.
    pub async fn begin_edit(
        &self,
        id: &str,
        caller: &IdentityKey,
    ) -> StorageResult<Option<String>> {
        Ok(self.fetch_owned(id, caller).await?.map(|c| c.text))
    }

    /// Replace the text of an owned comment. The author field is left alone.
    /// Returns whether anything was written.
    pub async fn commit_edit(
        &self,
        id: &str,
        new_text: &str,
        caller: &IdentityKey,
    ) -> StorageResult<bool> {
        if new_text.trim().is_empty() {
            tracing::debug!(comment_id = %id, "ignoring blank edit");
            return Ok(false);
        }

        // Ownership is checked again here; the caller's address may have
        // changed since the edit began.
        if self.fetch_owned(id, caller).await?.is_none() {
            return Ok(false);
        }

        let mut fields = Map::new();
        fields.insert("text".to_string(), Value::from(new_text));
        let updated = self.store.update(COMMENTS, id, fields).await?;
        if updated {
            tracing::info!(comment_id = %id, "comment edited");
        }
        Ok(updated)
    }

    /// Permanently remove an owned comment. Returns whether it was removed.
    pub async fn delete_comment(&self, id: &str, caller: &IdentityKey) -> StorageResult<bool> {
        if self.fetch_owned(id, caller).await?.is_none() {
            return Ok(false);
        }

        let removed = self.store.remove(COMMENTS, id).await?;
        if removed {
            tracing::info!(comment_id = %id, "comment deleted");
        }
        Ok(removed)
    }

    async fn fetch_owned(&self, id: &str, caller: &IdentityKey) -> StorageResult<Option<Comment>> {
        let Some(value) = self.store.get(COMMENTS, id).await? else {
            tracing::debug!(comment_id = %id, "comment not found");
            return Ok(None);
        };

        let comment: Comment = serde_json::from_value(value)?;
        if comment.is_owned_by(caller) {
            Ok(Some(comment))
        } else {
            tracing::debug!(comment_id = %id, "ownership check denied");
            Ok(None)
        }
    }
}

fn decode_comments(snapshot: &Snapshot) -> Vec<CommentWithId> {
    snapshot
        .decode::<Comment>()
        .into_iter()
        .map(|(id, comment)| CommentWithId { id, comment })
        .collect()
}

/// Live comment list backed by a change feed.
pub struct CommentFeed {
    subscription: Subscription,
}

impl CommentFeed {
    pub fn current(&self) -> Vec<CommentWithId> {
        decode_comments(&self.subscription.current())
    }

    pub async fn next(&mut self) -> Option<Vec<CommentWithId>> {
        let snapshot = self.subscription.next().await?;
        Some(decode_comments(&snapshot))
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

/// Edit dialog state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditState {
    #[default]
    Idle,
    Editing { id: String, draft: String },
}

/// Board operations plus the single edit dialog of a page load.
pub struct CommentEditor {
    board: CommentBoard,
    state: EditState,
}

impl CommentEditor {
    pub fn new(board: CommentBoard) -> Self {
        Self {
            board,
            state: EditState::Idle,
        }
    }

    pub fn board(&self) -> &CommentBoard {
        &self.board
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    /// Open the dialog pre-filled with the comment's text. Returns whether it
    /// opened; a non-owner sees nothing happen.
    pub async fn begin_edit(&mut self, id: &str, caller: &IdentityKey) -> StorageResult<bool> {
        match self.board.begin_edit(id, caller).await? {
            Some(text) => {
                self.state = EditState::Editing {
                    id: id.to_string(),
                    draft: text,
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the draft text. Ignored when the dialog is closed.
    pub fn set_draft(&mut self, text: &str) {
        if let EditState::Editing { draft, .. } = &mut self.state {
            *draft = text.to_string();
        }
    }

    /// Save the draft of the comment being edited. The dialog closes only if
    /// the write happened.
    pub async fn commit_edit(&mut self, caller: &IdentityKey) -> StorageResult<bool> {
        let EditState::Editing { id, draft } = &self.state else {
            return Ok(false);
        };

        let saved = self.board.commit_edit(id, draft, caller).await?;
        if saved {
            self.state = EditState::Idle;
        }
        Ok(saved)
    }

    /// Close the dialog, dropping the draft.
    pub fn cancel_edit(&mut self) {
        self.state = EditState::Idle;
    }

    pub async fn delete_comment(&mut self, id: &str, caller: &IdentityKey) -> StorageResult<bool> {
        let removed = self.board.delete_comment(id, caller).await?;
        if removed && matches!(&self.state, EditState::Editing { id: editing, .. } if editing == id) {
            self.state = EditState::Idle;
        }
        Ok(removed)
    }
}
