//! One page load: resolve identity once, record one visit, then serve the
//! counter and the comment board for as long as the page lives.

use serde::Serialize;
use std::sync::Arc;

use crate::comments::{CommentBoard, CommentEditor, CommentFeed};
use crate::config::ProfileConfig;
use crate::identity::{IdentityKey, IdentityResolver, IdentityState};
use crate::models::CommentView;
use crate::storage::{LiveStore, StorageResult};
use crate::visits::{TotalVisits, VisitCounter, VisitTracker};

/// Everything the page renders.
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub profile: ProfileConfig,
    pub total_visits: i64,
    pub comments: Vec<CommentView>,
    /// An edit dialog is open
    pub editing: Option<String>,
}

pub struct PageSession {
    resolver: Arc<dyn IdentityResolver>,
    profile: ProfileConfig,
    identity: IdentityState,
    visits: VisitCounter,
    tracker: VisitTracker,
    editor: CommentEditor,
    totals: Option<TotalVisits>,
    feed: Option<CommentFeed>,
}

impl PageSession {
    pub fn new(
        store: Arc<LiveStore>,
        resolver: Arc<dyn IdentityResolver>,
        profile: ProfileConfig,
    ) -> Self {
        let visits = VisitCounter::new(Arc::clone(&store));
        Self {
            resolver,
            profile,
            identity: IdentityState::Unresolved,
            tracker: VisitTracker::new(visits.clone()),
            visits,
            editor: CommentEditor::new(CommentBoard::new(store)),
            totals: None,
            feed: None,
        }
    }

    /// Mount the page: open both change feeds, resolve the identity and
    /// record the visit. Calling it again does nothing new.
    ///
    /// A failed identity lookup is logged and leaves the page anonymous;
    /// only store failures are returned.
    pub async fn load(&mut self) -> StorageResult<()> {
        if self.totals.is_none() {
            self.totals = Some(self.visits.total_visits().await?);
        }
        if self.feed.is_none() {
            self.feed = Some(self.editor.board().list_comments().await?);
        }

        if !self.identity.is_settled() {
            self.identity = match self.resolver.resolve().await {
                Ok(key) => {
                    self.tracker.resolve(key.clone());
                    IdentityState::Resolved(key)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not resolve visitor identity, continuing anonymously");
                    IdentityState::Failed
                }
            };
        }

        self.tracker.record().await?;
        Ok(())
    }

    pub fn identity(&self) -> &IdentityState {
        &self.identity
    }

    pub fn tracker(&self) -> &VisitTracker {
        &self.tracker
    }

    pub fn editor(&self) -> &CommentEditor {
        &self.editor
    }

    pub async fn add_comment(&self, text: &str) -> StorageResult<Option<String>> {
        self.editor
            .board()
            .add_comment(text, self.identity.key())
            .await
    }

    pub async fn begin_edit(&mut self, id: &str) -> StorageResult<bool> {
        match self.identity.key() {
            Some(key) => self.editor.begin_edit(id, key).await,
            None => Ok(false),
        }
    }

    pub fn set_draft(&mut self, text: &str) {
        self.editor.set_draft(text);
    }

    pub async fn commit_edit(&mut self) -> StorageResult<bool> {
        match self.identity.key() {
            Some(key) => self.editor.commit_edit(key).await,
            None => Ok(false),
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editor.cancel_edit();
    }

    pub async fn delete_comment(&mut self, id: &str) -> StorageResult<bool> {
        match self.identity.key() {
            Some(key) => self.editor.delete_comment(id, key).await,
            None => Ok(false),
        }
    }

    /// Wait until the comment list changes and return the new view.
    pub async fn next_comments(&mut self) -> Option<Vec<CommentView>> {
        let comments = self.feed.as_mut()?.next().await?;
        let caller = self.identity.key();
        Some(comments.iter().map(|c| c.view_for(caller)).collect())
    }

    /// Wait until the visit tally changes.
    pub async fn next_total(&mut self) -> Option<i64> {
        self.totals.as_mut()?.next().await
    }

    /// Render from the latest snapshots. Empty until `load` ran.
    pub fn view(&self) -> PageView {
        let caller: Option<&IdentityKey> = self.identity.key();
        PageView {
            profile: self.profile.clone(),
            total_visits: self.totals.as_ref().map(TotalVisits::current).unwrap_or(0),
            comments: self
                .feed
                .as_ref()
                .map(|feed| feed.current().iter().map(|c| c.view_for(caller)).collect())
                .unwrap_or_default(),
            editing: match self.editor.state() {
                crate::comments::EditState::Editing { draft, .. } => Some(draft.clone()),
                crate::comments::EditState::Idle => None,
            },
        }
    }

    /// Unmount: close both change feeds and drop any open edit dialog.
    pub fn close(&mut self) {
        if let Some(totals) = self.totals.take() {
            totals.unsubscribe();
        }
        if let Some(feed) = self.feed.take() {
            feed.unsubscribe();
        }
        self.editor.cancel_edit();
    }
}
