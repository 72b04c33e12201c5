use std::collections::BTreeMap;

use crate::links::LinkReport;
use crate::slug::{ExistingPost, PostLocation};
use crate::source::SourceItem;
use crate::summary::{FailureRow, RunSummary};

pub type ItemId = u64;

/// Lifecycle of one post within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostStatus {
    #[default]
    Pending,
    Fetched,
    Sanitized,
    Materialized,
    Failed,
}

impl PostStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PostStatus::Materialized | PostStatus::Failed)
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Decode,
    Sanitize,
    Images,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Decode => "decode",
            Stage::Sanitize => "sanitize",
            Stage::Images => "images",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFailure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    /// Pass 1: posts are being materialized.
    Materializing,
    /// Pass 2: every post is terminal and links are being rewritten.
    Resolving,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEntry {
    pub item: SourceItem,
    pub location: PostLocation,
    pub status: PostStatus,
    pub resumed: bool,
    pub images_written: usize,
    pub images_skipped: usize,
    pub failure: Option<PostFailure>,
    /// Set once the engine reported back for this post, whatever the outcome.
    pub(crate) reported: bool,
}

impl PostEntry {
    pub(crate) fn new(item: SourceItem, location: PostLocation) -> Self {
        Self {
            item,
            location,
            status: PostStatus::Pending,
            resumed: false,
            images_written: 0,
            images_skipped: 0,
            failure: None,
            reported: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunState {
    pub(crate) phase: RunPhase,
    pub(crate) group_by_year: bool,
    pub(crate) posts: BTreeMap<ItemId, PostEntry>,
    pub(crate) existing: Vec<ExistingPost>,
    pub(crate) duplicates_skipped: usize,
    pub(crate) cancelled: bool,
    pub(crate) links: Option<LinkReport>,
    pub(crate) link_error: Option<String>,
}

impl RunState {
    pub fn new(group_by_year: bool) -> Self {
        Self {
            group_by_year,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn post(&self, id: ItemId) -> Option<&PostEntry> {
        self.posts.get(&id)
    }

    pub fn posts(&self) -> impl Iterator<Item = (ItemId, &PostEntry)> {
        self.posts.iter().map(|(id, entry)| (*id, entry))
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.posts.values().filter(|p| !p.reported).count()
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.posts.len(),
            duplicates_skipped: self.duplicates_skipped,
            cancelled: self.cancelled,
            ..RunSummary::default()
        };
        for entry in self.posts.values() {
            match entry.status {
                PostStatus::Materialized if entry.resumed => summary.resumed += 1,
                PostStatus::Materialized => summary.materialized += 1,
                PostStatus::Failed => summary.failed += 1,
                _ => summary.pending += 1,
            }
            summary.images_written += entry.images_written;
            summary.images_skipped += entry.images_skipped;
            if let Some(failure) = &entry.failure {
                summary.failures.push(FailureRow {
                    identifier: entry.item.identifier.clone(),
                    stage: failure.stage,
                    message: failure.message.clone(),
                });
            }
        }
        if let Some(links) = self.links {
            summary.links_rewritten = links.links_rewritten;
            summary.links_unresolved = links.links_unresolved;
        }
        summary.link_error = self.link_error.clone();
        summary
    }
}
