use crate::links::LinkReport;
use crate::slug::ExistingPost;
use crate::state::{ItemId, PostFailure, PostStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Materialized {
        /// The post was already complete on disk; nothing was fetched.
        resumed: bool,
        images_written: usize,
        images_skipped: usize,
    },
    Failed(PostFailure),
    /// Cancellation stopped the post before it was persisted.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Posts already complete under the output root. Only honoured before
    /// the input list is loaded.
    CorpusScanned(Vec<ExistingPost>),
    /// The ordered input list of source identifiers.
    ItemsLoaded(Vec<String>),
    /// Intermediate stage reached by a post (fetched, sanitized).
    PostProgress { id: ItemId, status: PostStatus },
    /// The engine is done with a post.
    PostDone { id: ItemId, outcome: PostOutcome },
    /// The user asked to stop; in-flight posts may still report back.
    CancelRequested,
    /// Pass 2 completed.
    LinksResolved(LinkReport),
    /// Pass 2 aborted, e.g. on an incomplete link map.
    LinkResolutionFailed(String),
}
