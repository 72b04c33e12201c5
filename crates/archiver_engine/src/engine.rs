use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use archiver_core::{
    update, Effect, ExistingPost, ItemId, LinkReport, Msg, PostFailure, PostLocation, PostOutcome,
    PostStatus, RunState, RunSummary, SourceItem,
};
use archiver_logging::{archive_debug, archive_error, archive_info, archive_warn};
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::extract::ContentExtractor;
use crate::fetch::Fetcher;
use crate::materialize::{MaterializeError, Materializer, MaterializerConfig, ProgressSink};
use crate::persist::ensure_dir;
use crate::post::scan_corpus;
use crate::resolve::{resolve_corpus, ResolveError};
use crate::sanitize::{RuleError, RuleSet, Sanitizer};

#[derive(Clone)]
pub struct EngineConfig {
    pub materializer: MaterializerConfig,
    pub group_by_year: bool,
    /// Posts materialized at the same time. All of them share one fetcher.
    pub concurrency: usize,
}

struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<Msg>,
}

impl ProgressSink for ChannelProgressSink {
    fn progress(&self, id: ItemId, status: PostStatus) {
        let _ = self.tx.send(Msg::PostProgress { id, status });
    }
}

struct Job {
    id: ItemId,
    item: SourceItem,
    location: PostLocation,
}

/// Runs both passes over an input list by feeding the core state machine and
/// executing the effects it asks for.
pub struct ArchiveEngine {
    materializer: Materializer,
    group_by_year: bool,
    concurrency: usize,
}

impl ArchiveEngine {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        rules: &RuleSet,
        config: EngineConfig,
    ) -> Result<Self, RuleError> {
        let sanitizer = Arc::new(Sanitizer::new(rules)?);
        let extractor = Arc::new(ContentExtractor::new(&rules.content_selectors)?);
        Ok(Self {
            materializer: Materializer::new(fetcher, sanitizer, extractor, config.materializer),
            group_by_year: config.group_by_year,
            concurrency: config.concurrency.max(1),
        })
    }

    pub async fn run(&self, identifiers: Vec<String>, cancel: CancellationToken) -> RunSummary {
        let root = &self.materializer.config().output_root;
        let mut state = RunState::new(self.group_by_year);
        if let Err(err) = ensure_dir(root) {
            archive_error!("{err}");
            let (next, _) = update(state, Msg::ItemsLoaded(Vec::new()));
            let (next, _) = update(next, Msg::LinkResolutionFailed(err.to_string()));
            return next.summary();
        }

        let mut queue = VecDeque::new();
        state = apply(state, Msg::CorpusScanned(self.existing_posts().await), &mut queue);
        state = apply(state, Msg::ItemsLoaded(identifiers), &mut queue);

        let mut jobs = Vec::new();
        queue.retain(|effect| match effect {
            Effect::Materialize { id, item, location } => {
                jobs.push(Job {
                    id: *id,
                    item: item.clone(),
                    location: location.clone(),
                });
                false
            }
            _ => true,
        });
        archive_info!("materializing {} posts", jobs.len());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelProgressSink { tx };
        let mut pending = stream::iter(jobs)
            .map(|job| self.run_job(job, &sink, &cancel))
            .buffer_unordered(self.concurrency);

        let mut cancel_seen = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    archive_warn!("cancellation requested; finishing in-flight posts");
                    state = apply(state, Msg::CancelRequested, &mut queue);
                }
                Some(msg) = rx.recv() => {
                    state = apply(state, msg, &mut queue);
                }
                done = pending.next() => match done {
                    Some(msg) => state = apply(state, msg, &mut queue),
                    None => break,
                },
            }
        }
        drop(pending);
        while let Ok(msg) = rx.try_recv() {
            state = apply(state, msg, &mut queue);
        }

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::ResolveLinks => {
                    let msg = match self.resolve_links().await {
                        Ok(report) => Msg::LinksResolved(report),
                        Err(err) => {
                            archive_error!("link resolution aborted: {err}");
                            Msg::LinkResolutionFailed(err.to_string())
                        }
                    };
                    state = apply(state, msg, &mut queue);
                }
                Effect::Finish => break,
                Effect::Materialize { id, .. } => {
                    archive_debug!("ignoring late materialize request for post {id}");
                }
            }
        }

        state.summary()
    }

    /// Pass 2 on its own, over whatever is currently on disk.
    pub async fn resolve_links(&self) -> Result<LinkReport, ResolveError> {
        let config = self.materializer.config();
        let root: PathBuf = config.output_root.clone();
        let document_name = config.document_name.clone();
        tokio::task::spawn_blocking(move || resolve_corpus(&root, &document_name))
            .await
            .map_err(|err| ResolveError::Task(err.to_string()))?
    }

    /// Complete posts already under the output root, so their directories
    /// are neither reallocated nor reused for another source.
    async fn existing_posts(&self) -> Vec<ExistingPost> {
        let config = self.materializer.config();
        let root = config.output_root.clone();
        let document_name = config.document_name.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_corpus(&root, &document_name)).await;
        match scanned {
            Ok(Ok(posts)) => posts
                .into_iter()
                .map(|post| ExistingPost {
                    rel_dir: post.rel_dir,
                    source: post.metadata.source,
                })
                .collect(),
            Ok(Err(err)) => {
                archive_warn!("cannot scan existing posts: {err}");
                Vec::new()
            }
            Err(err) => {
                archive_warn!("corpus scan task failed: {err}");
                Vec::new()
            }
        }
    }

    async fn run_job(&self, job: Job, sink: &ChannelProgressSink, cancel: &CancellationToken) -> Msg {
        let result = self
            .materializer
            .materialize(job.id, &job.item, &job.location, sink, cancel)
            .await;
        let outcome = match result {
            Ok(done) => PostOutcome::Materialized {
                resumed: done.resumed,
                images_written: done.images_written,
                images_skipped: done.images_skipped,
            },
            Err(MaterializeError::Interrupted) => {
                archive_debug!("{} interrupted", job.item.identifier);
                PostOutcome::Interrupted
            }
            Err(err) => {
                let stage = err.stage();
                archive_error!("{} failed at {stage}: {err}", job.item.identifier);
                PostOutcome::Failed(PostFailure {
                    stage,
                    message: err.to_string(),
                })
            }
        };
        Msg::PostDone {
            id: job.id,
            outcome,
        }
    }
}

fn apply(state: RunState, msg: Msg, queue: &mut VecDeque<Effect>) -> RunState {
    let (state, effects) = update(state, msg);
    queue.extend(effects);
    state
}
