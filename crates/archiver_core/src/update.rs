use std::collections::HashSet;

use crate::slug::LocationAllocator;
use crate::source::SourceItem;
use crate::state::{PostEntry, PostStatus, RunPhase};
use crate::{Effect, Msg, PostOutcome, RunState};

/// Pure update function: applies a message to state and returns any effects.
///
/// `ResolveLinks` is only ever emitted once, and only after every post has
/// reported a terminal outcome; a cancelled run finishes without it.
pub fn update(mut state: RunState, msg: Msg) -> (RunState, Vec<Effect>) {
    let effects = match msg {
        Msg::CorpusScanned(existing) => {
            if state.phase == RunPhase::Idle {
                state.existing = existing;
            }
            Vec::new()
        }
        Msg::ItemsLoaded(identifiers) => {
            if state.phase != RunPhase::Idle {
                return (state, Vec::new());
            }
            let mut allocator =
                LocationAllocator::with_existing(state.group_by_year, &state.existing);
            let mut seen = HashSet::new();
            let mut effects = Vec::with_capacity(identifiers.len());
            for identifier in identifiers {
                if !seen.insert(identifier.clone()) {
                    state.duplicates_skipped += 1;
                    continue;
                }
                let id = state.posts.len() as u64 + 1;
                let item = SourceItem::new(identifier);
                let location = allocator.allocate(&item);
                state
                    .posts
                    .insert(id, PostEntry::new(item.clone(), location.clone()));
                effects.push(Effect::Materialize { id, item, location });
            }
            state.phase = RunPhase::Materializing;
            effects.extend(advance(&mut state));
            effects
        }
        Msg::PostProgress { id, status } => {
            if let Some(entry) = state.posts.get_mut(&id) {
                if !entry.status.is_terminal() && !status.is_terminal() {
                    entry.status = status;
                }
            }
            Vec::new()
        }
        Msg::PostDone { id, outcome } => {
            let Some(entry) = state.posts.get_mut(&id) else {
                return (state, Vec::new());
            };
            if entry.reported {
                return (state, Vec::new());
            }
            entry.reported = true;
            match outcome {
                PostOutcome::Materialized {
                    resumed,
                    images_written,
                    images_skipped,
                } => {
                    entry.status = PostStatus::Materialized;
                    entry.resumed = resumed;
                    entry.images_written = images_written;
                    entry.images_skipped = images_skipped;
                }
                PostOutcome::Failed(failure) => {
                    entry.status = PostStatus::Failed;
                    entry.failure = Some(failure);
                }
                PostOutcome::Interrupted => {
                    entry.status = PostStatus::Pending;
                }
            }
            advance(&mut state)
        }
        Msg::CancelRequested => {
            state.cancelled = true;
            advance(&mut state)
        }
        Msg::LinksResolved(report) => {
            if state.phase != RunPhase::Resolving {
                return (state, Vec::new());
            }
            state.links = Some(report);
            state.phase = RunPhase::Finished;
            vec![Effect::Finish]
        }
        Msg::LinkResolutionFailed(reason) => {
            if state.phase != RunPhase::Resolving {
                return (state, Vec::new());
            }
            state.link_error = Some(reason);
            state.phase = RunPhase::Finished;
            vec![Effect::Finish]
        }
    };

    (state, effects)
}

/// Moves from pass 1 to pass 2 once nothing is outstanding.
fn advance(state: &mut RunState) -> Vec<Effect> {
    if state.phase != RunPhase::Materializing || state.outstanding() > 0 {
        return Vec::new();
    }
    if state.cancelled {
        state.phase = RunPhase::Finished;
        vec![Effect::Finish]
    } else {
        state.phase = RunPhase::Resolving;
        vec![Effect::ResolveLinks]
    }
}
