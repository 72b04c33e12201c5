//! Archiver core: pure domain logic and the run state machine.
//!
//! Nothing in this crate touches the network or the filesystem. The engine
//! feeds it messages and executes the effects it returns.
mod effect;
mod images;
mod links;
mod msg;
mod slug;
mod source;
mod state;
mod summary;
mod update;

pub use effect::Effect;
pub use images::{sequential_filename, ImageSequence};
pub use links::{normalize_url, relative_href, LinkMap, LinkMapBuilder, LinkReport};
pub use msg::{Msg, PostOutcome};
pub use slug::{
    derive_slug, identifier_date, sanitize_component, ExistingPost, LocationAllocator,
    PostLocation,
};
pub use source::{parse_source_list, SourceItem, SourceKind};
pub use state::{ItemId, PostEntry, PostFailure, PostStatus, RunPhase, RunState, Stage};
pub use summary::{FailureRow, RunSummary};
pub use update::update;
