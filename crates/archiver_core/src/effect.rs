use crate::slug::PostLocation;
use crate::source::SourceItem;
use crate::state::ItemId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Run pass 1 for one item.
    Materialize {
        id: ItemId,
        item: SourceItem,
        location: PostLocation,
    },
    /// Build the link map and run pass 2. Emitted once, after every post is terminal.
    ResolveLinks,
    /// Nothing left to do for this run.
    Finish,
}
