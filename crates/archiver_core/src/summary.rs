use std::fmt;

use crate::state::Stage;

/// One failed post, with enough context to retry it by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRow {
    pub identifier: String,
    pub stage: Stage,
    pub message: String,
}

/// End-of-run counts shown to the user and persisted in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub materialized: usize,
    pub resumed: usize,
    pub failed: usize,
    /// Posts that never reached a terminal state (cancelled run).
    pub pending: usize,
    pub duplicates_skipped: usize,
    pub images_written: usize,
    pub images_skipped: usize,
    pub links_rewritten: usize,
    pub links_unresolved: usize,
    pub cancelled: bool,
    pub link_error: Option<String>,
    pub failures: Vec<FailureRow>,
}

impl RunSummary {
    /// A run is clean when pass 2 did not abort. Per-post failures do not count.
    pub fn is_fatal(&self) -> bool {
        self.link_error.is_some()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "posts: {} materialized, {} already complete, {} failed, {} pending (of {})",
            self.materialized, self.resumed, self.failed, self.pending, self.total
        )?;
        writeln!(
            f,
            "images: {} written, {} skipped",
            self.images_written, self.images_skipped
        )?;
        write!(
            f,
            "links: {} rewritten, {} left unresolved",
            self.links_rewritten, self.links_unresolved
        )?;
        if self.cancelled {
            write!(f, "\nrun was cancelled; links were not resolved")?;
        }
        if let Some(err) = &self.link_error {
            write!(f, "\nlink resolution aborted: {err}")?;
        }
        Ok(())
    }
}
