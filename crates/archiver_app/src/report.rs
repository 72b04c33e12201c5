use std::path::{Path, PathBuf};

use archiver_core::RunSummary;
use archiver_engine::{ensure_dir, AtomicFileWriter};
use archiver_logging::{archive_error, archive_info};
use serde::{Deserialize, Serialize};

pub const REPORT_FILENAME: &str = ".archiver_report.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ReportedFailure {
    identifier: String,
    stage: String,
    cause: String,
}

/// What the last run did, kept next to the corpus so failed posts can be
/// retried by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RunReport {
    finished_at: String,
    total: usize,
    materialized: usize,
    resumed: usize,
    failed: usize,
    pending: usize,
    duplicates_skipped: usize,
    images_written: usize,
    images_skipped: usize,
    links_rewritten: usize,
    links_unresolved: usize,
    cancelled: bool,
    link_error: Option<String>,
    failures: Vec<ReportedFailure>,
}

impl RunReport {
    fn from_summary(summary: &RunSummary, finished_at: String) -> Self {
        Self {
            finished_at,
            total: summary.total,
            materialized: summary.materialized,
            resumed: summary.resumed,
            failed: summary.failed,
            pending: summary.pending,
            duplicates_skipped: summary.duplicates_skipped,
            images_written: summary.images_written,
            images_skipped: summary.images_skipped,
            links_rewritten: summary.links_rewritten,
            links_unresolved: summary.links_unresolved,
            cancelled: summary.cancelled,
            link_error: summary.link_error.clone(),
            failures: summary
                .failures
                .iter()
                .map(|row| ReportedFailure {
                    identifier: row.identifier.clone(),
                    stage: row.stage.to_string(),
                    cause: row.message.clone(),
                })
                .collect(),
        }
    }
}

/// Writes the report into `output_dir`. Failures are logged, never fatal.
pub fn save_report(output_dir: &Path, summary: &RunSummary) {
    if let Err(err) = ensure_dir(output_dir) {
        archive_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let report = RunReport::from_summary(summary, chrono::Utc::now().to_rfc3339());
    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&report, pretty) {
        Ok(text) => text,
        Err(err) => {
            archive_error!("Failed to serialize run report: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(PathBuf::from(output_dir));
    match writer.write(REPORT_FILENAME, &content) {
        Ok(path) => archive_info!("Run report written to {:?}", path),
        Err(err) => archive_error!("Failed to write run report to {:?}: {}", output_dir, err),
    }
}
