//! Human-readable diagnostics for failed documents and whole runs.

use std::fmt::Write as _;

use crate::batch::{BatchReport, DocumentFailure};

/// Error block for one failed document.
pub fn render_failure(file: &str, failure: &DocumentFailure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Error summary");
    let _ = writeln!(out, "{file}: {}", failure.summary());
    let _ = writeln!(out);
    let _ = writeln!(out, "# Error details");
    for line in failure.details() {
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "# Error count");
    let _ = writeln!(out, "{}", failure.count());
    out
}

/// Totals for a run, followed by the files that failed.
pub fn render_batch_summary(report: &BatchReport) -> String {
    let failed: Vec<_> = report.failed().collect();
    let mut out = String::new();
    let _ = writeln!(out, "# Summary (run {})", report.run_id);
    let _ = writeln!(out, "Total documents: {}", report.total());
    let _ = writeln!(out, "Succeeded: {}", report.succeeded());
    let _ = writeln!(out, "Failed: {}", failed.len());
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed documents:");
        for doc in failed {
            if let Err(failure) = &doc.outcome {
                let _ = writeln!(out, "  - {} ({})", doc.path.display(), failure.summary());
            }
        }
    }
    out
}
