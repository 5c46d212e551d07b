//! Plain-text rendering of run results.

use std::fmt::Write;

use anjin_core::{RetrievalStatus, RunReport, SyncReport, TaskState};

fn status_label(status: RetrievalStatus) -> &'static str {
    match status {
        RetrievalStatus::Success => "ok",
        RetrievalStatus::Failure => "failed",
        RetrievalStatus::NotFound => "no changelog",
    }
}

/// Table of packages with newer releases, each followed by its summary or changelog.
pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();
    let updates: Vec<_> = report.updates().collect();

    if updates.is_empty() {
        out.push_str("All packages are up to date.\n");
    } else {
        let width = updates.iter().map(|o| o.package.len()).max().unwrap_or(0).max("PACKAGE".len());
        let _ = writeln!(out, "{:<width$}  {:<12}  {:<12}  STATUS", "PACKAGE", "CURRENT", "LATEST");
        for outcome in &updates {
            let latest = outcome.latest_version.as_deref().unwrap_or("-");
            let status = outcome.result.as_ref().map_or("-", |r| status_label(r.status));
            let _ = writeln!(out, "{:<width$}  {:<12}  {:<12}  {status}", outcome.package, outcome.current_version, latest);
        }

        for outcome in &updates {
            let Some(result) = &outcome.result else { continue };
            let body = result.summary.as_deref().unwrap_or(&result.text);
            let _ = write!(out, "\n== {} ==\n{}\n", outcome.package, body.trim_end());
        }
    }

    let _ = writeln!(
        out,
        "\n{} checked, {} updated, {} skipped, {} errored",
        report.outcomes.len(),
        updates.len(),
        report.count(TaskState::Skipped),
        report.count(TaskState::Errored)
    );
    out
}

/// One-paragraph summary of a sync run.
pub fn render_sync(report: &SyncReport) -> String {
    let mut out = format!(
        "{} scanned: {} added, {} modified, {} removed, {} unchanged, {} chunks written\n",
        report.scanned,
        report.added.len(),
        report.modified.len(),
        report.removed.len(),
        report.unchanged,
        report.chunks_written
    );
    for unit_id in &report.failed {
        let _ = writeln!(out, "failed: {unit_id}");
    }
    out
}
