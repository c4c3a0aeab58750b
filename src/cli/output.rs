//! Output formatting utilities for watch mode.

use std::fmt::Write as _;
use std::io::{self, Write};

use chrono::DateTime;
use pr_radar::client::{ViewQuery, ViewState, ViewStats};
use pr_radar::github::models::PullRequestRecord;

/// Formats `state` as plain text, filtered and grouped by `query`.
#[must_use]
pub fn format_view(state: &ViewState, query: &ViewQuery) -> String {
    let mut out = String::new();
    if state.loading {
        out.push_str("Loading pull requests...\n");
        push_banners(&mut out, state);
        return out;
    }

    let stats = ViewStats::from_records(&state.records);
    let _infallible = writeln!(
        out,
        "{} pull requests: {} ready, {} draft, {} review required, {} changes requested, {} approved",
        stats.total,
        stats.ready,
        stats.draft,
        stats.review_required,
        stats.changes_requested,
        stats.approved
    );
    if let Some(as_of) = state
        .last_snapshot_at
        .and_then(|millis| i64::try_from(millis).ok())
        .and_then(DateTime::from_timestamp_millis)
    {
        let _infallible = writeln!(out, "Data as of {}", as_of.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    push_banners(&mut out, state);

    let groups = query.apply(&state.records);
    if groups.is_empty() {
        out.push_str("No pull requests to show\n");
        return out;
    }
    for group in groups {
        let _infallible = writeln!(out, "\n{} ({})", group.label, group.records.len());
        for record in &group.records {
            push_record(&mut out, record);
        }
    }
    out
}

fn push_banners(out: &mut String, state: &ViewState) {
    if state.stale && !state.loading {
        out.push_str("[stale] data is more than 30 seconds old\n");
    }
    if state.rate_limited {
        let countdown = state
            .retry_in_seconds
            .map(|seconds| format!(" retrying in {seconds}s"))
            .unwrap_or_default();
        let _infallible = writeln!(out, "[rate limited]{countdown}");
    }
    if let Some(message) = state.error_message.as_deref() {
        let _infallible = writeln!(out, "[error] {message}");
    }
    if let Some(message) = state.connection_error.as_deref() {
        let _infallible = writeln!(out, "[disconnected] {message}");
    }
    if state.update_available {
        out.push_str("[update available]\n");
    }
}

fn push_record(out: &mut String, record: &PullRequestRecord) {
    let draft = if record.draft { " (draft)" } else { "" };
    let review = record
        .review_decision
        .map(|decision| format!(" {decision:?}"))
        .unwrap_or_default();
    let _infallible = writeln!(
        out,
        "  #{} {}{draft} [{}] @{}{review}",
        record.number, record.title, record.head_ref, record.author.login
    );
}

/// Writes `text` to `writer`, clearing the terminal first.
///
/// # Errors
///
/// Returns any I/O error from the writer.
pub fn write_screen<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    write!(writer, "\x1b[2J\x1b[H{text}")?;
    writer.flush()
}
