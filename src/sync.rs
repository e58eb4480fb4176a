//! Windowed Sync Engine
//!
//! The query API refuses ranges wider than three months, so a run walks from
//! its start bound to "now" in consecutive windows:
//!
//! ```text
//! from = checkpoint | now - 1 year
//! while from < now:
//!     to = from + 3 months
//!     fetch [from, to]
//!     from = to + 1 minute
//! ```
//!
//! Windows are strictly sequential. Rows of a window reach the sink only
//! after the whole window was fetched and aggregated, and any failure ends
//! the run without a checkpoint.

use crate::aggregate::{aggregate, TaggedMeasurement};
use crate::checkpoint::Checkpoint;
use crate::error::SyncResult;
use crate::schema::MetricFamily;
use crate::sink::RowSink;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};

/// Widest range the API accepts: 3 × 30 days
pub const WINDOW_SPAN_SECS: i64 = 60 * 60 * 24 * 30 * 3;
/// Look-back used when no checkpoint exists
pub const DEFAULT_LOOKBACK_SECS: i64 = 60 * 60 * 24 * 365;
/// Gap between one window's end and the next one's start
pub const WINDOW_GAP_SECS: i64 = 60;

pub fn window_span() -> Duration {
    Duration::seconds(WINDOW_SPAN_SECS)
}

/// A bounded range submitted to the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl TimeWindow {
    pub fn span(&self) -> Duration {
        self.to - self.from
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.from <= ts && ts <= self.to
    }
}

/// Supplier of raw measurements for one window
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    fn family(&self) -> MetricFamily;

    async fn fetch(&self, window: &TimeWindow) -> SyncResult<Vec<TaggedMeasurement>>;
}

/// Where a run starts: the checkpoint, or one year before `now`
pub fn start_bound(checkpoint: Option<Checkpoint>, now: NaiveDateTime) -> NaiveDateTime {
    match checkpoint {
        Some(c) => c.timestamp(),
        None => now - Duration::seconds(DEFAULT_LOOKBACK_SECS),
    }
}

/// Iterator over the windows covering `[from, until)`
#[derive(Debug, Clone)]
pub struct WindowPlan {
    next: NaiveDateTime,
    until: NaiveDateTime,
}

pub fn plan_windows(from: NaiveDateTime, until: NaiveDateTime) -> WindowPlan {
    WindowPlan { next: from, until }
}

impl Iterator for WindowPlan {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<TimeWindow> {
        if self.next >= self.until {
            return None;
        }
        let from = self.next;
        let to = from + window_span();
        self.next = to + Duration::seconds(WINDOW_GAP_SECS);
        Some(TimeWindow { from, to })
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub windows: usize,
    pub rows_emitted: usize,
    pub conversion_errors: usize,
    /// Newest emitted timestamp
    pub latest: Option<NaiveDateTime>,
    /// Resume bound for the next run; `None` leaves the stored one untouched
    pub checkpoint: Option<Checkpoint>,
}

/// Drives one incremental run against a measurement source
pub struct SyncEngine<S: MeasurementSource> {
    source: S,
    preview: bool,
}

impl<S: MeasurementSource> SyncEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            preview: false,
        }
    }

    /// Preview runs emit rows but never produce a checkpoint
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub async fn run(
        &self,
        checkpoint: Option<Checkpoint>,
        now: NaiveDateTime,
        sink: &mut dyn RowSink,
    ) -> SyncResult<SyncOutcome> {
        let family = self.source.family();
        let start = start_bound(checkpoint, now);
        let mut outcome = SyncOutcome::default();

        tracing::info!(
            family = %family,
            from = %start,
            now = %now,
            resumed = checkpoint.is_some(),
            "starting sync"
        );

        for window in plan_windows(start, now) {
            let measurements = self.source.fetch(&window).await.map_err(|e| {
                tracing::error!(from = %window.from, to = %window.to, error = %e, "window failed");
                e
            })?;

            let aggregated = aggregate(family, &measurements);
            for err in &aggregated.conversion_errors {
                tracing::warn!(error = %err, "field left unset");
            }

            let mut emitted = 0;
            for row in &aggregated.rows {
                // The API filter is inclusive; never re-emit what precedes the window
                if row.timestamp() < window.from {
                    tracing::debug!(timestamp = %row.timestamp(), "skipping row before window");
                    continue;
                }
                sink.add(row)?;
                outcome.latest = outcome.latest.max(Some(row.timestamp()));
                emitted += 1;
            }

            tracing::debug!(
                from = %window.from,
                to = %window.to,
                measurements = measurements.len(),
                rows = emitted,
                "window synced"
            );

            outcome.windows += 1;
            outcome.rows_emitted += emitted;
            outcome.conversion_errors += aggregated.conversion_errors.len();
        }

        sink.finish()?;

        if !self.preview {
            outcome.checkpoint = outcome.latest.map(Checkpoint::after);
        }

        tracing::info!(
            windows = outcome.windows,
            rows = outcome.rows_emitted,
            conversion_errors = outcome.conversion_errors,
            checkpoint = ?outcome.checkpoint.map(|c| c.to_string()),
            preview = self.preview,
            "sync finished"
        );

        Ok(outcome)
    }
}
