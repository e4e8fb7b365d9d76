use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::ScoringConfig;
use crate::error::{Result, TrustError};
use crate::models::{EdgeRecord, Period, PeriodBound, RawRecord};
use crate::rev2::{Convergence, Rev2Scorer};
use crate::snapshot::SnapshotGraph;

/// Number of columns in an input row: source, target, rating, time.
const COLUMNS: usize = 4;

/// Concrete `[from, until)` instants; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Every ingested rating, kept in ascending timestamp order.
#[derive(Debug, Clone, Default)]
pub struct TemporalStore {
    records: Vec<EdgeRecord>,
}

impl TemporalStore {
    /// Normalises and sorts raw records. A single bad row rejects the whole load.
    pub fn load<I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut records = Vec::new();
        for (index, row) in raw.into_iter().enumerate() {
            records.push(normalize(index + 1, row)?);
        }

        // Stable, so equal timestamps keep their input order.
        records.sort_by_key(|record| record.timestamp);

        info!(records = records.len(), "loaded edge records");
        Ok(Self { records })
    }

    pub fn records(&self) -> &[EdgeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Turns a pair of optional bounds into concrete instants.
    ///
    /// * neither bound: unbounded
    /// * start only: the month bucket containing `start`
    /// * end only: everything strictly before `end`
    /// * both: `[start, end)`, where a month bound means its first instant
    pub fn resolve(
        &self,
        start: Option<&PeriodBound>,
        end: Option<&PeriodBound>,
    ) -> Result<TimeWindow> {
        let window = match (start, end) {
            (None, None) => TimeWindow::default(),
            (Some(start), None) => {
                let bucket = start.bucket();
                TimeWindow {
                    from: Some(bucket.start()?),
                    until: Some(bucket.next().start()?),
                }
            }
            (None, Some(end)) => TimeWindow {
                from: None,
                until: Some(end.start()?),
            },
            (Some(start), Some(end)) => {
                let from = start.start()?;
                let until = end.start()?;
                if until < from {
                    return Err(TrustError::InvalidPeriod(format!(
                        "period end {end} precedes period start {start}"
                    )));
                }
                TimeWindow {
                    from: Some(from),
                    until: Some(until),
                }
            }
        };
        Ok(window)
    }

    /// Records inside the window [`resolve`](Self::resolve) produces.
    pub fn slice(
        &self,
        start: Option<&PeriodBound>,
        end: Option<&PeriodBound>,
    ) -> Result<&[EdgeRecord]> {
        let window = self.resolve(start, end)?;
        let slice = self.range(window.from, window.until);
        debug!(
            start = ?start.map(ToString::to_string),
            end = ?end.map(ToString::to_string),
            records = slice.len(),
            "sliced store"
        );
        Ok(slice)
    }

    /// Slices the store, builds a fresh snapshot and optionally scores it.
    pub fn snapshot(
        &self,
        start: Option<&PeriodBound>,
        end: Option<&PeriodBound>,
        run_scoring: bool,
        config: &ScoringConfig,
    ) -> Result<(SnapshotGraph, Option<Convergence>)> {
        let records = self.slice(start, end)?;
        let mut graph = SnapshotGraph::build(records);
        let convergence = run_scoring.then(|| Rev2Scorer::new(*config).run(&mut graph));
        Ok((graph, convergence))
    }

    fn range(&self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> &[EdgeRecord] {
        let lo = from.map_or(0, |from| {
            self.records.partition_point(|record| record.timestamp < from)
        });
        let hi = until.map_or(self.records.len(), |until| {
            self.records.partition_point(|record| record.timestamp < until)
        });
        &self.records[lo..hi.max(lo)]
    }

    /// Calendar months covered by the data, oldest first.
    pub fn distinct_periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self
            .records
            .iter()
            .map(|record| Period::of(record.timestamp))
            .collect();
        periods.dedup();
        periods
    }
}

/// Reads a headerless `source,target,rating,time` CSV.
pub fn load_csv(path: &Path) -> Result<TemporalStore> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows: Vec<RawRecord> = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() > COLUMNS {
            return Err(TrustError::malformed(
                rows.len() + 1,
                format!("expected {COLUMNS} columns, found {}", record.len()),
            ));
        }
        // Short rows leave the trailing fields as `None` and fail in `normalize`.
        rows.push(record.deserialize(None)?);
    }

    debug!(path = %path.display(), rows = rows.len(), "read csv");
    TemporalStore::load(rows)
}

fn normalize(line: usize, row: RawRecord) -> Result<EdgeRecord> {
    let source = required(line, row.source, "source")?;
    let target = required(line, row.target, "target")?;

    let rating_text = required(line, row.rating, "rating")?;
    let rating: f64 = rating_text
        .parse()
        .map_err(|_| TrustError::malformed(line, format!("rating '{rating_text}' is not numeric")))?;
    if !rating.is_finite() || !(-10.0..=10.0).contains(&rating) {
        return Err(TrustError::malformed(
            line,
            format!("rating {rating_text} is outside [-10, 10]"),
        ));
    }

    let time_text = required(line, row.timestamp, "timestamp")?;
    let seconds: f64 = time_text.parse().map_err(|_| {
        TrustError::malformed(line, format!("timestamp '{time_text}' is not numeric"))
    })?;
    if !seconds.is_finite() || seconds < 0.0 || seconds > i64::MAX as f64 {
        return Err(TrustError::malformed(
            line,
            format!("timestamp {time_text} is not a non-negative epoch second"),
        ));
    }
    // Fractional seconds are dropped.
    let timestamp = DateTime::from_timestamp(seconds.trunc() as i64, 0).ok_or_else(|| {
        TrustError::malformed(line, format!("timestamp {time_text} is out of range"))
    })?;

    Ok(EdgeRecord {
        source,
        target,
        rating,
        timestamp,
    })
}

fn required(line: usize, value: Option<String>, name: &str) -> Result<String> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(TrustError::malformed(line, format!("missing {name}"))),
    }
}
