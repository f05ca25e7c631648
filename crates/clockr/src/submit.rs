//! Turns accepted allocations into Clockify entries and local records.
//!
//! All time windows are planned before the first external call, so a bad
//! `HH:MM` value aborts the submission with nothing created or stored. Once
//! planning succeeds, each allocation is created and persisted in order; a
//! Clockify failure marks only that entry as failed.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clockify::{TimeEntryRequest, TimeEntrySink};
use crate::model::{Allocation, BatchAllocation, EditableAllocation};
use crate::store::{format_timestamp, EntryStatus, EntryStore, PersistedEntry};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("parsing {field} time for {date}: invalid value {value:?}")]
    TimeParse {
        date: String,
        field: &'static str,
        value: String,
    },

    #[error("no time interval configured for single-interval submission")]
    MissingInterval,
}

/// The work interval a single-mode review covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// The `minutes` leading up to `end`.
    pub fn ending_at(end: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start: end - Duration::minutes(i64::from(minutes)),
            end,
        }
    }

    pub fn minutes(&self) -> u32 {
        (self.end - self.start).num_minutes().max(0) as u32
    }

    /// "09:00 – 10:00 (60 min)" in local time.
    pub fn label(&self) -> String {
        format!(
            "{} – {} ({} min)",
            self.start.with_timezone(&Local).format("%H:%M"),
            self.end.with_timezone(&Local).format("%H:%M"),
            self.minutes()
        )
    }
}

/// A UTC window for one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Allocation shapes that know how to lay themselves out in time.
pub trait Plannable: EditableAllocation {
    fn plan(items: &[Self], interval: Option<&Interval>) -> Result<Vec<Window>, SubmitError>;
}

impl Plannable for Allocation {
    /// Back-to-back from the interval start, each clamped to the interval end.
    fn plan(items: &[Self], interval: Option<&Interval>) -> Result<Vec<Window>, SubmitError> {
        let interval = interval.ok_or(SubmitError::MissingInterval)?;
        let mut cursor = interval.start;
        Ok(items
            .iter()
            .map(|alloc| {
                let end = (cursor + Duration::minutes(i64::from(alloc.minutes))).min(interval.end);
                let window = Window { start: cursor, end };
                cursor = end;
                window
            })
            .collect())
    }
}

impl Plannable for BatchAllocation {
    /// Each allocation's own date and local `HH:MM` bounds.
    fn plan(items: &[Self], _interval: Option<&Interval>) -> Result<Vec<Window>, SubmitError> {
        items
            .iter()
            .map(|alloc| {
                Ok(Window {
                    start: parse_local(&alloc.date, &alloc.start_time, "start")?,
                    end: parse_local(&alloc.date, &alloc.end_time, "end")?,
                })
            })
            .collect()
    }
}

fn parse_local(date: &str, time: &str, field: &'static str) -> Result<DateTime<Utc>, SubmitError> {
    parse_local_in(&Local, date, time).ok_or_else(|| SubmitError::TimeParse {
        date: date.to_string(),
        field,
        value: time.to_string(),
    })
}

fn parse_local_in<Tz: TimeZone>(tz: &Tz, date: &str, time: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").ok()?;
    tz.from_local_datetime(&NaiveDateTime::new(date, time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Creates entries through a [`TimeEntrySink`] and records them in an [`EntryStore`].
#[derive(Clone)]
pub struct SubmissionPipeline {
    sink: Arc<dyn TimeEntrySink>,
    store: Option<Arc<dyn EntryStore>>,
    workspace_id: String,
    interval: Option<Interval>,
}

impl SubmissionPipeline {
    pub fn new(sink: Arc<dyn TimeEntrySink>, workspace_id: impl Into<String>) -> Self {
        Self {
            sink,
            store: None,
            workspace_id: workspace_id.into(),
            interval: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn interval(&self) -> Option<&Interval> {
        self.interval.as_ref()
    }

    /// Plan, create and persist every allocation, in order.
    pub async fn submit<A: Plannable>(
        &self,
        allocations: &[A],
        raw_input: &str,
    ) -> Result<Vec<PersistedEntry>, SubmitError> {
        let windows = A::plan(allocations, self.interval.as_ref())?;
        debug!(count = windows.len(), "Submitting allocations");

        let mut entries = Vec::with_capacity(windows.len());
        for (item, window) in allocations.iter().zip(windows) {
            let alloc = item.allocation();
            let request = TimeEntryRequest {
                start: format_timestamp(window.start),
                end: format_timestamp(window.end),
                project_id: alloc.project_id.clone(),
                description: alloc.description.clone(),
            };

            let (status, external_id) =
                match self.sink.create_entry(&self.workspace_id, &request).await {
                    Ok(created) => (EntryStatus::Logged, created.id),
                    Err(err) => {
                        warn!(project = %alloc.project_name, error = %err, "Time entry creation failed");
                        (EntryStatus::Failed, String::new())
                    }
                };

            let mut entry = PersistedEntry {
                local_id: None,
                external_id,
                project_id: alloc.project_id.clone(),
                project_name: alloc.project_name.clone(),
                client_name: alloc.client_name.clone(),
                description: alloc.description.clone(),
                start: window.start,
                end: window.end,
                minutes: alloc.minutes,
                status,
                raw_input: raw_input.to_string(),
                created_at: Utc::now(),
            };

            if let Some(store) = &self.store {
                match store.persist(&entry).await {
                    Ok(id) => entry.local_id = Some(id),
                    Err(err) => warn!(error = %err, "Failed to persist entry locally"),
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clockify::{ClockifyError, CreatedEntry};
    use crate::store::{SqliteEntryStore, StoreError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and fails the calls whose 1-based index is listed.
    #[derive(Default)]
    struct FakeSink {
        fail_on: Vec<usize>,
        requests: Mutex<Vec<TimeEntryRequest>>,
    }

    #[async_trait]
    impl TimeEntrySink for FakeSink {
        async fn create_entry(
            &self,
            _workspace_id: &str,
            entry: &TimeEntryRequest,
        ) -> Result<CreatedEntry, ClockifyError> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(entry.clone());
            let n = requests.len();
            if self.fail_on.contains(&n) {
                return Err(ClockifyError::Status {
                    status: 400,
                    body: "rejected".into(),
                });
            }
            Ok(CreatedEntry {
                id: format!("te-{}", n),
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl EntryStore for BrokenStore {
        async fn persist(&self, _entry: &PersistedEntry) -> Result<i64, StoreError> {
            Err(StoreError::Status("disk full".into()))
        }
        async fn entries_between(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<PersistedEntry>, StoreError> {
            Ok(vec![])
        }
        async fn failed_entries(&self) -> Result<Vec<PersistedEntry>, StoreError> {
            Ok(vec![])
        }
        async fn last_raw_input(&self) -> Result<Option<String>, StoreError> {
            Ok(None)
        }
        async fn last_logged_entry(&self) -> Result<Option<PersistedEntry>, StoreError> {
            Ok(None)
        }
    }

    fn alloc(project: &str, minutes: u32) -> Allocation {
        Allocation {
            project_id: project.into(),
            project_name: project.to_uppercase(),
            client_name: None,
            minutes,
            description: format!("work on {}", project),
            confidence: 0.8,
        }
    }

    fn batch(date: &str, start: &str, end: &str) -> BatchAllocation {
        BatchAllocation {
            date: date.into(),
            start_time: start.into(),
            end_time: end.into(),
            allocation: alloc("p", 60),
        }
    }

    fn interval() -> Interval {
        Interval {
            start: Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_single_windows_walk_forward_and_clamp() {
        let items = vec![alloc("a", 30), alloc("b", 45)];
        let windows = Allocation::plan(&items, Some(&interval())).unwrap();
        assert_eq!(format_timestamp(windows[0].start), "2025-03-03T09:00:00Z");
        assert_eq!(format_timestamp(windows[0].end), "2025-03-03T09:30:00Z");
        assert_eq!(format_timestamp(windows[1].start), "2025-03-03T09:30:00Z");
        assert_eq!(format_timestamp(windows[1].end), "2025-03-03T10:00:00Z");
    }

    #[test]
    fn test_single_requires_interval() {
        assert_eq!(
            Allocation::plan(&[alloc("a", 30)], None),
            Err(SubmitError::MissingInterval)
        );
    }

    #[test]
    fn test_batch_parse_in_timezone() {
        let tz = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let at = parse_local_in(&tz, "2025-03-03", "09:00").unwrap();
        assert_eq!(format_timestamp(at), "2025-03-03T07:00:00Z");
        assert!(parse_local_in(&tz, "2025-03-03", "9am").is_none());
        assert!(parse_local_in(&tz, "03/03/2025", "09:00").is_none());
    }

    #[test]
    fn test_batch_parse_error_names_date_and_field() {
        let items = vec![batch("2025-03-03", "09:00", "10:00"), batch("2025-03-04", "09:00", "25:99")];
        let err = BatchAllocation::plan(&items, None).unwrap_err();
        assert_eq!(
            err,
            SubmitError::TimeParse {
                date: "2025-03-04".into(),
                field: "end",
                value: "25:99".into(),
            }
        );
        assert!(err.to_string().starts_with("parsing end time for 2025-03-04"));
    }

    #[test]
    fn test_interval_minutes() {
        let end = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let iv = Interval::ending_at(end, 60);
        assert_eq!(iv.minutes(), 60);
        assert_eq!(iv, interval());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let sink = Arc::new(FakeSink {
            fail_on: vec![2],
            ..Default::default()
        });
        let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
        let pipeline = SubmissionPipeline::new(sink.clone(), "ws1").with_store(store.clone());

        let items = vec![
            batch("2025-03-03", "09:00", "10:00"),
            batch("2025-03-03", "10:00", "11:00"),
            batch("2025-03-04", "09:00", "10:00"),
        ];
        let entries = pipeline.submit(&items, "auth week").await.unwrap();

        let statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![EntryStatus::Logged, EntryStatus::Failed, EntryStatus::Logged]
        );
        assert_eq!(entries[0].external_id, "te-1");
        assert_eq!(entries[1].external_id, "");
        assert!(entries.iter().all(|e| e.local_id.is_some()));
        assert_eq!(store.failed_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_creates_nothing() {
        let sink = Arc::new(FakeSink::default());
        let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
        let pipeline = SubmissionPipeline::new(sink.clone(), "ws1").with_store(store.clone());

        let items = vec![batch("2025-03-03", "09:00", "10:00"), batch("2025-03-03", "noon", "13:00")];
        let result = pipeline.submit(&items, "x").await;

        assert!(matches!(result, Err(SubmitError::TimeParse { field: "start", .. })));
        assert!(sink.requests.lock().unwrap().is_empty());
        assert_eq!(store.last_raw_input().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_propagated() {
        let sink = Arc::new(FakeSink::default());
        let pipeline = SubmissionPipeline::new(sink, "ws1")
            .with_store(Arc::new(BrokenStore))
            .with_interval(interval());

        let entries = pipeline.submit(&[alloc("a", 60)], "x").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Logged);
        assert_eq!(entries[0].local_id, None);
    }

    #[tokio::test]
    async fn test_fields_carried_verbatim() {
        let sink = Arc::new(FakeSink::default());
        let pipeline = SubmissionPipeline::new(sink.clone(), "ws1").with_interval(interval());

        let items = vec![alloc("a", 20), alloc("b", 40)];
        let entries = pipeline.submit(&items, "raw").await.unwrap();
        for (entry, item) in entries.iter().zip(&items) {
            assert_eq!(entry.project_id, item.project_id);
            assert_eq!(entry.minutes, item.minutes);
            assert_eq!(entry.description, item.description);
            assert_eq!(entry.raw_input, "raw");
        }
        let requests = sink.requests.lock().unwrap();
        assert_eq!(requests[1].start, "2025-03-03T09:20:00Z");
    }
}
