//! State shared between the processing thread and readers

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::aircraft_tracker::{AircraftTrack, TrackTable, TrackerStats};

/// Number of raw receiver lines kept for debug passthrough
pub const RAW_LINE_CAPACITY: usize = 200;

/// Counters for the ingestion pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub lines_received: AtomicU64,
    pub blocks_processed: AtomicU64,
    pub blocks_dropped: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub local_decodes: AtomicU64,
    pub global_decodes: AtomicU64,
    pub cpr_rejected: AtomicU64,
    pub upstream_failures: AtomicU64,
    has_received_data: AtomicBool,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block(&self) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_block(&self) {
        self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_decode(&self) {
        self.local_decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_global_decode(&self) {
        self.global_decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cpr_rejected(&self) {
        self.cpr_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns true the first time it is called
    pub fn mark_data_received(&self) -> bool {
        !self.has_received_data.swap(true, Ordering::SeqCst)
    }

    pub fn has_received_data(&self) -> bool {
        self.has_received_data.load(Ordering::SeqCst)
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines={} blocks={} dropped={} malformed_frames={} decodes(local={}, global={}) \
             cpr_rejected={} upstream_failures={}",
            Self::get(&self.lines_received),
            Self::get(&self.blocks_processed),
            Self::get(&self.blocks_dropped),
            Self::get(&self.malformed_frames),
            Self::get(&self.local_decodes),
            Self::get(&self.global_decodes),
            Self::get(&self.cpr_rejected),
            Self::get(&self.upstream_failures),
        )
    }
}

/// Bounded buffer of the most recent raw receiver lines
#[derive(Debug)]
pub struct RawLineBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl RawLineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Up to `n` most recent lines, oldest first
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

impl Default for RawLineBuffer {
    fn default() -> Self {
        Self::new(RAW_LINE_CAPACITY)
    }
}

/// Cloneable read handle onto the track table, raw lines and counters.
///
/// The processing thread holds the write side of the same locks, for the
/// duration of one message block at most.
#[derive(Debug, Clone)]
pub struct TrackView {
    tracks: Arc<RwLock<TrackTable>>,
    raw_lines: Arc<Mutex<RawLineBuffer>>,
    stats: Arc<PipelineStats>,
    max_rows: usize,
}

impl TrackView {
    pub fn new(max_rows: usize) -> Self {
        Self {
            tracks: Arc::new(RwLock::new(TrackTable::new())),
            raw_lines: Arc::new(Mutex::new(RawLineBuffer::default())),
            stats: Arc::new(PipelineStats::new()),
            max_rows,
        }
    }

    /// Run `f` with exclusive access to the track table
    pub fn with_tracks<R>(&self, f: impl FnOnce(&mut TrackTable) -> R) -> R {
        let mut tracks = self.tracks.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracks)
    }

    pub fn push_raw_line(&self, line: &str) {
        self.raw_lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    /// Evict stale tracks, then copy the rest, most recently seen first
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<AircraftTrack> {
        self.with_tracks(|tracks| {
            tracks.evict_stale(now);
            tracks.snapshot()
        })
    }

    /// Like [`snapshot`](Self::snapshot), limited to the configured number
    /// of display rows. Also returns the total number of live tracks.
    pub fn display_rows(&self, now: DateTime<Utc>) -> (Vec<AircraftTrack>, usize) {
        let mut rows = self.snapshot(now);
        let total = rows.len();
        rows.truncate(self.max_rows);
        (rows, total)
    }

    pub fn recent_lines(&self, n: usize) -> Vec<String> {
        self.raw_lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent(n)
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats_summary()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adsb::PartialReport;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_raw_line_buffer_bounded() {
        let mut buffer = RawLineBuffer::new(3);
        for n in 0..5 {
            buffer.push(&format!("line {n}"));
        }
        assert_eq!(buffer.recent(2), ["line 3", "line 4"]);
        assert_eq!(buffer.recent(10), ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_snapshot_evicts_before_reading() {
        let view = TrackView::new(30);
        view.with_tracks(|tracks| {
            tracks.upsert(&PartialReport::new("AAAAAA".parse().unwrap()), at(0));
            tracks.upsert(&PartialReport::new("BBBBBB".parse().unwrap()), at(2));
        });

        let snapshot = view.snapshot(at(61));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].icao.to_string(), "BBBBBB");
        assert_eq!(view.tracker_stats().total_aircraft, 1);
    }

    #[test]
    fn test_display_rows_truncated() {
        let view = TrackView::new(2);
        view.with_tracks(|tracks| {
            for (n, icao) in ["AAAAAA", "BBBBBB", "CCCCCC"].iter().enumerate() {
                tracks.upsert(&PartialReport::new(icao.parse().unwrap()), at(n as i64));
            }
        });
        let (rows, total) = view.display_rows(at(3));
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].icao.to_string(), "CCCCCC");
    }

    #[test]
    fn test_data_received_flag_set_once() {
        let stats = PipelineStats::new();
        assert!(!stats.has_received_data());
        assert!(stats.mark_data_received());
        assert!(!stats.mark_data_received());
        assert!(stats.has_received_data());
    }
}
