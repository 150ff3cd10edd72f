//! Message processor - turns receiver lines into track updates

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::adsb::{extract, CprContext, CprOutcome, DecodeMethod, Position};
use crate::decoder::{classify, MessageBlock, MessageSegmenter, RawLine, UpstreamFailure};

use super::state::TrackView;

/// Pending CPR frames and tracks are cleaned up this often
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Pending CPR pairs whose newest frame is older than this are dropped
const PENDING_MAX_AGE_SECS: i64 = 60;

/// Tracker summary log period
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Blocking wait for the next line before re-checking the running flag
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Sole writer of the track table and the pending-CPR store
pub struct MessageProcessor {
    segmenter: MessageSegmenter,
    cpr_context: CprContext,
    view: TrackView,
    failure_tx: Sender<UpstreamFailure>,
}

impl MessageProcessor {
    pub fn new(
        local_decoding: bool,
        reference: Option<Position>,
        view: TrackView,
        failure_tx: Sender<UpstreamFailure>,
    ) -> Self {
        Self {
            segmenter: MessageSegmenter::new(),
            cpr_context: CprContext::new(local_decoding, reference),
            view,
            failure_tx,
        }
    }

    /// Process one receiver line, from either pipe
    pub fn handle_line(&mut self, line: RawLine) {
        let stats = self.view.stats();
        stats.record_line();

        if !line.is_blank() {
            self.view.push_raw_line(&line.text);
        }

        if line.is_block_start() && line.text.trim().len() > 5 && stats.mark_data_received() {
            info!("First ADS-B message received! Receiver is working.");
        }

        if let Some(failure) = classify(&line.text) {
            self.report_failure(failure);
        }

        if let Some(block) = self.segmenter.push(line) {
            self.process_block(&block);
        }
    }

    /// Surface a receiver problem to the log, the counters and the session
    pub fn report_failure(&self, failure: UpstreamFailure) {
        error!("READSB ERROR: {}", failure);
        self.view.stats().record_upstream_failure();
        if self.failure_tx.send(failure).is_err() {
            debug!("Failure channel closed");
        }
    }

    fn process_block(&mut self, block: &MessageBlock) {
        let stats = self.view.stats();
        stats.record_block();

        match block.frame() {
            Some(frame) => debug!("Frame {}", hex::encode_upper(frame)),
            None => {
                stats.record_malformed_frame();
                debug!("Malformed frame line: {:?}", block.text().lines().next());
            }
        }

        let Some(report) = extract(&block.text()) else {
            stats.record_dropped_block();
            return;
        };
        let received_at = block.received_at().unwrap_or_else(Utc::now);

        let decoded = match report.cpr {
            Some(payload) => match self.cpr_context.update(report.icao, &payload, received_at) {
                Ok(CprOutcome::Decoded { position, method }) => {
                    match method {
                        DecodeMethod::Local => stats.record_local_decode(),
                        DecodeMethod::Global => stats.record_global_decode(),
                    }
                    debug!("{} CPR {:?} decode: {}", report.icao, method, position);
                    Some(position)
                }
                Ok(CprOutcome::Pending) => None,
                Err(e) => {
                    stats.record_cpr_rejected();
                    if e.is_ambiguous() {
                        debug!(
                            "{} CPR decode rejected: {} (held {:?})",
                            report.icao,
                            e,
                            self.cpr_context.pending(report.icao)
                        );
                    } else {
                        warn!("{} invalid CPR payload: {}", report.icao, e);
                    }
                    None
                }
            },
            None => None,
        };

        self.view.with_tracks(|tracks| {
            tracks.upsert(&report, received_at);
            // The receiver's own position, when present, wins over ours
            if let (Some(position), None) = (decoded, report.position) {
                tracks.set_position(report.icao, position, received_at);
            }
        });
    }

    /// Drop stale pending frames and tracks
    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        let pairs = self
            .cpr_context
            .evict_stale(now, chrono::Duration::seconds(PENDING_MAX_AGE_SECS));
        let tracks = self.view.with_tracks(|tracks| tracks.evict_stale(now));
        if pairs > 0 || tracks > 0 {
            debug!("Cleanup removed {} pending CPR pairs, {} tracks", pairs, tracks);
        }
    }

    /// Close any open block (end of stream)
    pub fn flush(&mut self) {
        if let Some(block) = self.segmenter.flush() {
            self.process_block(&block);
        }
    }

    /// Drain `rx` until it disconnects or `running` is cleared
    pub fn run(mut self, rx: Receiver<RawLine>, running: Arc<AtomicBool>) {
        info!("Message processor started");

        let mut last_cleanup = Instant::now();
        let mut last_stats_log = Instant::now();

        while running.load(Ordering::SeqCst) {
            match rx.recv_timeout(RECV_TIMEOUT) {
                Ok(line) => self.handle_line(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Line channel disconnected");
                    break;
                }
            }

            if last_cleanup.elapsed() >= CLEANUP_INTERVAL {
                self.cleanup(Utc::now());
                last_cleanup = Instant::now();
            }

            if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                info!(
                    "[Tracker] {} | pending CPR: {}",
                    self.view.tracker_stats(),
                    self.cpr_context.pending_count()
                );
                last_stats_log = Instant::now();
            }
        }

        // Lines that arrived before the stop request still count
        for line in rx.try_iter() {
            self.handle_line(line);
        }
        self.flush();

        info!("Message processor stopped. {}", self.view.stats());
    }
}
