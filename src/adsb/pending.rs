//! Per-aircraft even/odd CPR frame store and decode trigger

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::cpr::{global_decode, local_decode, CprError, CprFrame};
use super::types::{CprPayload, Icao, Parity, Position};

/// Most recent even and odd frame for one aircraft
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingCprPair {
    pub even: Option<CprFrame>,
    pub odd: Option<CprFrame>,
}

impl PendingCprPair {
    /// Store a frame, replacing any earlier frame of the same parity
    pub fn insert(&mut self, parity: Parity, frame: CprFrame) {
        match parity {
            Parity::Even => self.even = Some(frame),
            Parity::Odd => self.odd = Some(frame),
        }
    }

    /// Capture time of the newest frame held
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        match (&self.even, &self.odd) {
            (Some(even), Some(odd)) => Some(even.captured_at.max(odd.captured_at)),
            (Some(frame), None) | (None, Some(frame)) => Some(frame.captured_at),
            (None, None) => None,
        }
    }

    /// Drop the older of the two frames, keeping the newer one to anchor the
    /// next pairing. Ties drop the odd frame.
    fn discard_older(&mut self) {
        if let (Some(even), Some(odd)) = (&self.even, &self.odd) {
            if odd.captured_at > even.captured_at {
                self.even = None;
            } else {
                self.odd = None;
            }
        }
    }
}

/// How a position was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMethod {
    Local,
    Global,
}

/// Result of feeding one CPR payload into the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CprOutcome {
    Decoded {
        position: Position,
        method: DecodeMethod,
    },
    /// Frame stored; waiting for a frame of the other parity
    Pending,
}

/// Context for CPR decoding across multiple aircraft
pub struct CprContext {
    pairs: HashMap<Icao, PendingCprPair>,
    local_decoding: bool,
    reference: Option<Position>,
}

impl CprContext {
    pub fn new(local_decoding: bool, reference: Option<Position>) -> Self {
        Self {
            pairs: HashMap::new(),
            local_decoding,
            reference,
        }
    }

    /// Store a CPR payload for `icao` and attempt to resolve a position.
    ///
    /// Local decode is tried first when enabled and a reference is known;
    /// otherwise (or when it fails) the stored even/odd pair is decoded
    /// globally. A failed global decode leaves both frames in place.
    pub fn update(
        &mut self,
        icao: Icao,
        payload: &CprPayload,
        captured_at: DateTime<Utc>,
    ) -> Result<CprOutcome, CprError> {
        let frame = CprFrame::new(
            payload.lat_encoded,
            payload.lon_encoded,
            captured_at,
            payload.format,
        )?;

        let pair = self.pairs.entry(icao).or_default();
        pair.insert(payload.parity, frame);

        if self.local_decoding {
            if let Some(reference) = self.reference {
                match local_decode(&frame, payload.parity, reference) {
                    Ok(position) => {
                        return Ok(CprOutcome::Decoded {
                            position,
                            method: DecodeMethod::Local,
                        })
                    }
                    Err(e) => debug!("{} local CPR decode failed: {}", icao, e),
                }
            }
        }

        let (Some(even), Some(odd)) = (pair.even, pair.odd) else {
            return Ok(CprOutcome::Pending);
        };

        let position = global_decode(&even, &odd)?;
        pair.discard_older();

        Ok(CprOutcome::Decoded {
            position,
            method: DecodeMethod::Global,
        })
    }

    /// Frames currently held for an aircraft
    pub fn pending(&self, icao: Icao) -> Option<&PendingCprPair> {
        self.pairs.get(&icao)
    }

    /// Forget aircraft whose newest frame is older than `max_age`
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let cutoff = now - max_age;
        let before = self.pairs.len();
        self.pairs
            .retain(|_, pair| pair.newest().is_some_and(|newest| newest >= cutoff));
        before - self.pairs.len()
    }

    /// Number of aircraft with at least one stored frame
    pub fn pending_count(&self) -> usize {
        self.pairs.len()
    }
}
