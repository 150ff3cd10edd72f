//! ADS-B message interpretation: extracted fields and CPR position decoding

pub mod cpr;
pub mod parser;
mod pending;
mod types;

pub use cpr::{global_decode, local_decode, nl, CprError, CprFrame};
pub use parser::extract;
pub use pending::{CprContext, CprOutcome, DecodeMethod, PendingCprPair};
pub use types::{CprFormat, CprPayload, Icao, PartialReport, Parity, Position, Speed, SpeedSource};
