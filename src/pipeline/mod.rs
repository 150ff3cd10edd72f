//! Line processing pipeline and the state it shares with readers

mod processor;
mod state;

pub use processor::MessageProcessor;
pub use state::{PipelineStats, RawLineBuffer, TrackView, RAW_LINE_CAPACITY};
