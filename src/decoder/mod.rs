//! Receiver process management and output segmentation

mod diagnostics;
mod runner;
mod segmenter;

pub use diagnostics::{classify, UpstreamFailure};
pub use runner::MonitorSession;
pub use segmenter::{
    parse_frame_line, LineSource, MessageBlock, MessageSegmenter, RawLine, MAX_BLOCK_LINES,
};
