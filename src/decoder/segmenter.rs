//! Splits the receiver's line stream into message blocks
//!
//! readsb prints each decoded message as a raw frame line (`*<hex>;`)
//! followed by its decoded fields. A block runs from one frame line to the
//! next frame line, a blank line, or the line limit, whichever comes first.

use chrono::{DateTime, Utc};

/// A block longer than this is force-closed
pub const MAX_BLOCK_LINES: usize = 20;

/// Which receiver pipe a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Stdout,
    Stderr,
}

/// One line of receiver output with its arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub seq: u64,
    pub source: LineSource,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl RawLine {
    pub fn new(
        seq: u64,
        source: LineSource,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let mut text = text.into();
        let trimmed_len = text.trim_end_matches(['\r', '\n']).len();
        text.truncate(trimmed_len);
        Self {
            seq,
            source,
            text,
            received_at,
        }
    }

    pub fn is_block_start(&self) -> bool {
        self.text.trim_start().starts_with('*')
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Lines belonging to one decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBlock {
    lines: Vec<RawLine>,
}

impl MessageBlock {
    fn open(first: RawLine) -> Self {
        Self { lines: vec![first] }
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    /// Arrival time of the opening frame line
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.lines.first().map(|line| line.received_at)
    }

    /// Block text joined with newlines
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Raw Mode S bytes from the opening frame line, when well-formed
    pub fn frame(&self) -> Option<Vec<u8>> {
        self.lines.first().and_then(|line| parse_frame_line(&line.text))
    }
}

/// Parse readsb raw frame line format: *<hex_bytes>;
/// Returns the raw message bytes if valid
pub fn parse_frame_line(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    let hex_str = line.strip_prefix('*')?;
    let end_idx = hex_str.find(';')?;
    let hex_str = &hex_str[..end_idx];

    // Valid lengths: 14 hex chars (7 bytes) or 28 hex chars (14 bytes)
    if hex_str.len() != 14 && hex_str.len() != 28 {
        return None;
    }

    hex::decode(hex_str).ok()
}

/// Two-state segmenter: idle (no open block) or collecting
#[derive(Debug, Default)]
pub struct MessageSegmenter {
    current: Option<MessageBlock>,
}

impl MessageSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a block when this line completed one
    pub fn push(&mut self, line: RawLine) -> Option<MessageBlock> {
        if line.is_block_start() {
            return self.current.replace(MessageBlock::open(line));
        }

        if line.is_blank() {
            return self.current.take();
        }

        let block = self.current.as_mut()?;
        block.lines.push(line);
        if block.len() > MAX_BLOCK_LINES {
            return self.current.take();
        }
        None
    }

    /// Close and return any open block (end of stream)
    pub fn flush(&mut self) -> Option<MessageBlock> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(seq: u64, text: &str) -> RawLine {
        RawLine::new(seq, LineSource::Stdout, text, Utc::now())
    }

    #[test]
    fn test_lines_before_first_frame_ignored() {
        let mut seg = MessageSegmenter::new();
        assert!(seg.push(line(0, "readsb starting up")).is_none());
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_frame_line_closes_previous_block() {
        let mut seg = MessageSegmenter::new();
        assert!(seg.push(line(0, "*8d40621d58c382d690c8ac2863a7;")).is_none());
        assert!(seg.push(line(1, "  hex: 40621d")).is_none());

        let block = seg.push(line(2, "*8d485020994409940838175b284f;")).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.text(), "*8d40621d58c382d690c8ac2863a7;\n  hex: 40621d");
        assert_eq!(seg.flush().unwrap().text(), "*8d485020994409940838175b284f;");
    }

    #[test]
    fn test_blank_line_closes_block() {
        let mut seg = MessageSegmenter::new();
        seg.push(line(0, "*8d40621d58c382d690c8ac2863a7;"));
        seg.push(line(1, "  hex: 40621d"));
        let block = seg.push(line(2, "   ")).unwrap();
        assert_eq!(block.len(), 2);
        assert!(seg.push(line(3, "  hex: 123456")).is_none());
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_unterminated_block_force_closed() {
        let mut seg = MessageSegmenter::new();
        seg.push(line(0, "*8d40621d58c382d690c8ac2863a7;"));
        let mut emitted = None;
        for seq in 1..=MAX_BLOCK_LINES as u64 {
            emitted = seg.push(line(seq, "  filler: 1"));
            if emitted.is_some() {
                break;
            }
        }
        let block = emitted.expect("block should be emitted once it exceeds the limit");
        assert_eq!(block.len(), MAX_BLOCK_LINES + 1);
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_flush_returns_open_block() {
        let mut seg = MessageSegmenter::new();
        seg.push(line(0, "*8d40621d58c382d690c8ac2863a7;"));
        assert_eq!(seg.flush().unwrap().len(), 1);
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_raw_line_strips_line_endings() {
        assert_eq!(line(0, "*02e197b2f3f9a1;\r\n").text, "*02e197b2f3f9a1;");
    }

    #[test]
    fn test_parse_frame_line() {
        assert_eq!(parse_frame_line("*8D4840D6202CC371C32CE0576098;").unwrap().len(), 14);
        assert_eq!(parse_frame_line("*02E197B2F3F9A1;").unwrap().len(), 7);
        assert!(parse_frame_line("not a message").is_none());
        assert!(parse_frame_line("*invalid;").is_none());
        assert!(parse_frame_line("*12345;").is_none());
    }

    #[test]
    fn test_block_frame_bytes() {
        let mut seg = MessageSegmenter::new();
        seg.push(line(0, "*8d40621d58c382d690c8ac2863a7;"));
        let block = seg.flush().unwrap();
        assert_eq!(block.frame().unwrap()[0], 0x8d);
    }
}
