//! Terminal contents buffering with a scrollback limit.

/// Bytes fed to a terminal, trimmed to a number of lines.
#[derive(Debug)]
pub struct OutputBuffer {
    /// Raw bytes fed to the terminal (with ANSI codes)
    raw_buffer: Vec<u8>,
    /// Position of last read
    last_read_pos: usize,
    /// Lines to retain (0 = unlimited)
    scrollback_lines: u32,
    /// Number of `\n` bytes in `raw_buffer`
    newlines: usize,
}

impl OutputBuffer {
    /// Create a new, unlimited output buffer.
    pub fn new() -> Self {
        Self::with_scrollback(0)
    }

    /// Create a buffer retaining at most `lines` lines.
    pub fn with_scrollback(lines: u32) -> Self {
        Self {
            raw_buffer: Vec::new(),
            last_read_pos: 0,
            scrollback_lines: lines,
            newlines: 0,
        }
    }

    /// Append new output to the buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.raw_buffer.extend_from_slice(bytes);
        self.newlines += count_newlines(bytes);
        self.trim();
    }

    /// Change the retained line count, trimming immediately.
    pub fn set_scrollback_lines(&mut self, lines: u32) {
        self.scrollback_lines = lines;
        self.trim();
    }

    /// Retained line limit (0 = unlimited).
    pub fn scrollback_lines(&self) -> u32 {
        self.scrollback_lines
    }

    /// Drop the oldest complete lines beyond the scrollback limit.
    fn trim(&mut self) {
        if self.scrollback_lines == 0 {
            return;
        }
        let limit = self.scrollback_lines as usize;
        let lines = self.line_count();
        if lines <= limit {
            return;
        }
        let excess = lines - limit;
        // Only the dropped prefix is scanned.
        let Some(cut) = self
            .raw_buffer
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(excess - 1)
            .map(|(i, _)| i + 1)
        else {
            return;
        };
        self.raw_buffer.drain(..cut);
        self.newlines -= excess;
        self.last_read_pos = self.last_read_pos.saturating_sub(cut);
    }

    /// Number of lines held, counting a trailing partial line.
    pub fn line_count(&self) -> usize {
        match self.raw_buffer.last() {
            Some(b'\n') | None => self.newlines,
            Some(_) => self.newlines + 1,
        }
    }

    /// Get all output (with ANSI codes).
    pub fn read_all(&mut self) -> Vec<u8> {
        let output = self.raw_buffer.clone();
        self.last_read_pos = self.raw_buffer.len();
        output
    }

    /// Get output since last read (with ANSI codes).
    pub fn read_since_last(&mut self) -> Vec<u8> {
        let output = self.raw_buffer[self.last_read_pos..].to_vec();
        self.last_read_pos = self.raw_buffer.len();
        output
    }

    /// Everything held, without moving the read position.
    pub fn contents(&self) -> &[u8] {
        &self.raw_buffer
    }

    /// Get current buffer size.
    pub fn size(&self) -> usize {
        self.raw_buffer.len()
    }

    /// Get unread bytes count.
    pub fn unread_count(&self) -> usize {
        self.raw_buffer.len() - self.last_read_pos
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.raw_buffer.clear();
        self.last_read_pos = 0;
        self.newlines = 0;
    }
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| **b == b'\n').count()
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
