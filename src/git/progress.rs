//! Percentages parsed out of `git --progress` output.

use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::progress::TaskProgress;

static RECEIVING_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Receiving objects:\s*(\d+)%").ok());

/// Turns git's progress lines into a non-decreasing percentage.
///
/// Parsed values are capped at 99 so that 100 is reported exactly once,
/// by [`ProgressTracker::complete`], when the command has actually exited.
pub struct ProgressTracker {
    sink: Arc<dyn TaskProgress>,
    last: u64,
    completed: bool,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn TaskProgress>) -> Self {
        sink.set_length(100);
        Self {
            sink,
            last: 0,
            completed: false,
        }
    }

    /// Feeds one line of git's stderr.
    pub fn feed(&mut self, line: &str) {
        if self.completed {
            return;
        }
        let Some(percent) = parse_percent(line) else {
            return;
        };
        let percent = percent.min(99);
        if percent > self.last {
            self.last = percent;
            self.sink.set_position(percent);
        }
    }

    /// Reports 100. Later calls do nothing.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.last = 100;
        self.sink.set_position(100);
        self.sink.finish();
    }
}

fn parse_percent(line: &str) -> Option<u64> {
    let re = RECEIVING_RE.as_ref()?;
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Splits off every complete `\r`- or `\n`-terminated line from the front
/// of `buffer`, leaving any unterminated tail in place.
pub fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\r' || *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines
}
