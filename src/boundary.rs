use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

/// Which stream of the monitored process a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Regular output; a block opens only on a start marker.
    #[default]
    Primary,
    /// Error output; any non-blank line opens a block.
    Secondary,
}

const START_MARKERS: &[&str] = &[
    "exception", "error", "caused by:", "severe:", "fatal:",
    "org.springframework", "springframework", "spring boot",
    "com.mysql", "org.hibernate", "jdbc", "sql", "database",
    "http", "feign", "resttemplate", "webclient", "okhttp", "apache httpclient",
    "jackson", "gson", "json", "jaxb", "xstream",
    "validation", "constraint", "argument", "bind",
    "bean", "dependency", "circular", "creation",
    "timeout", "timed out", "connection refused",
    "redis", "ehcache", "hazelcast", "caffeine",
    "kafka", "rabbitmq", "activemq", "rocketmq",
    "connection", "socket", "tcp", "connect",
    "security", "authentication", "authorization",
    "compilation", "syntax", "compile",
    "outofmemory", "heap", "memory",
];

static RE_START: Lazy<Regex> = Lazy::new(|| {
    let alternation = START_MARKERS.iter().map(|m| regex::escape(m)).collect::<Vec<_>>().join("|");
    Regex::new(&format!("(?i){alternation}")).unwrap()
});

static RE_CONT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s+\S|\s*at\s|\s*Caused by:|\s*Suppressed:|\s*\.\.\.)").unwrap()
});

static RE_TIMESTAMP_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[?(?:\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}|\d{2}:\d{2}:\d{2}|\d{1,2}/\d{1,2}/\d{2,4}\s+\d{1,2}:\d{2})").unwrap()
});

static RE_SEVERITY_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[?(?:INFO|WARN|WARNING|DEBUG|TRACE)\b\]?").unwrap()
});

// An unindented exception line, e.g. the trace that follows a logger header.
static RE_EXCEPTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:Exception in thread "[^"]*"\s+)?(?:[A-Za-z_$][\w$]*\.)*(?:[A-Z][\w$]*(?:Exception|Error)\b(?::.*)?|(?:Exception|Error):.*)$"#).unwrap()
});

static RE_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:-{3,}|={4,})\s*$").unwrap()
});

pub fn is_start_line(line: &str) -> bool {
    RE_START.is_match(line)
}

pub fn is_continuation(line: &str) -> bool {
    RE_CONT.is_match(line)
}

pub fn is_exception_line(line: &str) -> bool {
    RE_EXCEPTION_LINE.is_match(line)
}

fn is_structured(line: &str) -> bool {
    matches!(line.trim_start().chars().next(), Some('{' | '}' | '[' | ']' | '<' | '"' | '|'))
}

fn is_terminator(line: &str) -> bool {
    line.trim().is_empty()
        || RE_TIMESTAMP_LEAD.is_match(line)
        || RE_SEVERITY_LEAD.is_match(line)
        || RE_SEPARATOR.is_match(line)
}

fn truncate_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Per-source accumulator that turns arbitrary chunks into complete blocks.
/// Holds no lock itself; callers serialize access.
#[derive(Debug)]
pub struct BlockBuffer {
    block: String,
    partial: String,
    partial_channel: Channel,
    max_block_bytes: usize,
    skipping_overflow: bool,
    last_activity: Instant,
}

impl BlockBuffer {
    pub fn new(max_block_bytes: usize) -> Self {
        Self {
            block: String::new(),
            partial: String::new(),
            partial_channel: Channel::Primary,
            max_block_bytes: max_block_bytes.max(1),
            skipping_overflow: false,
            last_activity: Instant::now(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.block.is_empty() || !self.partial.trim().is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.block.len() + self.partial.len()
    }

    /// Feeds one chunk. Returns the blocks it completed, in order.
    pub fn push(&mut self, chunk: &str, channel: Channel) -> Vec<String> {
        let mut out = Vec::new();
        if chunk.is_empty() {
            return out;
        }
        self.last_activity = Instant::now();
        self.partial.push_str(chunk);
        self.partial_channel = channel;
        while let Some(pos) = self.partial.find('\n') {
            let rest = self.partial.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.partial, rest);
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            self.push_line(&line, channel, &mut out);
        }
        // An unterminated partial line can grow without bound too.
        if self.partial.len() > self.max_block_bytes {
            let line = std::mem::take(&mut self.partial);
            self.push_line(&line, channel, &mut out);
        }
        out
    }

    fn push_line(&mut self, line: &str, channel: Channel, out: &mut Vec<String>) {
        if self.skipping_overflow {
            if !line.trim().is_empty() && (is_continuation(line) || is_structured(line)) {
                return;
            }
            self.skipping_overflow = false;
        }

        if self.block.is_empty() {
            self.open_if_start(line, channel, out);
            return;
        }

        if !is_terminator(line) && (is_continuation(line) || is_structured(line) || is_exception_line(line)) {
            self.append(line, out);
            return;
        }

        out.push(std::mem::take(&mut self.block));
        self.open_if_start(line, channel, out);
    }

    fn open_if_start(&mut self, line: &str, channel: Channel, out: &mut Vec<String>) {
        if line.trim().is_empty() {
            return;
        }
        if channel == Channel::Secondary || is_start_line(line) {
            self.append(line, out);
        }
    }

    fn append(&mut self, line: &str, out: &mut Vec<String>) {
        if !self.block.is_empty() {
            self.block.push('\n');
        }
        self.block.push_str(line);
        if self.block.len() > self.max_block_bytes {
            warn!(limit = self.max_block_bytes, "diagnostic block exceeded size cap, flushing early");
            truncate_bytes(&mut self.block, self.max_block_bytes);
            out.push(std::mem::take(&mut self.block));
            self.skipping_overflow = true;
        }
    }

    /// Flushes everything if nothing arrived for `timeout`.
    pub fn take_if_idle(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        if !self.has_pending() || now.saturating_duration_since(self.last_activity) < timeout {
            return Vec::new();
        }
        self.finish()
    }

    /// Force-flush: the held partial line is treated as complete.
    pub fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            let channel = self.partial_channel;
            self.push_line(line.trim_end_matches('\r'), channel, &mut out);
        }
        if !self.block.is_empty() {
            out.push(std::mem::take(&mut self.block));
        }
        self.skipping_overflow = false;
        out
    }
}

impl Default for BlockBuffer {
    fn default() -> Self {
        Self::new(50_000)
    }
}
