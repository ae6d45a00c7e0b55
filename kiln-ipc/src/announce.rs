//! Incremental scan of the engine's diagnostic stream
//!
//! The engine announces its debug listener with a single line of the form
//! `Debugger listening on ws://127.0.0.1:9229/<id>`. The line arrives on a
//! byte stream and may be split across read boundaries, so matching runs
//! over an accumulation buffer carried between chunks. The buffer is
//! tail-trimmed so a stream that never announces cannot grow it without
//! bound.

use once_cell::sync::Lazy;
use regex::Regex;

static ANNOUNCEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Debugger listening on (ws://127\.0\.0\.1:\d+/[A-Za-z0-9-]+)[\r\n]")
        .expect("announcement pattern is valid")
});

/// Upper bound on carried bytes; comfortably larger than any announcement.
const MAX_BUFFER: usize = 8 * 1024;

/// Scan one new chunk against the carried buffer.
///
/// Returns the announced websocket URL if the combined text contains a
/// complete announcement, plus the buffer to carry into the next call
/// (the text after the match, or the bounded tail of the unmatched text).
pub fn scan(buffer: &str, chunk: &str) -> (Option<String>, String) {
    let mut combined = String::with_capacity(buffer.len() + chunk.len());
    combined.push_str(buffer);
    combined.push_str(chunk);

    if let Some(captures) = ANNOUNCEMENT.captures(&combined) {
        let url = captures[1].to_string();
        let rest = combined[captures.get(0).expect("whole match").end()..].to_string();
        return (Some(url), rest);
    }

    if combined.len() > MAX_BUFFER {
        let target = combined.len() - MAX_BUFFER;
        let cut = combined
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= target)
            .unwrap_or(0);
        combined.drain(..cut);
    }
    (None, combined)
}

/// Stateful wrapper around [`scan`] for stream consumers.
///
/// The first match wins; later chunks are ignored so one instance reports
/// one debug endpoint at most.
#[derive(Debug, Default)]
pub struct AnnouncementScanner {
    buffer: String,
    found: bool,
}

impl AnnouncementScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Option<String> {
        if self.found {
            return None;
        }
        let (matched, rest) = scan(&self.buffer, chunk);
        self.buffer = rest;
        if matched.is_some() {
            self.found = true;
            self.buffer.clear();
        }
        matched
    }
}
