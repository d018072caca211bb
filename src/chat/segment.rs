//! Incremental segmentation of the streamed response payload.
//!
//! The remote service streams a JSON object as raw text, fragment by
//! fragment. Two consumers share that stream: [`ResponseSegmenter`] cuts
//! speakable chunks out of the growing `answer` field without waiting for
//! the payload to complete, and [`DirectiveAccumulator`] keeps the whole
//! payload so the trailing `function` directive can be parsed once the
//! stream ends. Both are per-turn state: a new instance is created at turn
//! start and discarded at turn end.

use serde_json::Value;

const ANSWER_START_DELIMITER: &str = "\"answer\": \"";
const ANSWER_END_DELIMITER: &str = "\", \"";

/// Sentence and clause boundaries, Western and full-width, plus line breaks.
const BOUNDARY_CHARS: &[char] = &[
    '.', '!', '?', ',', ';', ':', '。', '！', '？', '，', '；', '：', '\n', '\r',
];

/// Cuts punctuation-terminated chunks out of the answer field as the
/// payload streams in.
///
/// Cursors are byte offsets into the accumulated buffer: the answer start
/// (fixed just past the opening delimiter once found), the optional answer
/// end (at the closing delimiter), and the emitted cursor marking how much
/// answer text has already been handed out. At most one chunk is emitted
/// per appended fragment, which bounds the latency contribution to one
/// network round trip and avoids re-scanning already-emitted text.
///
/// Known limitation: trailing answer text with no final boundary character
/// stays buffered forever; the stream ending mid-sentence loses it. The
/// delimiter search is also textual, so an answer field that itself
/// contains the closing delimiter sequence ends the field early.
pub struct ResponseSegmenter {
    buffer: String,
    answer_start: Option<usize>,
    answer_end: Option<usize>,
    emitted: usize,
}

impl ResponseSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            answer_start: None,
            answer_end: None,
            emitted: 0,
        }
    }

    /// Append one raw fragment and return the next speakable chunk, if a
    /// boundary character became reachable.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);

        // Locate the answer field start. Fragments before it carry no
        // speakable text.
        if self.answer_start.is_none() {
            match self.buffer.find(ANSWER_START_DELIMITER) {
                Some(idx) => {
                    let start = idx + ANSWER_START_DELIMITER.len();
                    self.answer_start = Some(start);
                    self.emitted = start;
                }
                None => return None,
            }
        }
        let start = self.answer_start.unwrap_or(0);

        // Locate the answer field end, if it has arrived.
        if self.answer_end.is_none() {
            if let Some(idx) = self.buffer[start..].find(ANSWER_END_DELIMITER) {
                self.answer_end = Some(start + idx);
            }
        }

        // The tail of an in-progress field is never assumed complete: scan
        // only up to the known end. Without a known end, a buffer tail
        // that could still grow into the closing delimiter is held back,
        // or its quote and comma would be emitted as answer text.
        let effective_end = self
            .answer_end
            .unwrap_or(self.buffer.len() - self.partial_end_delimiter_len());
        if self.emitted >= effective_end {
            return None;
        }

        let pending = &self.buffer[self.emitted..effective_end];
        for (i, ch) in pending.char_indices() {
            if BOUNDARY_CHARS.contains(&ch) {
                let chunk_end = self.emitted + i + ch.len_utf8();
                let chunk = self.buffer[self.emitted..chunk_end].to_string();
                self.emitted = chunk_end;
                return Some(chunk);
            }
        }

        None
    }

    /// Longest proper prefix of the closing delimiter that the buffer
    /// currently ends with. That tail may still complete into the field
    /// end once more fragments arrive.
    fn partial_end_delimiter_len(&self) -> usize {
        for len in (1..ANSWER_END_DELIMITER.len()).rev() {
            if self.buffer.ends_with(&ANSWER_END_DELIMITER[..len]) {
                return len;
            }
        }
        0
    }

    /// Answer text received but not yet emitted as a chunk.
    pub fn pending_text(&self) -> &str {
        match self.answer_start {
            Some(_) => {
                let end = self
                    .answer_end
                    .unwrap_or(self.buffer.len() - self.partial_end_delimiter_len());
                &self.buffer[self.emitted.min(end)..end]
            }
            None => "",
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.answer_start = None;
        self.answer_end = None;
        self.emitted = 0;
    }
}

impl Default for ResponseSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates the raw stream for the post-completion structured parse.
#[derive(Default)]
pub struct DirectiveAccumulator {
    buffer: String,
}

impl DirectiveAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Parse the completed payload and extract the `function` directive.
    ///
    /// A malformed or truncated payload yields `None` rather than an
    /// error: by the time the stream ends the answer text has usually
    /// already been voiced, so a broken trailer must not abort the turn.
    pub fn finish(&self) -> Option<Value> {
        let payload: Value = match serde_json::from_str(&self.buffer) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Response payload did not parse as JSON: {}", e);
                return None;
            }
        };
        payload.get("function").filter(|f| !f.is_null()).cloned()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
