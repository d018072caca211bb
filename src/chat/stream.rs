use serde::Deserialize;

/// Sentinel payload that terminates the event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One structured record from the conversation stream.
///
/// Records arrive strictly sequentially; only `message` events carry
/// answer text. `task_id` shows up on the first few records and is what
/// the stop endpoint needs for mid-stream cancellation.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub event: String,
    pub answer: Option<String>,
    pub conversation_id: Option<String>,
    pub task_id: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl StreamFrame {
    /// Extract the answer text carried by this record, if any.
    ///
    /// Some deployments nest the answer under `data` for certain event
    /// shapes, so both locations are checked.
    pub fn answer_fragment(&self) -> Option<&str> {
        if self.event != "message" {
            return None;
        }
        if let Some(answer) = self.answer.as_deref() {
            if !answer.is_empty() {
                return Some(answer);
            }
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("answer"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Incremental decoder for a server-sent-event byte stream.
///
/// Bytes are buffered until a full line is available; only `data: ` lines
/// are surfaced. A multi-byte UTF-8 character split across network chunks
/// stays buffered until its line completes.
#[derive(Default)]
pub struct SseBuffer {
    buf: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and return the data payloads of every line
    /// completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(data) = line.strip_prefix("data: ") {
                payloads.push(data.trim().to_string());
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_message_answer() {
        let frame: StreamFrame =
            serde_json::from_str(r#"{"event": "message", "answer": "hi", "task_id": "t1"}"#)
                .unwrap();
        assert_eq!(frame.answer_fragment(), Some("hi"));
        assert_eq!(frame.task_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_frame_non_message_carries_no_text() {
        let frame: StreamFrame =
            serde_json::from_str(r#"{"event": "message_end", "answer": "ignored"}"#).unwrap();
        assert_eq!(frame.answer_fragment(), None);
    }

    #[test]
    fn test_frame_nested_data_answer() {
        let frame: StreamFrame =
            serde_json::from_str(r#"{"event": "message", "data": {"answer": "nested"}}"#).unwrap();
        assert_eq!(frame.answer_fragment(), Some("nested"));
    }

    #[test]
    fn test_frame_empty_answer_is_none() {
        let frame: StreamFrame =
            serde_json::from_str(r#"{"event": "message", "answer": ""}"#).unwrap();
        assert_eq!(frame.answer_fragment(), None);
    }

    #[test]
    fn test_sse_single_line() {
        let mut sse = SseBuffer::new();
        let out = sse.push(b"data: {\"event\": \"message\"}\n\n");
        assert_eq!(out, vec![r#"{"event": "message"}"#.to_string()]);
    }

    #[test]
    fn test_sse_line_split_across_chunks() {
        let mut sse = SseBuffer::new();
        assert!(sse.push(b"da").is_empty());
        assert!(sse.push(b"ta: hel").is_empty());
        let out = sse.push(b"lo\n");
        assert_eq!(out, vec!["hello".to_string()]);
    }

    #[test]
    fn test_sse_multiple_lines_in_one_chunk() {
        let mut sse = SseBuffer::new();
        let out = sse.push(b"data: one\n\ndata: two\n");
        assert_eq!(out, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_sse_ignores_non_data_lines() {
        let mut sse = SseBuffer::new();
        let out = sse.push(b"event: ping\n: comment\ndata: real\n");
        assert_eq!(out, vec!["real".to_string()]);
    }

    #[test]
    fn test_sse_done_sentinel_passes_through() {
        let mut sse = SseBuffer::new();
        let out = sse.push(b"data: [DONE]\n");
        assert_eq!(out, vec![DONE_SENTINEL.to_string()]);
    }

    #[test]
    fn test_sse_utf8_split_mid_character() {
        let mut sse = SseBuffer::new();
        let line = "data: 你好\n".as_bytes();
        // Split inside the first multi-byte character.
        assert!(sse.push(&line[..8]).is_empty());
        let out = sse.push(&line[8..]);
        assert_eq!(out, vec!["你好".to_string()]);
    }
}
