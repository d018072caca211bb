//! Client for the remote conversational service (Dify chat-messages
//! protocol): one request per turn over a persistent HTTP client, with the
//! response either returned whole (blocking mode) or exposed as an
//! incremental fragment stream with mid-stream cancellation.

pub mod segment;
pub mod stream;

use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

pub use segment::{DirectiveAccumulator, ResponseSegmenter};
pub use stream::{SseBuffer, StreamFrame, DONE_SENTINEL};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Stream transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: String,
    /// End-user identifier forwarded with every request.
    pub user: String,
    pub timeout: Duration,
}

impl ChatConfig {
    pub fn new(api_key: String, base_url: String, user: String) -> Self {
        Self {
            api_key,
            base_url,
            user,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Conversational service client.
///
/// Holds the conversation id once the server assigns one, and the task id
/// of an in-flight streamed response so [`ChatClient::stop`] can cancel
/// it. Both live behind mutexes so a cancellation can come from another
/// task than the one reading the stream.
pub struct ChatClient {
    client: Client,
    config: ChatConfig,
    conversation_id: Mutex<Option<String>>,
    task_id: Mutex<Option<String>>,
    last_request_time: Mutex<Duration>,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        // Streaming reads are bounded per-chunk by the server, not by a
        // whole-request timeout; connect_timeout guards the dial instead.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            config,
            conversation_id: Mutex::new(None),
            task_id: Mutex::new(None),
            last_request_time: Mutex::new(Duration::ZERO),
        })
    }

    fn payload(&self, query: &str, inputs: &Value, response_mode: &str) -> Value {
        let conversation_id = self
            .conversation_id
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default();
        json!({
            "inputs": inputs,
            "query": query,
            "response_mode": response_mode,
            "conversation_id": conversation_id,
            "user": self.config.user,
        })
    }

    fn adopt_conversation_id(&self, id: Option<&str>) {
        if let Some(id) = id {
            let mut guard = self.conversation_id.lock().unwrap();
            if guard.is_none() {
                log::debug!("Chat: conversation id assigned: {}", id);
                *guard = Some(id.to_string());
            }
        }
    }

    /// One-shot request in blocking mode; returns the full response payload.
    pub async fn send(&self, query: &str, inputs: &Value) -> Result<Value, ChatError> {
        let url = format!("{}/chat-messages", self.config.base_url);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&self.payload(query, inputs, "blocking"))
            .send()
            .await?;

        *self.last_request_time.lock().unwrap() = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        self.adopt_conversation_id(body.get("conversation_id").and_then(|v| v.as_str()));
        Ok(body)
    }

    /// Streaming request. Answer fragments of `message` events are
    /// forwarded over `tx` in arrival order until the `[DONE]` sentinel.
    ///
    /// The first record carrying a task id arms [`ChatClient::stop`]; the
    /// id is cleared again on normal completion so a later stop call is a
    /// no-op. Connection-level failures are fatal for this turn and are
    /// returned, never retried here.
    pub async fn send_streaming(
        &self,
        query: &str,
        inputs: &Value,
        tx: mpsc::Sender<String>,
    ) -> Result<(), ChatError> {
        // A cancelled or transport-failed turn never reaches the
        // normal-completion clear below, so drop any stale id here;
        // otherwise a later stop would target the wrong stream.
        *self.task_id.lock().unwrap() = None;

        let url = format!("{}/chat-messages", self.config.base_url);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(query, inputs, "streaming"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let mut body = response.bytes_stream();
        let mut sse = SseBuffer::new();
        let mut fragment_count = 0usize;

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ChatError::Transport(e.to_string()))?;
            for data in sse.push(&chunk) {
                if data == DONE_SENTINEL {
                    break 'read;
                }

                let frame: StreamFrame = match serde_json::from_str(&data) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("Chat: skipping undecodable record: {}", e);
                        continue;
                    }
                };

                // Capture identifiers from the first records that carry them.
                if let Some(task_id) = frame.task_id.as_deref() {
                    let mut guard = self.task_id.lock().unwrap();
                    if guard.is_none() {
                        log::debug!("Chat: task id observed: {}", task_id);
                        *guard = Some(task_id.to_string());
                    }
                }
                self.adopt_conversation_id(frame.conversation_id.as_deref());

                if let Some(fragment) = frame.answer_fragment() {
                    fragment_count += 1;
                    if tx.send(fragment.to_string()).await.is_err() {
                        // Consumer gone: the turn was torn down under us.
                        log::debug!("Chat: fragment consumer dropped, ending read");
                        break 'read;
                    }
                }
            }
        }

        // Clear the task id after normal completion so a later stop call
        // becomes a no-op.
        *self.task_id.lock().unwrap() = None;
        *self.last_request_time.lock().unwrap() = start.elapsed();

        log::info!(
            "Chat: stream complete ({} fragments in {:.0}ms)",
            fragment_count,
            start.elapsed().as_millis()
        );
        Ok(())
    }

    /// Cancel the in-flight streamed response, if any.
    ///
    /// Cancellation requires the task id from the stream's own records, so
    /// calling this before the first fragment arrived is a safe no-op.
    pub async fn stop(&self) -> Result<(), ChatError> {
        let task_id = self.task_id.lock().unwrap().clone();
        let Some(task_id) = task_id else {
            log::debug!("Chat: stop requested but no stream in flight");
            return Ok(());
        };

        let url = format!("{}/chat-messages/{}/stop", self.config.base_url, task_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(10))
            .json(&json!({ "user": self.config.user }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        // The stream is dead; a second stop must not target it again.
        *self.task_id.lock().unwrap() = None;

        log::info!("Chat: streaming stopped (task {})", task_id);
        Ok(())
    }

    /// Forget the current conversation so the server starts a fresh one.
    pub fn reset_conversation(&self) {
        *self.conversation_id.lock().unwrap() = None;
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id.lock().unwrap().clone()
    }

    pub fn last_request_time(&self) -> Duration {
        *self.last_request_time.lock().unwrap()
    }

    #[cfg(test)]
    fn set_task_id_for_test(&self, task_id: Option<String>) {
        *self.task_id.lock().unwrap() = task_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> ChatClient {
        ChatClient::new(ChatConfig::new(
            "app-test".to_string(),
            "http://127.0.0.1:1/v1".to_string(),
            "tester".to_string(),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_stop_without_task_id_is_noop() {
        // The base URL is unroutable: if stop issued a request this would
        // return a transport error instead of Ok.
        let client = test_client();
        assert!(client.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_with_task_id_hits_network() {
        let client = test_client();
        client.set_task_id_for_test(Some("task-1".to_string()));
        assert!(client.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_new_stream_drops_task_id_of_aborted_turn() {
        // A turn torn down mid-stream leaves its task id armed. The next
        // stream must discard it, even when that stream itself fails
        // before producing any records.
        let client = test_client();
        client.set_task_id_for_test(Some("task-1".to_string()));

        let (tx, _rx) = mpsc::channel(4);
        let result = client.send_streaming("hello again", &json!({}), tx).await;
        assert!(result.is_err(), "unroutable endpoint should fail the turn");

        // With the stale id gone, stop is a no-op; were "task-1" still
        // held, this would issue a request and surface a transport error.
        assert!(client.stop().await.is_ok());
    }

    #[test]
    fn test_payload_shape() {
        let client = test_client();
        let inputs = json!({"speaker": "alice", "emotion": "happy"});
        let payload = client.payload("hello", &inputs, "streaming");

        assert_eq!(payload["query"], "hello");
        assert_eq!(payload["response_mode"], "streaming");
        assert_eq!(payload["conversation_id"], "");
        assert_eq!(payload["user"], "tester");
        assert_eq!(payload["inputs"]["speaker"], "alice");
    }

    #[test]
    fn test_conversation_id_adopted_once() {
        let client = test_client();
        assert_eq!(client.conversation_id(), None);

        client.adopt_conversation_id(Some("conv-1"));
        client.adopt_conversation_id(Some("conv-2"));
        assert_eq!(client.conversation_id(), Some("conv-1".to_string()));

        client.reset_conversation();
        assert_eq!(client.conversation_id(), None);
        client.adopt_conversation_id(Some("conv-2"));
        assert_eq!(client.conversation_id(), Some("conv-2".to_string()));
    }
}
