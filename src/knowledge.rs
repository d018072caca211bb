//! Client for the knowledge-base (dataset) side of the conversational
//! service: listing documents, creating documents from text, and appending
//! segments to an existing document. Used to persist conversation history
//! between sessions.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub api_key: String,
    pub base_url: String,
    pub dataset_id: String,
}

pub struct KnowledgeClient {
    client: Client,
    config: KnowledgeConfig,
}

impl KnowledgeClient {
    pub fn new(config: KnowledgeConfig) -> Result<Self, KnowledgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    async fn check(response: reqwest::Response) -> Result<Value, KnowledgeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KnowledgeError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// List documents in the dataset.
    pub async fn document_list(&self) -> Result<Value, KnowledgeError> {
        let url = format!(
            "{}/datasets/{}/documents",
            self.config.base_url, self.config.dataset_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Create a new document from raw text, segmented on blank lines.
    pub async fn create_document_from_text(
        &self,
        name: &str,
        text: &str,
    ) -> Result<Value, KnowledgeError> {
        let url = format!(
            "{}/datasets/{}/document/create_by_text",
            self.config.base_url, self.config.dataset_id
        );
        let payload = json!({
            "name": name,
            "text": text,
            "indexing_technique": "high_quality",
            "process_rule": {
                "mode": "custom",
                "rules": {
                    "pre_processing_rules": [
                        {"id": "remove_extra_spaces", "enabled": true},
                        {"id": "remove_urls_emails", "enabled": false},
                    ],
                    "segmentation": {
                        "separator": "\n\n",
                        "max_tokens": 1024,
                        "chunk_overlap": 50,
                    },
                },
            },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;
        let body = Self::check(response).await?;
        log::info!("Knowledge: created document '{}'", name);
        Ok(body)
    }

    /// Append text segments to an existing document.
    pub async fn add_segments(
        &self,
        document_id: &str,
        contents: &[String],
    ) -> Result<Value, KnowledgeError> {
        let url = format!(
            "{}/datasets/{}/documents/{}/segments",
            self.config.base_url, self.config.dataset_id, document_id
        );
        let segments: Vec<Value> = contents
            .iter()
            .map(|content| json!({ "content": content }))
            .collect();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "segments": segments }))
            .send()
            .await?;
        let body = Self::check(response).await?;
        log::info!(
            "Knowledge: appended {} segment(s) to document {}",
            contents.len(),
            document_id
        );
        Ok(body)
    }
}
