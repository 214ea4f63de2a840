use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{
    compact_messages, normalize_messages, ChatBackend, ChatMessage, ModelHost, ProviderError,
    INFERENCE_TIMEOUT_SECS,
};
use crate::stream::{StreamErrorKind, StreamEvent};

/// Local inference backend — chat, raw generation, and model residency
/// against an Ollama-compatible server.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });
        let url = format!("{}/api/chat", self.base_url);
        self.client
            .post(&url)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(INFERENCE_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Unavailable(e.to_string())
                } else {
                    ProviderError::Http(e)
                }
            })
    }

    /// Non-streaming chat against the reduced context. Used for the one-shot
    /// retry after an HTTP error.
    async fn send_compacted(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let fallback = compact_messages(messages);
        if fallback.is_empty() {
            return Err(ProviderError::Empty);
        }
        let resp = self.post_chat(model, &fallback, false).await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        let api_resp: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(api_resp.message.content)
    }

    /// List models currently loaded on the server (`/api/ps`).
    async fn loaded_models(&self) -> Vec<String> {
        let url = format!("{}/api/ps", self.base_url);
        let resp = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return Vec::new(),
        };
        match resp.json::<PsResponse>().await {
            Ok(ps) => ps.models.into_iter().map(|m| m.name).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Fire a `/api/generate` request, ignoring failures. Residency control
    /// is best-effort — a dead server just means nothing to unload.
    async fn generate_quiet(&self, body: serde_json::Value, timeout_secs: u64) {
        let url = format!("{}/api/generate", self.base_url);
        let _ = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(timeout_secs))
            .json(&body)
            .send()
            .await;
    }

    /// Warm the given models at startup if the server doesn't already have
    /// them loaded. Failures are logged and non-fatal.
    pub async fn preload(&self, models: &[&str]) {
        let loaded = self.loaded_models().await;
        for model in models {
            if loaded.iter().any(|m| m == model) {
                continue;
            }
            debug!(model, "preloading model");
            self.generate_quiet(
                serde_json::json!({ "model": model, "prompt": "hi", "keep_alive": "30m" }),
                120,
            )
            .await;
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let clean = normalize_messages(messages);
        if clean.is_empty() {
            return Err(ProviderError::Empty);
        }

        debug!(model, "sending request to Ollama");
        let resp = self.post_chat(model, &clean, false).await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error, retrying with smaller context");
            // One retry with the reduced context before giving up.
            return self.send_compacted(model, &clean).await;
        }

        let api_resp: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(api_resp.message.content)
    }

    async fn send_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let clean = normalize_messages(messages);
        if clean.is_empty() {
            let _ = tx
                .send(StreamEvent::Error {
                    kind: StreamErrorKind::Empty,
                    message: "no context to send".to_string(),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            return;
        }

        debug!(model, "sending streaming request to Ollama");
        let resp = match self.post_chat(model, &clean, true).await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: StreamErrorKind::Transport,
                        message: format!("cannot reach Ollama at {}: {e}", self.base_url),
                    })
                    .await;
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
        };

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status, body = %body, "Ollama streaming API error");
            let _ = tx
                .send(StreamEvent::Error {
                    kind: StreamErrorKind::Http,
                    message: format!("model error (HTTP {status}), retrying with smaller context"),
                })
                .await;
            // One retry with the reduced context, non-streaming.
            match self.send_compacted(model, &clean).await {
                Ok(text) => {
                    let _ = tx.send(StreamEvent::Text { text }).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            kind: StreamErrorKind::Http,
                            message: format!("retry failed: {e}"),
                        })
                        .await;
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
            return;
        }

        process_chat_stream(resp, tx).await;
    }
}

#[async_trait]
impl ModelHost for OllamaClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        timeout_secs: u64,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Unavailable(e.to_string())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(api_resp.response)
    }

    async fn warm(&self, model: &str) {
        debug!(model, "warming model");
        self.generate_quiet(
            serde_json::json!({ "model": model, "prompt": "hi", "keep_alive": "10m" }),
            180,
        )
        .await;
    }

    async fn unload(&self, model: &str) {
        debug!(model, "unloading model");
        self.generate_quiet(
            serde_json::json!({ "model": model, "prompt": "", "keep_alive": 0 }),
            30,
        )
        .await;
    }

    async fn unload_all_except(&self, keep: &str) {
        for model in self.loaded_models().await {
            if model != keep {
                self.unload(&model).await;
            }
        }
    }

    async fn keep_alive(&self, model: &str) {
        self.generate_quiet(
            serde_json::json!({ "model": model, "prompt": "", "keep_alive": "10m" }),
            15,
        )
        .await;
    }
}

/// Parse Ollama's newline-delimited JSON streaming format. Each line is a
/// JSON object; a `done: true` record terminates the stream.
async fn process_chat_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: StreamErrorKind::Transport,
                        message: e.to_string(),
                    })
                    .await;
                break;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamChunk>(line) {
                Ok(data) => {
                    let text = data.message.map(|m| m.content).unwrap_or_default();
                    if !text.is_empty() && tx.send(StreamEvent::Text { text }).await.is_err() {
                        return; // receiver dropped
                    }
                    if data.done {
                        break 'outer;
                    }
                }
                Err(e) => {
                    warn!(line, err = %e, "failed to parse Ollama stream chunk");
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done).await;
}

// Ollama API response types (private — deserialization only)

#[derive(Deserialize)]
struct ChatApiResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<PsModel>,
}

#[derive(Deserialize)]
struct PsModel {
    name: String,
}
