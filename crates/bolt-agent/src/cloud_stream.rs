use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stream::{sse_data, StreamErrorKind, StreamEvent};

/// How a cloud stream ended. `ConnectionLost` tells the client to evict its
/// availability cache so the next call rechecks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    ConnectionLost,
}

/// Parse Anthropic-style SSE and emit stream events.
/// Text arrives via `content_block_delta`/`text_delta`; `message_stop`
/// terminates; `error` yields an in-band error then stops.
pub async fn process_anthropic(
    resp: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
) -> StreamOutcome {
    use futures_util::StreamExt;

    let mut partial = false;
    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();
    let mut outcome = StreamOutcome::Completed;

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let message = if partial {
                    "connection lost, switching to local".to_string()
                } else {
                    format!("cloud connection dropped: {e}")
                };
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: StreamErrorKind::Transport,
                        message,
                    })
                    .await;
                outcome = StreamOutcome::ConnectionLost;
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
            let Some(data) = sse_data(line) else { continue };
            if data.trim() == "[DONE]" {
                break 'outer;
            }
            let event: AnthropicEvent = match serde_json::from_str(data) {
                Ok(e) => e,
                Err(_) => continue,
            };

            match event.event_type.as_str() {
                "content_block_delta" => {
                    if let Some(delta) = event.delta {
                        if delta.delta_type.as_deref() == Some("text_delta") {
                            if let Some(text) = delta.text {
                                if !text.is_empty() {
                                    debug!(len = text.len(), "cloud stream text delta");
                                    partial = true;
                                    if tx.send(StreamEvent::Text { text }).await.is_err() {
                                        return StreamOutcome::Completed;
                                    }
                                }
                            }
                        }
                    }
                }
                "message_stop" => break 'outer,
                "error" => {
                    let message = event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown error".to_string());
                    warn!(%message, "anthropic stream error");
                    let (kind, message) = if partial {
                        (StreamErrorKind::Transport, format!("connection lost — {message}"))
                    } else {
                        (StreamErrorKind::Http, format!("cloud error — {message}"))
                    };
                    let _ = tx.send(StreamEvent::Error { kind, message }).await;
                    break 'outer;
                }
                _ => {}
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done).await;
    outcome
}

/// Parse OpenAI-compatible SSE: text in `choices[0].delta.content`;
/// `[DONE]` or a `finish_reason` terminates.
pub async fn process_openai(
    resp: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
) -> StreamOutcome {
    use futures_util::StreamExt;

    let mut partial = false;
    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();
    let mut outcome = StreamOutcome::Completed;

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let message = if partial {
                    "connection lost, switching to local".to_string()
                } else {
                    format!("cloud connection dropped: {e}")
                };
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: StreamErrorKind::Transport,
                        message,
                    })
                    .await;
                outcome = StreamOutcome::ConnectionLost;
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
            let Some(data) = sse_data(line) else { continue };
            if data.trim() == "[DONE]" {
                break 'outer;
            }
            let chunk: OpenAiChunk = match serde_json::from_str(data) {
                Ok(c) => c,
                Err(_) => continue,
            };

            if let Some(choice) = chunk.choices.first() {
                if let Some(text) = choice.delta.content.clone() {
                    if !text.is_empty() {
                        partial = true;
                        if tx.send(StreamEvent::Text { text }).await.is_err() {
                            return StreamOutcome::Completed;
                        }
                    }
                }
                if choice.finish_reason.is_some() {
                    break 'outer;
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done).await;
    outcome
}

// SSE data types (private — deserialization only)

#[derive(Deserialize)]
struct AnthropicEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    delta: Option<AnthropicDelta>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    content: Option<String>,
}
