//! Cloud brain — provider-agnostic remote LLM integration.
//!
//! Supports any OpenAI-compatible provider plus Anthropic's native wire
//! format. The provider is auto-detected from the API key prefix; an
//! explicit URL override wins, and a URL containing "anthropic" upgrades
//! the wire format.
//!
//! Env vars:
//!   BOLT_CLOUD_KEY   — any provider's API key (ANTHROPIC_API_KEY works too)
//!   BOLT_CLOUD_MODEL — override model name
//!   BOLT_CLOUD_URL   — override API endpoint

use std::time::{Duration, Instant};

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cloud_stream::{process_anthropic, process_openai, StreamOutcome};
use crate::provider::{
    normalize_messages, ChatBackend, ChatMessage, CloudBackend, ProviderError, WireRole,
    INFERENCE_TIMEOUT_SECS,
};
use crate::stream::{StreamErrorKind, StreamEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLOUD_MAX_TOKENS: u32 = 8192;
/// Availability checks are cached this long. Any HTTP reply counts as
/// reachable; a mid-stream connection loss evicts the cache entry.
const AVAILABILITY_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Anthropic,
    OpenAi,
}

/// Resolved cloud provider: who we talk to and how.
#[derive(Debug, Clone)]
pub struct CloudProvider {
    pub name: String,
    pub url: String,
    pub model: String,
    pub format: WireFormat,
    pub key: String,
}

/// Key-prefix detection table. Longer prefixes first so `sk-ant-` matches
/// before the `sk-` catch-all.
const PROVIDER_TABLE: &[(&str, &str, &str, &str, WireFormat)] = &[
    (
        "sk-ant-",
        "Anthropic",
        "https://api.anthropic.com/v1/messages",
        "claude-sonnet-4-6",
        WireFormat::Anthropic,
    ),
    (
        "sk-or-",
        "OpenRouter",
        "https://openrouter.ai/api/v1/chat/completions",
        "anthropic/claude-sonnet-4-6",
        WireFormat::OpenAi,
    ),
    (
        "gsk_",
        "Groq",
        "https://api.groq.com/openai/v1/chat/completions",
        "llama-3.3-70b-versatile",
        WireFormat::OpenAi,
    ),
    (
        "sk-",
        "OpenAI",
        "https://api.openai.com/v1/chat/completions",
        "gpt-4o",
        WireFormat::OpenAi,
    ),
];

/// Read env vars and auto-detect the provider. `None` when no key is set or
/// the key prefix is unknown and no URL override is given.
pub fn resolve_from_env() -> Option<CloudProvider> {
    let key = std::env::var("BOLT_CLOUD_KEY")
        .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())?;

    let url_override = std::env::var("BOLT_CLOUD_URL").ok().filter(|v| !v.is_empty());
    let model_override = std::env::var("BOLT_CLOUD_MODEL").ok().filter(|v| !v.is_empty());

    let mut provider = PROVIDER_TABLE
        .iter()
        .find(|(prefix, ..)| key.starts_with(prefix))
        .map(|(_, name, url, model, format)| CloudProvider {
            name: name.to_string(),
            url: url.to_string(),
            model: model.to_string(),
            format: *format,
            key: key.clone(),
        });

    if provider.is_none() {
        // Unknown key prefix — usable only with an explicit URL.
        let url = url_override.clone()?;
        provider = Some(CloudProvider {
            name: "Custom".to_string(),
            url,
            model: model_override.clone().unwrap_or_else(|| "unknown".to_string()),
            format: WireFormat::OpenAi,
            key: key.clone(),
        });
    }

    let mut provider = provider?;
    if let Some(url) = url_override {
        provider.url = url;
    }
    if let Some(model) = model_override {
        provider.model = model;
    }
    if provider.url.contains("anthropic") {
        provider.format = WireFormat::Anthropic;
    }

    info!(provider = %provider.name, model = %provider.model, "cloud brain configured");
    Some(provider)
}

struct AvailabilityCache {
    result: Option<bool>,
    checked_at: Option<Instant>,
}

/// Remote chat backend with cached reachability.
pub struct CloudClient {
    client: reqwest::Client,
    provider: Option<CloudProvider>,
    cache: Mutex<AvailabilityCache>,
}

impl CloudClient {
    pub fn from_env() -> Self {
        Self::with_provider(resolve_from_env())
    }

    pub fn with_provider(provider: Option<CloudProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
            cache: Mutex::new(AvailabilityCache {
                result: None,
                checked_at: None,
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Evict the availability cache so the next `is_available` rechecks.
    fn mark_unreachable(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.result = None;
    }

    /// Quick connectivity check. Any HTTP response means the endpoint is
    /// reachable (auth errors included — the server answered).
    async fn ping(&self) -> bool {
        let Some(provider) = &self.provider else {
            return false;
        };
        let mut req = self.client.get(&provider.url).timeout(Duration::from_secs(5));
        req = match provider.format {
            WireFormat::Anthropic => req.header("x-api-key", &provider.key),
            WireFormat::OpenAi => req.bearer_auth(&provider.key),
        };
        match req.send().await {
            Ok(resp) => matches!(resp.status().as_u16(), 200 | 401 | 403 | 404 | 405),
            Err(_) => false,
        }
    }

    async fn post_payload(
        &self,
        provider: &CloudProvider,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut req = self
            .client
            .post(&provider.url)
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(INFERENCE_TIMEOUT_SECS))
            .json(payload);
        req = match provider.format {
            WireFormat::Anthropic => req
                .header("x-api-key", &provider.key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            WireFormat::OpenAi => req.bearer_auth(&provider.key),
        };
        req.send().await
    }
}

/// Split out system text and force the conversation to start with a user
/// message, as the Anthropic messages API requires.
fn prepare_anthropic(messages: &[ChatMessage]) -> (Option<String>, Vec<ChatMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut chat: Vec<ChatMessage> = Vec::new();

    for m in messages {
        if m.content.trim().is_empty() {
            continue;
        }
        if m.role == WireRole::System {
            system_parts.push(&m.content);
            continue;
        }
        match chat.last_mut() {
            Some(last) if last.role == m.role => {
                last.content.push('\n');
                last.content.push_str(&m.content);
            }
            _ => chat.push(m.clone()),
        }
    }

    if let Some(first) = chat.first() {
        if first.role != WireRole::User {
            chat.insert(0, ChatMessage::user("(continuing conversation)"));
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, chat)
}

/// Best-effort extraction of `error.message` from a provider error body.
async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status().as_u16();
    match resp.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}"),
    }
}

#[async_trait]
impl ChatBackend for CloudClient {
    fn name(&self) -> &str {
        self.provider
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("cloud")
    }

    async fn send(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        // The cloud path is stream-only on the wire; collect events locally.
        // The drain runs concurrently so a long response never backs up the
        // channel.
        let (tx, mut rx) = mpsc::channel(64);
        let stream_fut = self.send_stream(model, messages, tx);
        let drain_fut = async {
            let mut text = String::new();
            let mut first_error: Option<String> = None;
            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::Text { text: t } => text.push_str(&t),
                    StreamEvent::Error { message, .. } => {
                        first_error.get_or_insert(message);
                    }
                    StreamEvent::Done => {}
                }
            }
            (text, first_error)
        };
        let ((), (text, first_error)) = tokio::join!(stream_fut, drain_fut);

        if text.is_empty() {
            if let Some(err) = first_error {
                return Err(ProviderError::Unavailable(err));
            }
        }
        Ok(text)
    }

    async fn send_stream(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let Some(provider) = self.provider.clone() else {
            let _ = tx
                .send(StreamEvent::Error {
                    kind: StreamErrorKind::Empty,
                    message: "cloud brain unavailable — no API key set".to_string(),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            return;
        };

        let payload = match provider.format {
            WireFormat::Anthropic => {
                let (system, chat) = prepare_anthropic(messages);
                if chat.is_empty() {
                    let _ = tx
                        .send(StreamEvent::Error {
                            kind: StreamErrorKind::Empty,
                            message: "no messages to send".to_string(),
                        })
                        .await;
                    let _ = tx.send(StreamEvent::Done).await;
                    return;
                }
                let mut payload = serde_json::json!({
                    "model": provider.model,
                    "max_tokens": CLOUD_MAX_TOKENS,
                    "stream": true,
                    "messages": chat,
                });
                if let Some(system) = system {
                    payload["system"] = serde_json::Value::String(system);
                }
                payload
            }
            WireFormat::OpenAi => {
                let clean = normalize_messages(messages);
                if clean.is_empty() {
                    let _ = tx
                        .send(StreamEvent::Error {
                            kind: StreamErrorKind::Empty,
                            message: "no messages to send".to_string(),
                        })
                        .await;
                    let _ = tx.send(StreamEvent::Done).await;
                    return;
                }
                serde_json::json!({
                    "model": provider.model,
                    "max_tokens": CLOUD_MAX_TOKENS,
                    "stream": true,
                    "messages": clean,
                })
            }
        };

        debug!(provider = %provider.name, model = %provider.model, "sending streaming request to cloud");

        let resp = match self.post_payload(&provider, &payload).await {
            Ok(r) => r,
            Err(e) => {
                if e.is_connect() {
                    self.mark_unreachable();
                }
                let message = if e.is_timeout() {
                    "cloud brain timed out — we're local now".to_string()
                } else {
                    format!("can't reach cloud brain — we're local now ({e})")
                };
                let _ = tx
                    .send(StreamEvent::Error {
                        kind: StreamErrorKind::Transport,
                        message,
                    })
                    .await;
                let _ = tx.send(StreamEvent::Done).await;
                return;
            }
        };

        if !resp.status().is_success() {
            let message = error_message(resp).await;
            warn!(provider = %provider.name, %message, "cloud API error");
            let _ = tx
                .send(StreamEvent::Error {
                    kind: StreamErrorKind::Http,
                    message: format!("cloud error — {message}"),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            return;
        }

        let outcome = match provider.format {
            WireFormat::Anthropic => process_anthropic(resp, tx).await,
            WireFormat::OpenAi => process_openai(resp, tx).await,
        };
        if outcome == StreamOutcome::ConnectionLost {
            self.mark_unreachable();
        }
    }
}

#[async_trait]
impl CloudBackend for CloudClient {
    async fn is_available(&self) -> bool {
        if self.provider.is_none() {
            return false;
        }

        {
            let cache = self.cache.lock().unwrap();
            if let (Some(result), Some(checked_at)) = (cache.result, cache.checked_at) {
                if checked_at.elapsed() < AVAILABILITY_TTL {
                    return result;
                }
            }
        }

        let result = self.ping().await;
        let mut cache = self.cache.lock().unwrap();
        cache.result = Some(result);
        cache.checked_at = Some(Instant::now());
        result
    }

    fn display_name(&self) -> String {
        match &self.provider {
            Some(p) => format!("{} @ {}", p.model, p.name),
            None => String::new(),
        }
    }
}
