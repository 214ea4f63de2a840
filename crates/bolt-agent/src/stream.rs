/// Why a stream produced an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Network failure, timeout, or mid-stream connection loss.
    Transport,
    /// Non-2xx HTTP response from the model server or provider.
    Http,
    /// Malformed payload from the provider.
    Parse,
    /// Nothing to send — the normalized message list came out empty.
    Empty,
}

/// Events emitted during a streaming model response.
///
/// Backends never return `Err` once a stream has started; every failure is
/// delivered in-band so callers can keep a partial response. The UI layer
/// decides how to render `Error` events.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    Text { text: String },

    /// In-band failure. May be followed by more text when the backend
    /// recovers (e.g. the local compacted-context retry).
    Error {
        kind: StreamErrorKind,
        message: String,
    },

    /// Stream finished. Always the last event.
    Done,
}

/// Extract the payload of an SSE `data:` line. Returns `None` for blank
/// lines, `event:` lines, and comments.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_strips_prefix() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: message_start"), None);
        assert_eq!(sse_data(""), None);
    }
}
