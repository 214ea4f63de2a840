//! JSON extraction from model output — fence-aware, balanced-brace scan.

/// Pull the first balanced `{...}` object out of model output, tolerating
/// markdown fences and preamble text. Returns `None` when nothing parses.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let mut text = text.trim();
    if let Some((_, after)) = text.split_once("```json") {
        text = after;
    }
    if let Some((before, _)) = text.split_once("```") {
        text = before;
    }
    let text = text.trim();

    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip a wrapping markdown code fence from generated file content.
pub fn strip_code_fences(code: &str) -> String {
    let code = code.trim();
    if !code.starts_with("```") {
        return code.to_string();
    }
    let mut lines: Vec<&str> = code.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}
