//! Tool system — registry, inline call markup, and built-in tools.
//!
//! Models emit calls as `<tool name="X">ARGS</tool>`; results are fed back
//! as `<tool_result name="X">...</tool_result>`. Handlers take the raw text
//! between the tags and return text. Execution never panics across the
//! registry boundary — every failure becomes an error-flagged result.

pub mod edit_file;
pub mod list_files;
pub mod plugin;
pub mod python_exec;
pub mod read_file;
pub mod sandbox;
pub mod shell;
pub mod write_file;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

/// Tool output beyond this many characters is truncated with a marker.
pub const MAX_TOOL_RESULT_CHARS: usize = 8000;

/// Result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Text content returned to the model.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools implement. `args` is the raw text between the
/// `<tool>` tags.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "read_file").
    fn name(&self) -> &str;
    /// Human-readable description shown in tool listings.
    fn description(&self) -> &str;
    /// Execute the tool with the given argument text.
    async fn run(&self, args: &str) -> ToolResult;
}

/// A parsed inline tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub args: String,
}

fn tool_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<tool\s+name="([^"]+)">(.*?)</tool>"#).unwrap())
}

/// Extract tool calls from model output and return the text with the call
/// markup stripped.
pub fn parse_tool_calls(text: &str) -> (Vec<ToolCall>, String) {
    let re = tool_call_regex();
    let calls = re
        .captures_iter(text)
        .map(|cap| ToolCall {
            name: cap[1].to_string(),
            args: cap[2].to_string(),
        })
        .collect();
    let cleaned = re.replace_all(text, "").trim().to_string();
    (calls, cleaned)
}

/// Frame a tool result for feeding back to the model, truncating oversized
/// output with a visible marker.
pub fn format_tool_result(name: &str, result: &str) -> String {
    let body = if result.len() > MAX_TOOL_RESULT_CHARS {
        let mut end = MAX_TOOL_RESULT_CHARS;
        while end > 0 && !result.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &result[..end])
    } else {
        result.to_string()
    };
    format!("<tool_result name=\"{name}\">{body}</tool_result>")
}

/// Named tool lookup and dispatch.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry preloaded with the built-in tools.
    pub fn with_builtins(tool_timeout_secs: u64) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(shell::ShellTool::new(tool_timeout_secs)));
        registry.register(Box::new(read_file::ReadFileTool));
        registry.register(Box::new(write_file::WriteFileTool));
        registry.register(Box::new(edit_file::EditFileTool));
        registry.register(Box::new(list_files::ListFilesTool));
        registry.register(Box::new(python_exec::PythonExecTool::new(tool_timeout_secs)));
        registry
    }

    /// Register a tool. A duplicate name replaces the earlier registration.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if self.tools.contains_key(tool.name()) {
            warn!(tool = tool.name(), "replacing existing tool registration");
        }
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Scan a plugin directory and register every loadable plugin. Faulty
    /// plugins are reported and skipped; startup never aborts.
    pub fn load_plugins(&mut self, dir: &str, tool_timeout_secs: u64) {
        for tool in plugin::scan_plugin_dir(dir, tool_timeout_secs) {
            self.register(Box::new(tool));
        }
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn list(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a named tool. Unknown names and handler failures come back as
    /// error-flagged results — this never panics or propagates.
    pub async fn execute(&self, name: &str, args: &str) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => {
                debug!(tool = name, args_len = args.len(), "executing tool");
                tool.run(args).await
            }
            None => ToolResult::error(format!("Unknown tool: {name}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments back"
        }
        async fn run(&self, args: &str) -> ToolResult {
            ToolResult::success(args.to_string())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Tool for AlwaysFails {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn run(&self, _args: &str) -> ToolResult {
            ToolResult::error("Tool error: intentional")
        }
    }

    #[test]
    fn parse_extracts_calls_and_strips_markup() {
        let text = "Let me check.\n<tool name=\"calc\">2+2</tool>\nDone.";
        let (calls, cleaned) = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calc");
        assert_eq!(calls[0].args, "2+2");
        assert_eq!(cleaned, "Let me check.\n\nDone.");
    }

    #[test]
    fn parse_handles_multiline_args() {
        let text = "<tool name=\"write_file\">/tmp/x.txt\nline one\nline two</tool>";
        let (calls, cleaned) = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, "/tmp/x.txt\nline one\nline two");
        assert!(cleaned.is_empty());
    }

    #[test]
    fn parse_finds_multiple_calls_in_order() {
        let text = "<tool name=\"a\">1</tool> mid <tool name=\"b\">2</tool>";
        let (calls, cleaned) = parse_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
        assert_eq!(cleaned, "mid");
    }

    #[test]
    fn parse_returns_text_unchanged_without_calls() {
        let (calls, cleaned) = parse_tool_calls("just a normal reply");
        assert!(calls.is_empty());
        assert_eq!(cleaned, "just a normal reply");
    }

    #[test]
    fn format_truncates_oversized_results() {
        let long = "x".repeat(MAX_TOOL_RESULT_CHARS + 100);
        let framed = format_tool_result("shell", &long);
        assert!(framed.contains("... (truncated)"));
        assert!(framed.starts_with("<tool_result name=\"shell\">"));
        assert!(framed.ends_with("</tool_result>"));
    }

    #[test]
    fn format_keeps_small_results_intact() {
        let framed = format_tool_result("calc", "4");
        assert_eq!(framed, "<tool_result name=\"calc\">4</tool_result>");
    }

    #[tokio::test]
    async fn registry_dispatches_and_handles_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        registry.register(Box::new(AlwaysFails));

        let result = registry.execute("echo", "hello").await;
        assert!(!result.is_error);
        assert_eq!(result.content, "hello");

        let result = registry.execute("broken", "").await;
        assert!(result.is_error);

        let result = registry.execute("missing", "").await;
        assert!(result.is_error);
        assert_eq!(result.content, "Unknown tool: missing");
    }

    #[test]
    fn builtins_are_all_registered() {
        let registry = ToolRegistry::with_builtins(120);
        let names: Vec<String> = registry.list().into_iter().map(|(n, _)| n).collect();
        for expected in [
            "edit_file",
            "list_files",
            "python_exec",
            "read_file",
            "shell",
            "write_file",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
