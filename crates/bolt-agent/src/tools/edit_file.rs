//! Tool: edit_file — find/replace in a file. Line 1 = path, line 2 = text to
//! find, remaining lines = replacement. Fails when the needle is absent.

use async_trait::async_trait;

use super::sandbox::validate_path;
use super::{Tool, ToolResult};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by find/replace. Line 1 = path, line 2 = old text, \
         remaining lines = new text. Fails if the old text is not found."
    }

    async fn run(&self, args: &str) -> ToolResult {
        let mut parts = args.splitn(3, '\n');
        let path = parts.next().unwrap_or("").trim();
        let old = match parts.next() {
            Some(o) if !o.is_empty() => o,
            _ => return ToolResult::error("Usage: line 1 = path, line 2 = old text, line 3 = new text"),
        };
        let new = parts.next().unwrap_or("");

        let resolved = match validate_path(path, false) {
            Ok(p) => p,
            Err(reason) => return ToolResult::error(reason),
        };

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read '{path}': {e}")),
        };

        if !content.contains(old) {
            return ToolResult::error(format!("Edit failed: text not found in {path}"));
        }

        let count = content.matches(old).count();
        let updated = content.replace(old, new);
        match tokio::fs::write(&resolved, updated).await {
            Ok(()) => ToolResult::success(format!(
                "Replaced {count} occurrence(s) in {}",
                resolved.display()
            )),
            Err(e) => ToolResult::error(format!("Failed to write '{path}': {e}")),
        }
    }
}
