//! Tool: write_file — line 1 of the arguments is the path, the rest is the
//! content. Subject to the full write sandbox.

use async_trait::async_trait;

use super::sandbox::validate_path;
use super::{Tool, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a file. First line of the arguments is the path, the rest is \
         the content. Creates parent directories; overwrites existing files."
    }

    async fn run(&self, args: &str) -> ToolResult {
        let (path, content) = match args.split_once('\n') {
            Some((path, content)) => (path.trim(), content),
            None => (args.trim(), ""),
        };
        if path.is_empty() {
            return ToolResult::error("No path given");
        }

        let resolved = match validate_path(path, false) {
            Ok(p) => p,
            Err(reason) => return ToolResult::error(reason),
        };

        if let Some(parent) = resolved.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolResult::error(format!(
                        "Failed to create directories for '{path}': {e}"
                    ));
                }
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolResult::success(format!(
                "Wrote {} bytes to {}",
                content.len(),
                resolved.display()
            )),
            Err(e) => ToolResult::error(format!("Failed to write '{path}': {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S3: a write outside home must come back as a denial and leave the
    // target untouched.
    #[tokio::test]
    async fn write_outside_home_is_denied() {
        let tool = WriteFileTool;
        let result = tool.run("/etc/passwd\nowned").await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Access denied"));
    }
}
