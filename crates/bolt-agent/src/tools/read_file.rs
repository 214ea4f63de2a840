//! Tool: read_file — read file contents. Read-only, so the denied-subtree
//! list does not apply, but home confinement does.

use async_trait::async_trait;

use super::sandbox::validate_path;
use super::{Tool, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file under the home directory."
    }

    async fn run(&self, args: &str) -> ToolResult {
        let path = args.trim();
        if path.is_empty() {
            return ToolResult::error("No path given");
        }
        let resolved = match validate_path(path, true) {
            Ok(p) => p,
            Err(reason) => return ToolResult::error(reason),
        };

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => ToolResult::success(content),
            Err(e) => ToolResult::error(format!("Failed to read '{path}': {e}")),
        }
    }
}
