//! Tool: list_files — list a directory under home. Directories get a
//! trailing slash.

use async_trait::async_trait;

use super::sandbox::validate_path;
use super::{Tool, ToolResult};

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory under the home directory. \
         Defaults to the home directory itself."
    }

    async fn run(&self, args: &str) -> ToolResult {
        let path = args.trim();
        let path = if path.is_empty() { "~" } else { path };
        let resolved = match validate_path(path, true) {
            Ok(p) => p,
            Err(reason) => return ToolResult::error(reason),
        };

        let mut entries = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(format!("Failed to list '{path}': {e}")),
        };

        let mut names: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            names.push(if is_dir { format!("{name}/") } else { name });
        }
        names.sort();

        if names.is_empty() {
            ToolResult::success("(empty directory)")
        } else {
            ToolResult::success(names.join("\n"))
        }
    }
}
