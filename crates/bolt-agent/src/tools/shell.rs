//! Tool: shell — one-shot shell command, safety-checked and time-bounded.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::sandbox::check_command;
use super::{Tool, ToolResult};

pub struct ShellTool {
    timeout_secs: u64,
}

impl ShellTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its output. Dangerous commands \
         (elevation, destructive disk operations, pipe-to-shell) are blocked."
    }

    async fn run(&self, args: &str) -> ToolResult {
        let command = args.trim();
        if command.is_empty() {
            return ToolResult::error("No command given");
        }
        if let Err(reason) = check_command(command) {
            return ToolResult::error(reason);
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output =
            match tokio::time::timeout(Duration::from_secs(self.timeout_secs), child).await {
                Ok(Ok(out)) => out,
                Ok(Err(e)) => return ToolResult::error(format!("Failed to run command: {e}")),
                Err(_) => {
                    return ToolResult::error(format!(
                        "Command timed out after {}s",
                        self.timeout_secs
                    ))
                }
            };

        let mut text = String::new();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.is_empty() {
            text.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(&stderr);
        }
        if !output.status.success() {
            text.push_str(&format!(
                "\n[exit code: {}]",
                output.status.code().unwrap_or(-1)
            ));
        }
        if text.is_empty() {
            text = "(no output)".to_string();
        }

        ToolResult::success(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let tool = ShellTool::new(30);
        let result = tool.run("echo hello").await;
        assert!(!result.is_error);
        assert!(result.content.contains("hello"));
    }

    #[tokio::test]
    async fn blocked_command_is_refused() {
        let tool = ShellTool::new(30);
        let result = tool.run("sudo rm file").await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Blocked"));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported() {
        let tool = ShellTool::new(30);
        let result = tool.run("exit 3").await;
        assert!(!result.is_error);
        assert!(result.content.contains("[exit code: 3]"));
    }
}
