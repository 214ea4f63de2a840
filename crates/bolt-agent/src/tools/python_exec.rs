//! Tool: python_exec — run a Python snippet and capture its output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Tool, ToolResult};

pub struct PythonExecTool {
    timeout_secs: u64,
}

impl PythonExecTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &str {
        "python_exec"
    }

    fn description(&self) -> &str {
        "Run Python code with python3 and return stdout/stderr."
    }

    async fn run(&self, args: &str) -> ToolResult {
        let code = args.trim();
        if code.is_empty() {
            return ToolResult::error("No code given");
        }

        let child = Command::new("python3")
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output =
            match tokio::time::timeout(Duration::from_secs(self.timeout_secs), child).await {
                Ok(Ok(out)) => out,
                Ok(Err(e)) => return ToolResult::error(format!("Failed to run python3: {e}")),
                Err(_) => {
                    return ToolResult::error(format!(
                        "Execution timed out after {}s",
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
        if text.is_empty() {
            text = "(no output)".to_string();
        }

        ToolResult::success(text)
    }
}
