//! Drop-in tool plugins.
//!
//! The plugin directory is flat; each plugin is an executable implementing a
//! two-verb protocol:
//!
//!   <plugin> --describe     → `{"name": "...", "description": "..."}` on stdout
//!   <plugin>                → argument text on stdin, result text on stdout
//!
//! A plugin that fails description is reported and skipped — startup never
//! aborts because one tool is broken.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use super::{Tool, ToolResult};

#[derive(Debug, Deserialize)]
struct Descriptor {
    name: String,
    #[serde(default)]
    description: String,
}

/// A tool backed by an external executable.
pub struct PluginTool {
    path: PathBuf,
    name: String,
    description: String,
    timeout_secs: u64,
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, args: &str) -> ToolResult {
        let mut child = match Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Tool error: {e}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(args.as_bytes()).await {
                return ToolResult::error(format!("Tool error: {e}"));
            }
            // Close stdin so the plugin sees EOF.
            drop(stdin);
        }

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolResult::error(format!("Tool error: {e}")),
            Err(_) => {
                return ToolResult::error(format!(
                    "Tool error: timed out after {}s",
                    self.timeout_secs
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            ToolResult::success(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            ToolResult::error(format!(
                "Tool error: exit code {} — {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ))
        }
    }
}

/// Scan `dir` for plugin executables and return the loadable ones.
pub fn scan_plugin_dir(dir: &str, timeout_secs: u64) -> Vec<PluginTool> {
    let dir_path = Path::new(dir);
    let entries = match std::fs::read_dir(dir_path) {
        Ok(e) => e,
        Err(_) => return Vec::new(), // no plugin dir is fine
    };

    let mut plugins = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_executable(&path) {
            continue;
        }
        match describe_plugin(&path) {
            Ok(descriptor) => {
                info!(plugin = %descriptor.name, path = %path.display(), "loaded tool plugin");
                plugins.push(PluginTool {
                    path,
                    name: descriptor.name,
                    description: descriptor.description,
                    timeout_secs,
                });
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping tool plugin");
            }
        }
    }
    plugins
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Run the `--describe` handshake synchronously (called once at startup).
fn describe_plugin(path: &Path) -> Result<Descriptor, String> {
    let output = std::process::Command::new(path)
        .arg("--describe")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| format!("spawn failed: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "--describe exited with code {}",
            output.status.code().unwrap_or(-1)
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let descriptor: Descriptor = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("bad descriptor JSON: {e}"))?;
    if descriptor.name.trim().is_empty() {
        return Err("descriptor has an empty name".to_string());
    }
    Ok(descriptor)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn write_plugin(dir: &Path, file: &str, script: &str) -> PathBuf {
        let path = dir.join(file);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(script.as_bytes()).unwrap();
        let mut perms = f.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_and_runs_a_well_formed_plugin() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(
            dir.path(),
            "upper",
            "#!/bin/sh\nif [ \"$1\" = \"--describe\" ]; then\n  echo '{\"name\":\"upper\",\"description\":\"Uppercase stdin\"}'\nelse\n  tr 'a-z' 'A-Z'\nfi\n",
        );

        let plugins = scan_plugin_dir(dir.path().to_str().unwrap(), 30);
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "upper");

        let result = plugins[0].run("hello").await;
        assert!(!result.is_error);
        assert_eq!(result.content.trim(), "HELLO");
    }

    #[test]
    fn broken_plugins_are_skipped_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(dir.path(), "bad-json", "#!/bin/sh\necho 'not json'\n");
        write_plugin(dir.path(), "crashes", "#!/bin/sh\nexit 1\n");
        write_plugin(
            dir.path(),
            "good",
            "#!/bin/sh\nif [ \"$1\" = \"--describe\" ]; then\n  echo '{\"name\":\"good\",\"description\":\"ok\"}'\nelse\n  cat\nfi\n",
        );

        let plugins = scan_plugin_dir(dir.path().to_str().unwrap(), 30);
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "good");
    }

    #[test]
    fn missing_plugin_dir_yields_nothing() {
        let plugins = scan_plugin_dir("/nonexistent/plugin/dir", 30);
        assert!(plugins.is_empty());
    }
}
