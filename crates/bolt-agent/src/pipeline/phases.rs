//! The five pipeline phases: spec → architect → build → review → write.
//!
//! Each model-facing phase loads what it needs, generates, and unloads
//! before handing over — the router model stays resident throughout so chat
//! keeps answering while a build runs.

use std::collections::HashMap;
use std::path::PathBuf;

use bolt_core::config::home_dir;
use bolt_core::ModelRoster;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::prompts;
use crate::provider::ModelHost;

use super::json::{extract_json, strip_code_fences};

/// Phase 1 artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Phase 2 artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub worker_heavy: WorkerPlan,
    #[serde(default)]
    pub worker_light: WorkerPlan,
    #[serde(default)]
    pub integration_notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerPlan {
    #[serde(default)]
    pub files: Vec<FileTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTask {
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Phase 4 artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(default = "default_verdict")]
    pub verdict: String,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewIssue {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub fix: String,
}

fn default_verdict() -> String {
    "pass".to_string()
}

/// Per-file content cap fed to the reviewer.
const REVIEW_FILE_CHARS: usize = 2000;
/// Overall built-files cap fed to the reviewer.
const REVIEW_TOTAL_CHARS: usize = 6000;

/// Phase 1: the small coder distills the conversation into a build spec.
pub async fn stage_spec(
    host: &dyn ModelHost,
    roster: &ModelRoster,
    conversation: &str,
) -> Option<BuildSpec> {
    info!("pipeline phase 1/5: building spec");
    host.unload_all_except(&roster.router).await;

    let prompt = prompts::spec_prompt(conversation);
    let raw = host
        .generate(&roster.fast_code, &prompt, 120)
        .await
        .unwrap_or_default();

    // Free the small coder — only the router stays.
    host.unload(&roster.fast_code).await;

    let spec: BuildSpec = serde_json::from_value(extract_json(&raw)?).ok()?;
    info!(
        project = %spec.project,
        files = spec.files.len(),
        "spec ready"
    );
    Some(spec)
}

/// Phase 2: the big model plans the architecture and splits the work.
pub async fn stage_architect(
    host: &dyn ModelHost,
    roster: &ModelRoster,
    spec: &BuildSpec,
    user_context: &str,
) -> Option<BuildPlan> {
    info!("pipeline phase 2/5: architect planning");
    host.unload_all_except(&roster.router).await;

    let spec_json = serde_json::to_string_pretty(spec).unwrap_or_default();
    let prompt = prompts::architect_prompt(&spec_json, user_context);
    let raw = host
        .generate(&roster.beast, &prompt, 600)
        .await
        .unwrap_or_default();

    // Free the beast immediately.
    host.unload(&roster.beast).await;

    let plan: BuildPlan = serde_json::from_value(extract_json(&raw)?).ok()?;
    info!(
        heavy = plan.worker_heavy.files.len(),
        light = plan.worker_light.files.len(),
        "architecture planned"
    );
    Some(plan)
}

/// Phase 3: two workers build their file lists in parallel.
pub async fn stage_build(
    host: &dyn ModelHost,
    roster: &ModelRoster,
    spec: &BuildSpec,
    plan: &BuildPlan,
    user_context: &str,
) -> HashMap<String, String> {
    info!("pipeline phase 3/5: building (parallel workers)");
    host.unload_all_except(&roster.router).await;

    // Warm both workers together before the file loops start.
    tokio::join!(host.warm(&roster.worker_heavy), host.warm(&roster.worker_light));

    let (heavy_results, light_results) = tokio::join!(
        run_worker(
            host,
            &roster.worker_heavy,
            "heavy",
            &plan.worker_heavy.files,
            spec,
            user_context,
        ),
        run_worker(
            host,
            &roster.worker_light,
            "light",
            &plan.worker_light.files,
            spec,
            user_context,
        ),
    );

    // Free both workers.
    host.unload(&roster.worker_heavy).await;
    host.unload(&roster.worker_light).await;

    let mut results = heavy_results;
    results.extend(light_results);
    info!(files = results.len(), "build complete");
    results
}

/// One worker: iterate its file list sequentially, accumulating path → code.
async fn run_worker(
    host: &dyn ModelHost,
    model: &str,
    label: &str,
    tasks: &[FileTask],
    spec: &BuildSpec,
    user_context: &str,
) -> HashMap<String, String> {
    let mut results = HashMap::new();
    let context = format!(
        "Project: {}\nDescription: {}\nLanguage: {}",
        spec.project, spec.description, spec.language
    );

    for task in tasks {
        let deps = if task.depends_on.is_empty() {
            "none".to_string()
        } else {
            task.depends_on.join(", ")
        };
        let prompt = prompts::worker_prompt(
            &context,
            &task.path,
            &task.description,
            &deps,
            user_context,
        );
        match host.generate(model, &prompt, 300).await {
            Ok(code) => {
                results.insert(task.path.clone(), strip_code_fences(&code));
                info!(worker = label, file = %task.path, "built file");
            }
            Err(e) => {
                warn!(worker = label, file = %task.path, err = %e, "worker generation failed");
            }
        }
    }
    results
}

/// Phase 4: the big model reviews the combined output. A parse failure is
/// non-fatal and reads as a pass.
pub async fn stage_review(
    host: &dyn ModelHost,
    roster: &ModelRoster,
    plan: &BuildPlan,
    built_files: &HashMap<String, String>,
) -> Review {
    info!("pipeline phase 4/5: review & validate");
    host.unload_all_except(&roster.router).await;

    let mut files_text = String::new();
    for (path, code) in built_files {
        files_text.push_str(&format!(
            "\n--- {path} ---\n{}\n",
            prompts::clip(code, REVIEW_FILE_CHARS)
        ));
        if files_text.len() >= REVIEW_TOTAL_CHARS {
            break;
        }
    }

    let plan_json = serde_json::to_string_pretty(plan).unwrap_or_default();
    let prompt = prompts::review_prompt(&plan_json, &files_text);
    let raw = host
        .generate(&roster.beast, &prompt, 600)
        .await
        .unwrap_or_default();

    host.unload(&roster.beast).await;

    match extract_json(&raw).and_then(|v| serde_json::from_value::<Review>(v).ok()) {
        Some(review) => {
            if review.verdict == "pass" {
                info!(summary = %review.summary, "review passed");
            } else {
                warn!(issues = review.issues.len(), "review found issues");
            }
            review
        }
        None => {
            warn!("review parse failed, assuming pass");
            Review {
                verdict: "pass".to_string(),
                issues: Vec::new(),
                summary: "Could not parse review — assuming OK.".to_string(),
            }
        }
    }
}

/// Outcome of the write phase.
pub struct WriteOutcome {
    pub written: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Files skipped because their resolved path escaped the output dir.
    pub denied: Vec<String>,
}

/// Phase 5: resolve the output directory under `$HOME` and write every file,
/// rejecting path traversal per file.
pub fn stage_write(spec: &BuildSpec, built_files: &HashMap<String, String>) -> Option<WriteOutcome> {
    info!("pipeline phase 5/5: writing to disk");
    let home = PathBuf::from(home_dir());
    let home = home.canonicalize().unwrap_or(home);

    let requested = spec
        .output_dir
        .clone()
        .unwrap_or_else(|| home.join("projects").join("output").display().to_string());
    let output_dir = crate::tools::sandbox::resolve_path(&requested, &home);

    if output_dir != home && !output_dir.starts_with(&home) {
        warn!(dir = %output_dir.display(), "refusing to write outside home directory");
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        warn!(dir = %output_dir.display(), err = %e, "could not create output directory");
        return None;
    }
    let output_dir = output_dir.canonicalize().unwrap_or(output_dir);

    let mut written = Vec::new();
    let mut denied = Vec::new();
    for (rel_path, code) in built_files {
        let full = crate::tools::sandbox::resolve_path(
            &output_dir.join(rel_path).display().to_string(),
            &home,
        );
        if !full.starts_with(&output_dir) {
            warn!(file = %rel_path, "skipping path traversal attempt");
            denied.push(rel_path.clone());
            continue;
        }
        if let Some(parent) = full.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(file = %rel_path, err = %e, "could not create parent directory");
                continue;
            }
        }
        match std::fs::write(&full, code) {
            Ok(()) => {
                info!(file = %full.display(), "wrote file");
                written.push(full);
            }
            Err(e) => warn!(file = %rel_path, err = %e, "write failed"),
        }
    }

    info!(count = written.len(), dir = %output_dir.display(), "write phase complete");
    Some(WriteOutcome {
        written,
        output_dir,
        denied,
    })
}

/// After the write phase: drop any stragglers and bring the companion model
/// back so chat feels instant again.
pub async fn restore_chat_models(host: &dyn ModelHost, roster: &ModelRoster) {
    host.unload_all_except(&roster.router).await;
    host.warm(&roster.companion).await;
}
