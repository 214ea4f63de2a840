// End-to-end pipeline runs against a scripted model host: canned JSON for
// each phase, real files on disk, and the residency discipline observable
// through the recorded host operations.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bolt_agent::pipeline::{BuildPipeline, PipelineCallback};
use bolt_agent::provider::{ModelHost, ProviderError};
use bolt_core::config::ModelRoster;
use bolt_core::{Mode, ModeState};
use bolt_memory::MemoryStore;

/// Scripted host: answers each phase prompt with canned output and records
/// every residency operation.
struct ScriptedHost {
    spec_json: String,
    plan_json: String,
    review_json: String,
    ops: Mutex<Vec<String>>,
}

impl ScriptedHost {
    fn new(spec_json: String, plan_json: String) -> Self {
        Self {
            spec_json,
            plan_json,
            review_json: r#"{"verdict": "pass", "issues": [], "summary": "looks coherent"}"#
                .to_string(),
            ops: Mutex::new(Vec::new()),
        }
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelHost for ScriptedHost {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _timeout_secs: u64,
    ) -> Result<String, ProviderError> {
        self.ops.lock().unwrap().push(format!("generate:{model}"));
        if prompt.contains("spec writer") {
            Ok(self.spec_json.clone())
        } else if prompt.contains("architect region") {
            Ok(self.plan_json.clone())
        } else if prompt.contains("reviewer region") {
            Ok(self.review_json.clone())
        } else if prompt.contains("code-writing region") {
            // Worker prompt — return code tagged with the file it was asked for.
            let path = prompt
                .lines()
                .find_map(|l| l.strip_prefix("File: "))
                .unwrap_or("unknown");
            Ok(format!("```python\n# {path}\nprint('built')\n```"))
        } else {
            Ok(String::new())
        }
    }

    async fn warm(&self, model: &str) {
        self.ops.lock().unwrap().push(format!("warm:{model}"));
    }

    async fn unload(&self, model: &str) {
        self.ops.lock().unwrap().push(format!("unload:{model}"));
    }

    async fn unload_all_except(&self, keep: &str) {
        self.ops
            .lock()
            .unwrap()
            .push(format!("unload_all_except:{keep}"));
    }

    async fn keep_alive(&self, model: &str) {
        self.ops.lock().unwrap().push(format!("keep_alive:{model}"));
    }
}

fn spec_json_for(output_dir: &str, files: &[&str]) -> String {
    serde_json::json!({
        "project": "demo",
        "description": "a tiny demo project",
        "requirements": ["do the thing"],
        "files": files,
        "language": "python",
        "output_dir": output_dir,
    })
    .to_string()
}

fn plan_json_for(heavy: &[&str], light: &[&str]) -> String {
    let task = |p: &&str| {
        serde_json::json!({"path": p, "description": format!("implement {p}"), "depends_on": []})
    };
    serde_json::json!({
        "architecture": "one module, one helper",
        "worker_heavy": {"files": heavy.iter().map(task).collect::<Vec<_>>()},
        "worker_light": {"files": light.iter().map(task).collect::<Vec<_>>()},
        "integration_notes": "import the helper from the module",
    })
    .to_string()
}

async fn wait_until_idle(pipeline: &BuildPipeline) {
    for _ in 0..100 {
        if !pipeline.is_running() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("pipeline never went idle");
}

// S6: five phases in order, files written under the resolved output dir,
// callback reports success, and a second run is refused while active.
#[tokio::test]
async fn pipeline_happy_path() {
    let home = bolt_core::config::home_dir();
    let out_dir = tempfile::tempdir_in(&home).expect("home must be writable for this test");
    let out_path = out_dir.path().join("demo");
    let out_str = out_path.display().to_string();

    let host = Arc::new(ScriptedHost::new(
        spec_json_for(&out_str, &["app.py", "util.py"]),
        plan_json_for(&["app.py"], &["util.py"]),
    ));
    let store = Arc::new(MemoryStore::open_in_memory().unwrap());
    let mode = Arc::new(ModeState::default());
    let pipeline = BuildPipeline::new(
        Arc::clone(&host) as Arc<dyn ModelHost>,
        Arc::clone(&store),
        ModelRoster::default(),
        Arc::clone(&mode),
    );

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let callback: PipelineCallback = Box::new(move |success, dir, summary| {
        let _ = done_tx.send((success, dir, summary));
    });

    assert!(pipeline.run("user: build me a demo\n".to_string(), Some(callback)));
    assert!(pipeline.is_running());
    assert_eq!(mode.get(), Mode::Build);

    // Exclusion: a second run is refused without scheduling anything.
    assert!(!pipeline.run("user: another\n".to_string(), None));

    let (success, dir, summary) = done_rx.await.unwrap();
    assert!(success, "pipeline failed: {summary}");
    let dir = dir.unwrap();
    assert!(dir.ends_with("demo"));

    // Both worker files landed on disk, fences stripped.
    let app = std::fs::read_to_string(dir.join("app.py")).unwrap();
    assert!(app.contains("print('built')"));
    assert!(!app.contains("```"));
    assert!(dir.join("util.py").exists());

    wait_until_idle(&pipeline).await;
    assert_eq!(mode.get(), Mode::Companion);

    // Phase order: spec on the small coder, architect + review on the big
    // model, the two workers in between (their relative order is free).
    let generates: Vec<String> = host
        .ops()
        .into_iter()
        .filter(|op| op.starts_with("generate:"))
        .collect();
    let roster = ModelRoster::default();
    assert_eq!(generates.len(), 5);
    assert_eq!(generates[0], format!("generate:{}", roster.fast_code));
    assert_eq!(generates[1], format!("generate:{}", roster.beast));
    assert_eq!(generates[4], format!("generate:{}", roster.beast));
    let workers = &generates[2..4];
    assert!(workers.contains(&format!("generate:{}", roster.worker_heavy)));
    assert!(workers.contains(&format!("generate:{}", roster.worker_light)));

    // Residency discipline: both workers warmed, the router never unloaded
    // alone, and the companion warmed back at the end.
    let ops = host.ops();
    assert!(ops.contains(&format!("warm:{}", roster.worker_heavy)));
    assert!(ops.contains(&format!("warm:{}", roster.worker_light)));
    assert!(ops.iter().any(|op| op == &format!("unload_all_except:{}", roster.router)));
    assert_eq!(ops.last().unwrap(), &format!("warm:{}", roster.companion));
    assert!(!ops.contains(&format!("unload:{}", roster.router)));

    // Timeline recorded the run.
    let events = store.get_timeline(50).unwrap();
    assert!(events.iter().any(|e| e.event == "pipeline_start"));
    assert!(events.iter().any(|e| e.event == "pipeline_complete"));
}

// S7: a traversal path in the plan is skipped with a logged denial while
// the rest of the build succeeds.
#[tokio::test]
async fn pipeline_skips_path_traversal_files() {
    let home = bolt_core::config::home_dir();
    let out_dir = tempfile::tempdir_in(&home).expect("home must be writable for this test");
    let out_path = out_dir.path().join("demo");
    let out_str = out_path.display().to_string();

    let host = Arc::new(ScriptedHost::new(
        spec_json_for(&out_str, &["app.py"]),
        plan_json_for(&["app.py"], &["../../etc/evil"]),
    ));
    let store = Arc::new(MemoryStore::open_in_memory().unwrap());
    let pipeline = BuildPipeline::new(
        Arc::clone(&host) as Arc<dyn ModelHost>,
        Arc::clone(&store),
        ModelRoster::default(),
        Arc::new(ModeState::default()),
    );

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let callback: PipelineCallback = Box::new(move |success, dir, summary| {
        let _ = done_tx.send((success, dir, summary));
    });
    assert!(pipeline.run("user: build\n".to_string(), Some(callback)));

    let (success, dir, summary) = done_rx.await.unwrap();
    assert!(success, "pipeline failed: {summary}");
    let dir = dir.unwrap();

    assert!(dir.join("app.py").exists());
    assert!(!dir.join("../../etc/evil").exists());
    assert!(summary.starts_with("Built 1 files"));

    let events = store.get_timeline(50).unwrap();
    let denial = events
        .iter()
        .find(|e| e.event == "pipeline_write_denied")
        .expect("expected a logged denial");
    assert_eq!(denial.details.as_deref(), Some("../../etc/evil"));

    wait_until_idle(&pipeline).await;
}

// An unparseable spec short-circuits with a readable reason and restores
// the previous mode.
#[tokio::test]
async fn pipeline_short_circuits_on_bad_spec() {
    let host = Arc::new(ScriptedHost::new(
        "this is not json at all".to_string(),
        plan_json_for(&[], &[]),
    ));
    let store = Arc::new(MemoryStore::open_in_memory().unwrap());
    let mode = Arc::new(ModeState::new(Mode::Code));
    let pipeline = BuildPipeline::new(
        Arc::clone(&host) as Arc<dyn ModelHost>,
        Arc::clone(&store),
        ModelRoster::default(),
        Arc::clone(&mode),
    );

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let callback: PipelineCallback = Box::new(move |success, dir, summary| {
        let _ = done_tx.send((success, dir, summary));
    });
    assert!(pipeline.run("user: build\n".to_string(), Some(callback)));

    let (success, dir, summary) = done_rx.await.unwrap();
    assert!(!success);
    assert!(dir.is_none());
    assert_eq!(summary, "Failed to generate build spec.");

    wait_until_idle(&pipeline).await;
    assert_eq!(mode.get(), Mode::Code);

    let events = store.get_timeline(50).unwrap();
    assert!(events.iter().any(|e| e.event == "pipeline_failed"));
}
