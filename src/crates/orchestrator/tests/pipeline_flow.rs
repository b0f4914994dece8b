//! Engine-level scenarios: budget interruption and the resume protocol

use async_trait::async_trait;
use flow_core::templates::default_build_template;
use flow_core::{resolve, Intent, ResolutionContext, Scope};
use llm::{
    ChatProvider, ChunkStream, CompletionRequest, Result as LlmResult, StreamChunk, TokenCounts,
};
use orchestrator::artifacts::ArtifactStore;
use orchestrator::config::{CostLimits, ServerConfig};
use orchestrator::db::models::{PlannedAgents, RunStatus};
use orchestrator::db::repositories::{
    ChatRepository, ExecutionRepository, ProjectRepository, RunRepository, SettingsRepository,
};
use orchestrator::db::Database;
use orchestrator::events::{AgentStatus, EventBus, PipelineEvent};
use orchestrator::pipeline::PipelineEngine;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Scripted provider: fixed content and usage for every call
struct FakeProvider {
    content: String,
    usage: TokenCounts,
}

#[async_trait]
impl ChatProvider for FakeProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        "claude-sonnet"
    }

    async fn stream_chat(&self, _request: CompletionRequest) -> LlmResult<ChunkStream> {
        let content = self.content.clone();
        let usage = self.usage;
        let stream = async_stream::stream! {
            yield Ok(StreamChunk::TextDelta(content));
            yield Ok(StreamChunk::Usage(usage));
            yield Ok(StreamChunk::Done { stop_reason: Some("end_turn".to_string()) });
        };
        Ok(Box::pin(stream))
    }
}

struct Harness {
    db: Database,
    bus: EventBus,
    engine: Arc<PipelineEngine>,
    _workspace: tempfile::TempDir,
}

async fn harness(limits: CostLimits, provider: FakeProvider) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let bus = EventBus::new(4096);
    let workspace = tempfile::TempDir::new().unwrap();
    let store = ArtifactStore::new(workspace.path());

    let config = ServerConfig {
        workspace_dir: workspace.path().to_path_buf(),
        limits,
        ..Default::default()
    };

    let engine = PipelineEngine::new(
        db.clone(),
        bus.clone(),
        store,
        Arc::new(provider),
        config,
    );

    Harness {
        db,
        bus,
        engine,
        _workspace: workspace,
    }
}

async fn seed_chat(db: &Database) {
    ProjectRepository::create(db.pool(), "p1".into(), "Project".into(), "/tmp/p1".into())
        .await
        .unwrap();
    ChatRepository::create(db.pool(), "c1".into(), "p1".into(), "Chat".into())
        .await
        .unwrap();
}

async fn wait_for_terminal_run(db: &Database, chat_id: &str) -> String {
    for _ in 0..250 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let runs: Vec<orchestrator::db::models::PipelineRun> = sqlx::query_as(
            "SELECT * FROM pipeline_runs WHERE chat_id = ? ORDER BY started_at DESC",
        )
        .bind(chat_id)
        .fetch_all(db.pool())
        .await
        .unwrap();
        if let Some(run) = runs.first() {
            if run.status != "running" {
                return run.status.clone();
            }
        }
    }
    panic!("run for chat {} never reached a terminal status", chat_id);
}

#[tokio::test]
async fn cost_limit_interrupts_after_first_completion() {
    // Every call reports 2000 output tokens of claude-sonnet: $0.03, well
    // over the $0.01 per-chat limit
    let provider = FakeProvider {
        content: r#"{"intent":"build","scope":"full","needsBackend":false,"reasoning":"new"}"#
            .to_string(),
        usage: TokenCounts {
            input_tokens: 0,
            output_tokens: 2000,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
        },
    };
    let limits = CostLimits {
        chat_cost_usd: 0.01,
        project_cost_usd: 0.0,
    };
    let h = harness(limits, provider).await;
    seed_chat(&h.db).await;

    let mut rx = h.bus.subscribe();
    h.engine.start("c1", "Build a landing page").await.unwrap();

    let status = wait_for_terminal_run(&h.db, "c1").await;
    assert_eq!(status, "interrupted");

    // The interruption event names the reason
    let mut saw_interrupted = false;
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::PipelineInterrupted { chat_id, reason } = event {
            assert_eq!(chat_id, "c1");
            assert_eq!(reason, "cost_limit");
            saw_interrupted = true;
        }
    }
    assert!(saw_interrupted, "pipeline_interrupted was not emitted");

    // Dispatch halted almost immediately: far fewer executions than the
    // plan has steps
    let executions = ExecutionRepository::list_by_chat(h.db.pool(), "c1").await.unwrap();
    assert!(
        executions.len() <= 3,
        "dispatch kept going after the breach: {} executions",
        executions.len()
    );
}

fn build_context() -> ResolutionContext {
    ResolutionContext {
        intent: Intent::Build,
        scope: Scope::Full,
        needs_backend: false,
        has_files: false,
        user_message: "Build a landing page".to_string(),
    }
}

async fn seed_interrupted_run(db: &Database, completed: &[&str]) -> String {
    let context = build_context();
    let plan = resolve(&default_build_template(), &context);
    let planned = PlannedAgents {
        planned_order: plan.planned_order.clone(),
        context,
    };
    let run = RunRepository::create(
        db.pool(),
        "c1",
        "build",
        "full",
        "Build a landing page",
        &serde_json::to_string(&planned).unwrap(),
    )
    .await
    .unwrap();
    RunRepository::update_status(db.pool(), &run.id, RunStatus::Interrupted)
        .await
        .unwrap();

    for step_key in completed {
        let execution = ExecutionRepository::start(db.pool(), "c1", step_key, None)
            .await
            .unwrap();
        ExecutionRepository::complete(
            db.pool(),
            &execution.id,
            &serde_json::json!({ "content": format!("{} output", step_key) }).to_string(),
        )
        .await
        .unwrap();
    }

    run.id
}

#[tokio::test]
async fn resume_skips_completed_steps() {
    let provider = FakeProvider {
        content: "ISSUES: none".to_string(),
        usage: TokenCounts::default(),
    };
    let h = harness(CostLimits::default(), provider).await;
    seed_chat(&h.db).await;
    // YOLO keeps the design checkpoint from blocking the test
    SettingsRepository::set(h.db.pool(), "chat.yolo.c1", "true")
        .await
        .unwrap();

    let completed = ["research", "architect", "frontend-dev"];
    seed_interrupted_run(&h.db, &completed).await;

    let mut rx = h.bus.subscribe();
    h.engine.resume("c1").await.unwrap();

    // Collect the plan announcement and the pending re-announcements
    let mut pending: HashSet<String> = HashSet::new();
    let mut planned: Vec<String> = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(PipelineEvent::PipelinePlan { agents, .. })) => planned = agents,
            Ok(Ok(PipelineEvent::AgentStatus { agent, status, .. }))
                if status == AgentStatus::Pending =>
            {
                pending.insert(agent);
            }
            Ok(Ok(_)) => {}
            _ => {
                if !pending.is_empty() {
                    break;
                }
            }
        }
    }
    h.engine.stop("c1").await.unwrap();

    assert!(!planned.is_empty(), "pipeline_plan was not emitted");

    // Completed steps are not re-dispatched
    for done in completed {
        assert!(!pending.contains(done), "{} was re-announced", done);
    }
    // The remaining work includes the untouched steps
    for remaining in ["styling", "code-review", "security", "qa"] {
        assert!(pending.contains(remaining), "{} missing from remaining set", remaining);
    }
}

#[tokio::test]
async fn resume_with_everything_completed_finishes_immediately() {
    let provider = FakeProvider {
        content: "unused".to_string(),
        usage: TokenCounts::default(),
    };
    let h = harness(CostLimits::default(), provider).await;
    seed_chat(&h.db).await;

    // Mark every step of the resolved plan completed
    let plan = resolve(&default_build_template(), &build_context());
    let all_keys: Vec<String> = plan.steps.iter().map(|s| s.key().to_string()).collect();
    let all_refs: Vec<&str> = all_keys.iter().map(|s| s.as_str()).collect();
    seed_interrupted_run(&h.db, &all_refs).await;

    h.engine.resume("c1").await.unwrap();
    let status = wait_for_terminal_run(&h.db, "c1").await;
    assert_eq!(status, "completed");
}

#[tokio::test]
async fn resume_is_deterministic_over_identical_state() {
    // Resolving the same stored context twice yields the same remaining set
    let context = build_context();
    let template = default_build_template();
    let completed: HashSet<String> =
        ["research", "architect", "frontend-dev"].iter().map(|s| s.to_string()).collect();

    let remaining = |plan: &flow_core::resolver::ExecutionPlan| -> Vec<String> {
        plan.steps
            .iter()
            .map(|s| s.key().to_string())
            .filter(|k| !completed.contains(k))
            .collect()
    };

    let first = remaining(&resolve(&template, &context));
    let second = remaining(&resolve(&template, &context));
    assert_eq!(first, second);
    assert!(!first.contains(&"research".to_string()));
}
