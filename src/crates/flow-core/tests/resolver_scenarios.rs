//! End-to-end resolver scenarios over the stock templates

use flow_core::model::{ActionKind, Intent, Scope};
use flow_core::resolver::{resolve, PlanStep, ResolutionContext};
use flow_core::templates::{default_build_template, default_fix_template};
use std::collections::HashSet;

fn ctx(intent: Intent, scope: Scope, needs_backend: bool, has_files: bool) -> ResolutionContext {
    ResolutionContext {
        intent,
        scope,
        needs_backend,
        has_files,
        user_message: "Build a landing page".to_string(),
    }
}

fn agent_names(plan: &flow_core::resolver::ExecutionPlan) -> Vec<String> {
    plan.steps
        .iter()
        .filter_map(|s| match s {
            PlanStep::Agent(a) => Some(a.agent_name.clone()),
            PlanStep::Action(_) => None,
        })
        .collect()
}

#[test]
fn build_full_scope_without_backend() {
    let template = default_build_template();
    let plan = resolve(&template, &ctx(Intent::Build, Scope::Full, false, false));

    assert_eq!(
        plan.planned_order,
        vec![
            "vibe-intake",
            "mood-analysis",
            "research",
            "architect",
            "design-checkpoint",
            "cond-backend",
            "frontend-dev",
            "version-post-dev",
            "styling",
            "build-check",
            "test-run",
            "version-post-test",
            "code-review",
            "security",
            "qa",
            "remediation",
            "version-build",
            "summary",
        ]
    );

    assert!(!agent_names(&plan).contains(&"backend-dev".to_string()));

    let summary = plan.step("summary").expect("summary step emitted");
    assert!(summary
        .depends_on()
        .contains(&"version-build".to_string()));
}

#[test]
fn build_with_backend_keeps_both_dev_agents() {
    let template = default_build_template();
    let plan = resolve(&template, &ctx(Intent::Build, Scope::Full, true, false));

    let names = agent_names(&plan);
    assert!(names.contains(&"backend-dev".to_string()));
    assert!(names.contains(&"frontend-dev".to_string()));

    // frontend-dev rejoins after the backend leg and depends on it
    let frontend = plan.step("frontend-dev").unwrap();
    assert!(frontend.depends_on().contains(&"backend-dev".to_string()));
}

#[test]
fn fix_backend_scope() {
    let template = default_fix_template();
    let plan = resolve(&template, &ctx(Intent::Fix, Scope::Backend, true, true));

    let names = agent_names(&plan);
    assert!(names.contains(&"backend-dev".to_string()));
    assert!(!names.contains(&"frontend-dev".to_string()));

    // Dependencies are node ids, not agent names
    let build_check = plan.step("build-check-fix").expect("build-check-fix emitted");
    assert!(build_check.depends_on().contains(&"backend-fix".to_string()));
    assert!(!build_check.depends_on().contains(&"backend-dev".to_string()));
}

#[test]
fn fix_styling_scope_takes_quick_lane() {
    let template = default_fix_template();
    let plan = resolve(&template, &ctx(Intent::Fix, Scope::Styling, false, true));

    let names = agent_names(&plan);
    assert_eq!(names, vec!["styling".to_string()]);

    let keys: Vec<&str> = plan.steps.iter().map(|s| s.key()).collect();
    assert_eq!(keys, vec!["styling-quick", "version-quick", "summary-fix"]);

    // No reviewers, no remediation
    assert!(plan.step("review-fix").is_none());
    assert!(plan.step("remediation-fix").is_none());

    let summary = plan.step("summary-fix").unwrap();
    assert_eq!(summary.depends_on(), &["version-quick".to_string()]);
}

#[test]
fn fix_full_scope_runs_both_fix_agents() {
    let template = default_fix_template();
    let plan = resolve(&template, &ctx(Intent::Fix, Scope::Full, true, true));

    let keys: HashSet<&str> = plan.steps.iter().map(|s| s.key()).collect();
    assert!(keys.contains("backend-fix"));
    assert!(keys.contains("frontend-fix"));
    assert!(keys.contains("remediation-fix"));

    let frontend = plan.step("frontend-fix").unwrap();
    assert!(frontend.depends_on().contains(&"backend-fix".to_string()));
}

#[test]
fn plan_keys_unique_and_dependencies_closed() {
    for (template, context) in [
        (
            default_build_template(),
            ctx(Intent::Build, Scope::Full, true, false),
        ),
        (
            default_build_template(),
            ctx(Intent::Build, Scope::Frontend, false, false),
        ),
        (
            default_fix_template(),
            ctx(Intent::Fix, Scope::Backend, true, true),
        ),
        (
            default_fix_template(),
            ctx(Intent::Fix, Scope::Styling, false, true),
        ),
    ] {
        let plan = resolve(&template, &context);
        let mut keys = HashSet::new();
        for step in &plan.steps {
            assert!(keys.insert(step.key().to_string()), "duplicate key {}", step.key());
        }
        for step in &plan.steps {
            for dep in step.depends_on() {
                assert!(
                    keys.contains(dep),
                    "step {} depends on unemitted key {}",
                    step.key(),
                    dep
                );
            }
        }
    }
}

#[test]
fn agent_steps_depend_on_every_active_upstream_step() {
    let template = default_build_template();
    let plan = resolve(&template, &ctx(Intent::Build, Scope::Full, false, false));

    // code-review, security, and qa all hang off the post-test snapshot
    for reviewer in ["code-review", "security", "qa"] {
        let step = plan.step(reviewer).unwrap();
        assert_eq!(step.depends_on(), &["version-post-test".to_string()]);
    }

    // remediation waits for the whole reviewer panel
    let remediation = plan.step("remediation").unwrap();
    let deps: HashSet<&str> = remediation.depends_on().iter().map(|s| s.as_str()).collect();
    assert_eq!(
        deps,
        HashSet::from(["code-review", "security", "qa"])
    );
}

#[test]
fn removing_a_node_removes_exactly_its_step() {
    let mut template = default_build_template();
    let before = resolve(&template, &ctx(Intent::Build, Scope::Full, false, false));
    assert!(before.step("test-run").is_some());

    template.nodes.retain(|n| n.id() != "test-run");
    template.edges.retain(|e| e.source != "test-run" && e.target != "test-run");
    // Re-bridge the gap the removal left
    template.edges.push(flow_core::FlowEdge::new(
        "build-check",
        "version-post-test",
    ));

    let after = resolve(&template, &ctx(Intent::Build, Scope::Full, false, false));
    assert!(after.step("test-run").is_none());
    assert_eq!(before.steps.len(), after.steps.len() + 1);

    let before_keys: HashSet<String> =
        before.steps.iter().map(|s| s.key().to_string()).collect();
    let after_keys: HashSet<String> = after.steps.iter().map(|s| s.key().to_string()).collect();
    let missing: Vec<_> = before_keys.difference(&after_keys).collect();
    assert_eq!(missing, vec![&"test-run".to_string()]);
}

#[test]
fn checkpoint_emits_gate_step_with_payload() {
    let template = default_build_template();
    let plan = resolve(&template, &ctx(Intent::Build, Scope::Full, false, false));

    match plan.step("design-checkpoint").unwrap() {
        PlanStep::Action(step) => {
            assert_eq!(step.kind, ActionKind::Checkpoint);
            let spec = step.checkpoint.as_ref().expect("checkpoint payload");
            assert!(spec.skip_in_yolo);
            assert_eq!(spec.options.len(), 3);
        }
        PlanStep::Agent(_) => panic!("checkpoint resolved as agent step"),
    }
}
