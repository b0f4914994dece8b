//! Stock pipeline templates
//!
//! Factory for the default Build/Fix/Question DAGs. Templates produced here
//! carry [`FLOW_DEFAULTS_VERSION`]; stored defaults with an older version are
//! regenerated on read, preserving their id and name so user references stay
//! intact.

use crate::model::{
    ActionKind, ActionSettings, CheckpointType, ConditionMode, FlowEdge, FlowNode, FlowTemplate,
    Intent, SourceTransform, UpstreamSource,
};

/// Bumped whenever a default DAG shape changes
pub const FLOW_DEFAULTS_VERSION: u32 = 3;

/// Agent names the stock templates reference
pub const DEFAULT_AGENT_NAMES: &[&str] = &[
    "research",
    "architect",
    "frontend-dev",
    "backend-dev",
    "styling",
    "code-review",
    "security",
    "qa",
];

fn agent(id: &str, agent_name: &str, input_template: &str) -> FlowNode {
    FlowNode::Agent {
        id: id.to_string(),
        agent_name: agent_name.to_string(),
        input_template: input_template.to_string(),
        max_output_tokens: None,
        max_tool_steps: None,
        system_prompt: None,
        tool_overrides: None,
        upstream_sources: vec![],
    }
}

fn agent_with_sources(
    id: &str,
    agent_name: &str,
    input_template: &str,
    sources: Vec<UpstreamSource>,
) -> FlowNode {
    FlowNode::Agent {
        id: id.to_string(),
        agent_name: agent_name.to_string(),
        input_template: input_template.to_string(),
        max_output_tokens: None,
        max_tool_steps: None,
        system_prompt: None,
        tool_overrides: None,
        upstream_sources: sources,
    }
}

fn action(id: &str, kind: ActionKind) -> FlowNode {
    FlowNode::Action {
        id: id.to_string(),
        action_kind: kind,
        settings: ActionSettings::default(),
    }
}

fn version(id: &str, label: &str) -> FlowNode {
    FlowNode::Version {
        id: id.to_string(),
        label: Some(label.to_string()),
    }
}

fn predefined(id: &str, condition: &str) -> FlowNode {
    FlowNode::Condition {
        id: id.to_string(),
        mode: ConditionMode::Predefined {
            id: condition.to_string(),
        },
    }
}

fn expression(id: &str, expr: &str) -> FlowNode {
    FlowNode::Condition {
        id: id.to_string(),
        mode: ConditionMode::Expression {
            expression: expr.to_string(),
        },
    }
}

/// The stock Build pipeline: intake, research/architecture, development with
/// an optional backend leg, styling, build/test verification, a reviewer
/// panel with remediation, and a final snapshot plus summary.
pub fn default_build_template() -> FlowTemplate {
    let nodes = vec![
        FlowNode::Config {
            id: "base-config".to_string(),
            base_system_prompt: Some(
                "You are part of a multi-agent team generating a complete web project. \
                 Write production-quality code and keep outputs focused on your role."
                    .to_string(),
            ),
        },
        action("vibe-intake", ActionKind::VibeIntake),
        action("mood-analysis", ActionKind::MoodAnalysis),
        agent(
            "research",
            "research",
            "Research the domain, audience, and content needs for this request:\n{{userMessage}}",
        ),
        agent_with_sources(
            "architect",
            "architect",
            "Design the page architecture and a design system for:\n{{userMessage}}",
            vec![
                UpstreamSource::raw("research"),
                UpstreamSource::raw("vibe-brief"),
                UpstreamSource::raw("mood-analysis"),
            ],
        ),
        FlowNode::Checkpoint {
            id: "design-checkpoint".to_string(),
            label: Some("Design direction".to_string()),
            checkpoint_type: CheckpointType::DesignDirection,
            message: Some("Pick a design direction before development starts.".to_string()),
            skip_in_yolo: true,
            timeout_ms: Some(120_000),
            options: vec![
                "bold".to_string(),
                "minimal".to_string(),
                "playful".to_string(),
            ],
        },
        predefined("cond-backend", "needsBackend"),
        agent_with_sources(
            "backend-dev",
            "backend-dev",
            "Implement the backend endpoints and data handling for:\n{{userMessage}}",
            vec![UpstreamSource::raw("architect")],
        ),
        agent_with_sources(
            "frontend-dev",
            "frontend-dev",
            "Implement the frontend for:\n{{userMessage}}",
            vec![
                UpstreamSource::with_transform("architect", SourceTransform::DesignSystem),
                UpstreamSource::raw("vibe-brief"),
                UpstreamSource::raw("mood-analysis"),
            ],
        ),
        version("version-post-dev", "post-dev"),
        agent_with_sources(
            "styling",
            "styling",
            "Polish the styling and visual hierarchy for:\n{{userMessage}}",
            vec![
                UpstreamSource::with_transform("frontend-dev", SourceTransform::FileManifest),
                UpstreamSource::raw("mood-analysis"),
            ],
        ),
        action("build-check", ActionKind::BuildCheck),
        action("test-run", ActionKind::TestRun),
        version("version-post-test", "post-test"),
        agent_with_sources(
            "code-review",
            "code-review",
            "Review the generated project for correctness and maintainability.",
            vec![UpstreamSource::with_transform(
                "project-source",
                SourceTransform::ProjectSource,
            )],
        ),
        agent_with_sources(
            "security",
            "security",
            "Review the generated project for security issues.",
            vec![UpstreamSource::with_transform(
                "project-source",
                SourceTransform::ProjectSource,
            )],
        ),
        agent_with_sources(
            "qa",
            "qa",
            "Check the generated project against the original request:\n{{userMessage}}",
            vec![UpstreamSource::with_transform(
                "project-source",
                SourceTransform::ProjectSource,
            )],
        ),
        FlowNode::Action {
            id: "remediation".to_string(),
            action_kind: ActionKind::Remediation,
            settings: ActionSettings {
                remediation_reviewer_keys: vec![
                    "code-review".to_string(),
                    "security".to_string(),
                    "qa".to_string(),
                ],
                ..Default::default()
            },
        },
        version("version-build", "build"),
        action("summary", ActionKind::Summary),
    ];

    let edges = vec![
        FlowEdge::new("base-config", "vibe-intake"),
        FlowEdge::new("vibe-intake", "mood-analysis"),
        FlowEdge::new("mood-analysis", "research"),
        FlowEdge::new("research", "architect"),
        FlowEdge::new("architect", "design-checkpoint"),
        FlowEdge::new("design-checkpoint", "cond-backend"),
        FlowEdge::branch("cond-backend", "backend-dev", "true"),
        FlowEdge::branch("cond-backend", "frontend-dev", "false"),
        FlowEdge::new("backend-dev", "frontend-dev"),
        FlowEdge::new("frontend-dev", "version-post-dev"),
        FlowEdge::new("version-post-dev", "styling"),
        FlowEdge::new("styling", "build-check"),
        FlowEdge::new("build-check", "test-run"),
        FlowEdge::new("test-run", "version-post-test"),
        FlowEdge::new("version-post-test", "code-review"),
        FlowEdge::new("version-post-test", "security"),
        FlowEdge::new("version-post-test", "qa"),
        FlowEdge::new("code-review", "remediation"),
        FlowEdge::new("security", "remediation"),
        FlowEdge::new("qa", "remediation"),
        FlowEdge::new("remediation", "version-build"),
        FlowEdge::new("version-build", "summary"),
    ];

    FlowTemplate {
        id: "default-build".to_string(),
        name: "Build".to_string(),
        intent: Intent::Build,
        enabled: true,
        is_default: true,
        version: FLOW_DEFAULTS_VERSION,
        nodes,
        edges,
    }
}

/// The stock Fix pipeline: a fast styling-only lane, otherwise scoped fix
/// agents followed by build/test verification, one reviewer, and
/// remediation.
pub fn default_fix_template() -> FlowTemplate {
    let nodes = vec![
        expression("cond-styling-only", "scope === 'styling'"),
        agent(
            "styling-quick",
            "styling",
            "Apply this styling fix directly, keeping changes minimal:\n{{userMessage}}",
        ),
        version("version-quick", "quick-fix"),
        predefined("cond-backend-scope", "scopeIncludes:backend"),
        agent_with_sources(
            "backend-fix",
            "backend-dev",
            "Fix the backend issue described below:\n{{userMessage}}",
            vec![UpstreamSource::with_transform(
                "project-source",
                SourceTransform::ProjectSource,
            )],
        ),
        predefined("cond-frontend-scope", "scopeIncludes:frontend"),
        agent_with_sources(
            "frontend-fix",
            "frontend-dev",
            "Fix the frontend issue described below:\n{{userMessage}}",
            vec![UpstreamSource::with_transform(
                "project-source",
                SourceTransform::ProjectSource,
            )],
        ),
        action("build-check-fix", ActionKind::BuildCheck),
        action("test-run-fix", ActionKind::TestRun),
        agent_with_sources(
            "review-fix",
            "code-review",
            "Review the fix for correctness and regressions.",
            vec![UpstreamSource::with_transform(
                "project-source",
                SourceTransform::ProjectSource,
            )],
        ),
        FlowNode::Action {
            id: "remediation-fix".to_string(),
            action_kind: ActionKind::Remediation,
            settings: ActionSettings {
                remediation_reviewer_keys: vec!["review-fix".to_string()],
                ..Default::default()
            },
        },
        version("version-fix", "fix"),
        action("summary-fix", ActionKind::Summary),
    ];

    let edges = vec![
        FlowEdge::branch("cond-styling-only", "styling-quick", "true"),
        FlowEdge::branch("cond-styling-only", "cond-backend-scope", "false"),
        FlowEdge::new("styling-quick", "version-quick"),
        FlowEdge::new("version-quick", "summary-fix"),
        FlowEdge::branch("cond-backend-scope", "backend-fix", "true"),
        FlowEdge::branch("cond-backend-scope", "cond-frontend-scope", "false"),
        FlowEdge::new("backend-fix", "cond-frontend-scope"),
        FlowEdge::branch("cond-frontend-scope", "frontend-fix", "true"),
        FlowEdge::branch("cond-frontend-scope", "build-check-fix", "false"),
        FlowEdge::new("frontend-fix", "build-check-fix"),
        FlowEdge::new("build-check-fix", "test-run-fix"),
        FlowEdge::new("test-run-fix", "review-fix"),
        FlowEdge::new("review-fix", "remediation-fix"),
        FlowEdge::new("remediation-fix", "version-fix"),
        FlowEdge::new("version-fix", "summary-fix"),
    ];

    FlowTemplate {
        id: "default-fix".to_string(),
        name: "Fix".to_string(),
        intent: Intent::Fix,
        enabled: true,
        is_default: true,
        version: FLOW_DEFAULTS_VERSION,
        nodes,
        edges,
    }
}

/// The stock Question pipeline: a single answer action, no artifacts touched
pub fn default_question_template() -> FlowTemplate {
    let nodes = vec![action("answer", ActionKind::Answer)];
    let edges = vec![];

    FlowTemplate {
        id: "default-question".to_string(),
        name: "Question".to_string(),
        intent: Intent::Question,
        enabled: true,
        is_default: true,
        version: FLOW_DEFAULTS_VERSION,
        nodes,
        edges,
    }
}

/// All stock templates at the current defaults version
pub fn default_templates() -> Vec<FlowTemplate> {
    vec![
        default_build_template(),
        default_fix_template(),
        default_question_template(),
    ]
}

/// The stock template for a given intent
pub fn default_template_for(intent: Intent) -> FlowTemplate {
    match intent {
        Intent::Build => default_build_template(),
        Intent::Fix => default_fix_template(),
        Intent::Question => default_question_template(),
    }
}

/// Whether a stored default template is outdated
pub fn needs_upgrade(template: &FlowTemplate) -> bool {
    template.is_default && template.version < FLOW_DEFAULTS_VERSION
}

/// Regenerate an outdated default, preserving its id and name
///
/// Non-default templates and up-to-date defaults are returned unchanged.
pub fn upgrade_if_outdated(template: FlowTemplate) -> FlowTemplate {
    if !needs_upgrade(&template) {
        return template;
    }
    let mut fresh = default_template_for(template.intent);
    fresh.id = template.id;
    fresh.name = template.name;
    fresh
}
