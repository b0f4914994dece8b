//! Template resolution into execution plans
//!
//! Resolution happens in two passes over the topological order. The first
//! pass evaluates condition nodes against the runtime context and severs
//! branch edges that disagree with the result; a node stays active while it
//! keeps at least one unsevered incoming edge from an active node, which is
//! what preserves rejoin semantics (a node reachable through several
//! branches survives if any branch survives). The second pass emits plan
//! steps for the surviving nodes.

use crate::expr::{self, ExprContext};
use crate::model::{
    ActionKind, ActionSettings, CheckpointType, ConditionMode, FlowNode, FlowTemplate, Intent,
    NodeId, Scope, UpstreamSource,
};
use crate::validate::topological_order;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Runtime context a template is resolved against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionContext {
    /// Classified intent
    pub intent: Intent,
    /// Classified scope
    pub scope: Scope,
    /// Whether the request needs backend work
    pub needs_backend: bool,
    /// Whether the project already has files
    pub has_files: bool,
    /// The user's message, substituted into input templates
    pub user_message: String,
}

impl ResolutionContext {
    fn expr_context(&self) -> ExprContext {
        ExprContext {
            intent: self.intent.to_string(),
            scope: self.scope.to_string(),
            needs_backend: self.needs_backend,
            has_files: self.has_files,
        }
    }
}

/// Checkpoint payload carried on checkpoint steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSpec {
    /// Checkpoint flavor
    pub checkpoint_type: CheckpointType,
    /// Message shown to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Skip when the chat's YOLO flag is on
    #[serde(default)]
    pub skip_in_yolo: bool,
    /// Auto-resolve timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Choices for design-direction checkpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// An agent invocation step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStep {
    /// Originating node id; the step's key
    pub instance_id: NodeId,
    /// Registered agent name (distinct from the key when the same agent
    /// appears on multiple nodes)
    pub agent_name: String,
    /// Input template rendered against the context message
    pub input: String,
    /// Keys of the steps this one waits for
    pub depends_on: Vec<NodeId>,
    /// Per-node output token cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Per-node tool step cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_steps: Option<u32>,
    /// Per-node system prompt override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Restrict the agent's tool set to these names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_overrides: Option<Vec<String>>,
    /// Upstream outputs assembled into the prompt at dispatch time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_sources: Vec<UpstreamSource>,
}

/// A post-processing action step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    /// Originating node id; the step's key
    pub instance_id: NodeId,
    /// Action kind dispatched to the executor
    pub kind: ActionKind,
    /// Keys of the steps this one waits for
    pub depends_on: Vec<NodeId>,
    /// Resolved per-node settings
    #[serde(default)]
    pub settings: ActionSettings,
    /// Checkpoint payload (checkpoint steps only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointSpec>,
    /// Snapshot label (snapshot steps only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A step in a resolved execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlanStep {
    /// LLM agent invocation
    Agent(AgentStep),
    /// Post-processing action
    Action(ActionStep),
}

impl PlanStep {
    /// The step's key (its originating node id)
    pub fn key(&self) -> &str {
        match self {
            PlanStep::Agent(s) => &s.instance_id,
            PlanStep::Action(s) => &s.instance_id,
        }
    }

    /// Keys this step waits for
    pub fn depends_on(&self) -> &[NodeId] {
        match self {
            PlanStep::Agent(s) => &s.depends_on,
            PlanStep::Action(s) => &s.depends_on,
        }
    }

    /// Agent name for agent steps, kind string for action steps
    pub fn display_name(&self) -> String {
        match self {
            PlanStep::Agent(s) => s.agent_name.clone(),
            PlanStep::Action(s) => s.kind.to_string(),
        }
    }
}

/// Resolver output: the ordered steps plus ancillary lookups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Steps in topological order
    pub steps: Vec<PlanStep>,

    /// All active non-config node ids in topological order; broadcast as
    /// the `pipeline_plan` payload and persisted on the run row
    pub planned_order: Vec<NodeId>,

    /// Flat per-node settings record kept for legacy consumers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub action_overrides: HashMap<String, serde_json::Value>,

    /// Base system prompt contributed by an active config node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_system_prompt: Option<String>,
}

impl ExecutionPlan {
    /// Whether the plan has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a step by key
    pub fn step(&self, key: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.key() == key)
    }
}

/// Evaluate a predefined condition id against the context
fn evaluate_predefined(id: &str, ctx: &ResolutionContext) -> bool {
    match id {
        "needsBackend" => ctx.needs_backend,
        "hasFiles" => ctx.has_files,
        "scopeIncludes:frontend" => matches!(ctx.scope, Scope::Frontend | Scope::Full),
        "scopeIncludes:backend" => matches!(ctx.scope, Scope::Backend | Scope::Full),
        "scopeIncludes:styling" => matches!(ctx.scope, Scope::Styling | Scope::Full),
        other => {
            warn!(condition = other, "unknown predefined condition, treating as false");
            false
        }
    }
}

/// Evaluate a condition node; failures resolve to `false` with a warning
fn evaluate_condition(node_id: &str, mode: &ConditionMode, ctx: &ResolutionContext) -> bool {
    match mode {
        ConditionMode::Predefined { id } => evaluate_predefined(id, ctx),
        ConditionMode::Expression { expression } => {
            match expr::evaluate(expression, &ctx.expr_context()) {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        node = node_id,
                        error = %e,
                        "condition expression failed to evaluate, treating as false"
                    );
                    false
                }
            }
        }
    }
}

/// Resolve a template against runtime context into an execution plan
///
/// A template with a cycle resolves to an empty plan (validation should have
/// rejected it; this is the runtime backstop).
pub fn resolve(template: &FlowTemplate, ctx: &ResolutionContext) -> ExecutionPlan {
    let order = match topological_order(&template.nodes, &template.edges) {
        Some(order) => order,
        None => {
            warn!(template = %template.id, "template contains a cycle, resolving to empty plan");
            return ExecutionPlan::default();
        }
    };

    let nodes: HashMap<&str, &FlowNode> = template.nodes.iter().map(|n| (n.id(), n)).collect();
    let has_incoming: HashSet<&str> = template.edges.iter().map(|e| e.target.as_str()).collect();

    // First pass: evaluate conditions in topological order, severing branch
    // edges that disagree, and settle the active set.
    let mut active: HashSet<NodeId> = HashSet::new();
    let mut severed: HashSet<usize> = HashSet::new();

    for node_id in &order {
        let is_start = !has_incoming.contains(node_id.as_str());
        let reachable = is_start
            || template.edges.iter().enumerate().any(|(i, e)| {
                e.target == *node_id && !severed.contains(&i) && active.contains(&e.source)
            });
        if !reachable {
            continue;
        }
        active.insert(node_id.clone());

        if let Some(FlowNode::Condition { mode, .. }) = nodes.get(node_id.as_str()).copied() {
            let result = evaluate_condition(node_id, mode, ctx);
            let disagreeing = if result { "false" } else { "true" };
            for (i, edge) in template.edges.iter().enumerate() {
                if edge.source == *node_id && edge.source_handle.as_deref() == Some(disagreeing) {
                    severed.insert(i);
                }
            }
        }
    }

    // Dependency lookup: walk backwards through active nodes along unsevered
    // edges, collecting the nearest step-emitting ancestors. Condition and
    // config nodes are transparent to the walk.
    let step_dependencies = |node_id: &str| -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![node_id];

        while let Some(current) = stack.pop() {
            for (i, edge) in template.edges.iter().enumerate() {
                if edge.target != current || severed.contains(&i) {
                    continue;
                }
                let source = edge.source.as_str();
                if !active.contains(source) || !seen.insert(source) {
                    continue;
                }
                match nodes.get(source) {
                    Some(n) if n.emits_step() => deps.push(source.to_string()),
                    Some(_) => stack.push(source),
                    None => {}
                }
            }
        }

        deps.sort();
        deps
    };

    // Second pass: emit steps for active nodes in topological order.
    let mut plan = ExecutionPlan::default();

    for node_id in &order {
        if !active.contains(node_id) {
            continue;
        }
        let node = match nodes.get(node_id.as_str()) {
            Some(n) => *n,
            None => continue,
        };

        match node {
            FlowNode::Config {
                base_system_prompt, ..
            } => {
                if plan.base_system_prompt.is_none() {
                    plan.base_system_prompt = base_system_prompt.clone();
                }
                continue;
            }
            FlowNode::Condition { .. } => {
                plan.planned_order.push(node_id.clone());
                continue;
            }
            FlowNode::Agent {
                id,
                agent_name,
                input_template,
                max_output_tokens,
                max_tool_steps,
                system_prompt,
                tool_overrides,
                upstream_sources,
            } => {
                plan.planned_order.push(node_id.clone());
                plan.steps.push(PlanStep::Agent(AgentStep {
                    instance_id: id.clone(),
                    agent_name: agent_name.clone(),
                    input: input_template.replace("{{userMessage}}", &ctx.user_message),
                    depends_on: step_dependencies(id),
                    max_output_tokens: *max_output_tokens,
                    max_tool_steps: *max_tool_steps,
                    system_prompt: system_prompt.clone(),
                    tool_overrides: tool_overrides.clone(),
                    upstream_sources: upstream_sources.clone(),
                }));
            }
            FlowNode::Action {
                id,
                action_kind,
                settings,
            } => {
                plan.planned_order.push(node_id.clone());
                if let Ok(value) = serde_json::to_value(settings) {
                    plan.action_overrides.insert(id.clone(), value);
                }
                plan.steps.push(PlanStep::Action(ActionStep {
                    instance_id: id.clone(),
                    kind: *action_kind,
                    depends_on: step_dependencies(id),
                    settings: settings.clone(),
                    checkpoint: None,
                    label: None,
                }));
            }
            FlowNode::Version { id, label } => {
                plan.planned_order.push(node_id.clone());
                plan.steps.push(PlanStep::Action(ActionStep {
                    instance_id: id.clone(),
                    kind: ActionKind::Snapshot,
                    depends_on: step_dependencies(id),
                    settings: ActionSettings::default(),
                    checkpoint: None,
                    label: Some(label.clone().unwrap_or_else(|| id.clone())),
                }));
            }
            FlowNode::Checkpoint {
                id,
                checkpoint_type,
                message,
                skip_in_yolo,
                timeout_ms,
                options,
                ..
            } => {
                plan.planned_order.push(node_id.clone());
                plan.steps.push(PlanStep::Action(ActionStep {
                    instance_id: id.clone(),
                    kind: ActionKind::Checkpoint,
                    depends_on: step_dependencies(id),
                    settings: ActionSettings::default(),
                    checkpoint: Some(CheckpointSpec {
                        checkpoint_type: *checkpoint_type,
                        message: message.clone(),
                        skip_in_yolo: *skip_in_yolo,
                        timeout_ms: *timeout_ms,
                        options: options.clone(),
                    }),
                    label: None,
                }));
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlowEdge;

    fn agent(id: &str) -> FlowNode {
        FlowNode::Agent {
            id: id.to_string(),
            agent_name: id.to_string(),
            input_template: "Task: {{userMessage}}".to_string(),
            max_output_tokens: None,
            max_tool_steps: None,
            system_prompt: None,
            tool_overrides: None,
            upstream_sources: vec![],
        }
    }

    fn condition(id: &str, expression: &str) -> FlowNode {
        FlowNode::Condition {
            id: id.to_string(),
            mode: ConditionMode::Expression {
                expression: expression.to_string(),
            },
        }
    }

    fn template(nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> FlowTemplate {
        FlowTemplate {
            id: "t".to_string(),
            name: "t".to_string(),
            intent: Intent::Build,
            enabled: true,
            is_default: false,
            version: 1,
            nodes,
            edges,
        }
    }

    fn ctx() -> ResolutionContext {
        ResolutionContext {
            intent: Intent::Build,
            scope: Scope::Full,
            needs_backend: false,
            has_files: false,
            user_message: "Build a landing page".to_string(),
        }
    }

    #[test]
    fn test_linear_chain_dependencies() {
        let t = template(
            vec![agent("a"), agent("b"), agent("c")],
            vec![FlowEdge::new("a", "b"), FlowEdge::new("b", "c")],
        );
        let plan = resolve(&t, &ctx());
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].depends_on(), &[] as &[String]);
        assert_eq!(plan.steps[1].depends_on(), &["a".to_string()]);
        assert_eq!(plan.steps[2].depends_on(), &["b".to_string()]);
    }

    #[test]
    fn test_input_template_rendered() {
        let t = template(vec![agent("a")], vec![]);
        let plan = resolve(&t, &ctx());
        match &plan.steps[0] {
            PlanStep::Agent(s) => assert_eq!(s.input, "Task: Build a landing page"),
            _ => panic!("expected agent step"),
        }
    }

    #[test]
    fn test_condition_prunes_disagreeing_branch() {
        let t = template(
            vec![
                agent("a"),
                condition("cond", "needsBackend"),
                agent("yes"),
                agent("no"),
            ],
            vec![
                FlowEdge::new("a", "cond"),
                FlowEdge::branch("cond", "yes", "true"),
                FlowEdge::branch("cond", "no", "false"),
            ],
        );
        let plan = resolve(&t, &ctx());
        let keys: Vec<&str> = plan.steps.iter().map(|s| s.key()).collect();
        assert!(keys.contains(&"no"));
        assert!(!keys.contains(&"yes"));
    }

    #[test]
    fn test_rejoin_survives_pruning() {
        // A -> cond(true->B, false->C); B -> D; C -> D
        let build = |needs_backend: bool| {
            let t = template(
                vec![
                    agent("a"),
                    condition("cond", "needsBackend"),
                    agent("b"),
                    agent("c"),
                    agent("d"),
                ],
                vec![
                    FlowEdge::new("a", "cond"),
                    FlowEdge::branch("cond", "b", "true"),
                    FlowEdge::branch("cond", "c", "false"),
                    FlowEdge::new("b", "d"),
                    FlowEdge::new("c", "d"),
                ],
            );
            let mut c = ctx();
            c.needs_backend = needs_backend;
            resolve(&t, &c)
        };

        let plan_true = build(true);
        let keys: Vec<&str> = plan_true.steps.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["a", "b", "d"]);

        let plan_false = build(false);
        let keys: Vec<&str> = plan_false.steps.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_prune_propagates_past_dead_branch() {
        // cond(false) -> b -> c: both b and c must go
        let t = template(
            vec![condition("cond", "needsBackend"), agent("b"), agent("c")],
            vec![
                FlowEdge::branch("cond", "b", "true"),
                FlowEdge::new("b", "c"),
            ],
        );
        let plan = resolve(&t, &ctx());
        assert!(plan.steps.is_empty());
        assert_eq!(plan.planned_order, vec!["cond"]);
    }

    #[test]
    fn test_dependency_walk_skips_condition_nodes() {
        // a -> cond -> b: b depends on a, not on the condition
        let t = template(
            vec![agent("a"), condition("cond", "true"), agent("b")],
            vec![
                FlowEdge::new("a", "cond"),
                FlowEdge::branch("cond", "b", "true"),
            ],
        );
        let plan = resolve(&t, &ctx());
        let b = plan.step("b").unwrap();
        assert_eq!(b.depends_on(), &["a".to_string()]);
    }

    #[test]
    fn test_depends_on_keys_are_emitted_keys() {
        let t = template(
            vec![
                agent("a"),
                condition("cond", "hasFiles"),
                agent("b"),
                agent("c"),
            ],
            vec![
                FlowEdge::new("a", "cond"),
                FlowEdge::branch("cond", "b", "true"),
                FlowEdge::branch("cond", "c", "false"),
            ],
        );
        let plan = resolve(&t, &ctx());
        let keys: HashSet<&str> = plan.steps.iter().map(|s| s.key()).collect();
        for step in &plan.steps {
            for dep in step.depends_on() {
                assert!(keys.contains(dep.as_str()), "dangling dependency {}", dep);
            }
        }
    }

    #[test]
    fn test_cycle_resolves_to_empty_plan() {
        let t = template(
            vec![agent("a"), agent("b")],
            vec![FlowEdge::new("a", "b"), FlowEdge::new("b", "a")],
        );
        let plan = resolve(&t, &ctx());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_version_node_emits_snapshot_step() {
        let t = template(
            vec![
                agent("a"),
                FlowNode::Version {
                    id: "v1".to_string(),
                    label: None,
                },
            ],
            vec![FlowEdge::new("a", "v1")],
        );
        let plan = resolve(&t, &ctx());
        match plan.step("v1").unwrap() {
            PlanStep::Action(s) => {
                assert_eq!(s.kind, ActionKind::Snapshot);
                assert_eq!(s.label.as_deref(), Some("v1"));
                assert_eq!(s.depends_on, vec!["a".to_string()]);
            }
            _ => panic!("expected action step"),
        }
    }

    #[test]
    fn test_config_node_contributes_base_prompt_without_step() {
        let t = template(
            vec![
                FlowNode::Config {
                    id: "cfg".to_string(),
                    base_system_prompt: Some("Be terse.".to_string()),
                },
                agent("a"),
            ],
            vec![FlowEdge::new("cfg", "a")],
        );
        let plan = resolve(&t, &ctx());
        assert_eq!(plan.base_system_prompt.as_deref(), Some("Be terse."));
        assert_eq!(plan.steps.len(), 1);
        assert!(!plan.planned_order.contains(&"cfg".to_string()));
    }

    #[test]
    fn test_expression_failure_treated_as_false() {
        let t = template(
            vec![condition("cond", "needsBackend &&"), agent("a"), agent("b")],
            vec![
                FlowEdge::branch("cond", "a", "true"),
                FlowEdge::branch("cond", "b", "false"),
            ],
        );
        let plan = resolve(&t, &ctx());
        let keys: Vec<&str> = plan.steps.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["b"]);
    }
}
