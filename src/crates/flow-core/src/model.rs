//! Flow template data model
//!
//! A flow template is a versioned DAG of typed nodes connected by directed
//! edges. Templates are stored as JSON under `app_settings` and resolved
//! against runtime context into an [`ExecutionPlan`](crate::resolver::ExecutionPlan)
//! before every pipeline run.

use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node identifier - unique within a template
pub type NodeId = String;

/// Reserved upstream source keys resolved by the orchestrator rather than
/// by node-id lookup.
pub const WELL_KNOWN_SOURCES: &[&str] = &["vibe-brief", "mood-analysis", "project-source"];

/// User request intent, determined by the classifier agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Build something new
    Build,
    /// Fix or adjust existing output
    Fix,
    /// Answer a question without touching artifacts
    Question,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Build => write!(f, "build"),
            Intent::Fix => write!(f, "fix"),
            Intent::Question => write!(f, "question"),
        }
    }
}

impl FromStr for Intent {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Intent::Build),
            "fix" => Ok(Intent::Fix),
            "question" => Ok(Intent::Question),
            other => Err(FlowError::UnknownIntent(other.to_string())),
        }
    }
}

/// Coarse request scope used by condition predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Frontend work only
    Frontend,
    /// Backend work only
    Backend,
    /// Styling-only adjustments
    Styling,
    /// Full-stack work
    Full,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Frontend => write!(f, "frontend"),
            Scope::Backend => write!(f, "backend"),
            Scope::Styling => write!(f, "styling"),
            Scope::Full => write!(f, "full"),
        }
    }
}

impl FromStr for Scope {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frontend" => Ok(Scope::Frontend),
            "backend" => Ok(Scope::Backend),
            "styling" => Ok(Scope::Styling),
            "full" => Ok(Scope::Full),
            other => Err(FlowError::UnknownScope(other.to_string())),
        }
    }
}

/// A versioned pipeline DAG selected at runtime by intent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowTemplate {
    /// Stable template identifier
    pub id: String,

    /// Human-readable template name
    pub name: String,

    /// Intent this template handles
    pub intent: Intent,

    /// Whether the template may be selected at runtime
    pub enabled: bool,

    /// Whether this is a stock template subject to auto-upgrade
    pub is_default: bool,

    /// Template version; defaults are regenerated when this falls behind
    /// [`FLOW_DEFAULTS_VERSION`](crate::templates::FLOW_DEFAULTS_VERSION)
    pub version: u32,

    /// Ordered node set; insertion order breaks topological-sort ties
    pub nodes: Vec<FlowNode>,

    /// Ordered edge set
    pub edges: Vec<FlowEdge>,
}

impl FlowTemplate {
    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

/// Condition evaluation mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ConditionMode {
    /// Closed vocabulary: `needsBackend`, `hasFiles`,
    /// `scopeIncludes:frontend|backend|styling`
    Predefined {
        /// Predefined condition identifier
        id: String,
    },

    /// Sandboxed boolean expression over the four allowed variables
    Expression {
        /// Expression source text
        expression: String,
    },
}

/// Human-in-the-loop checkpoint flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    /// Simple approve/reject gate
    Approve,
    /// Design-direction choice among presented options
    DesignDirection,
}

/// Post-processing action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Run the build command; loop a fix agent over unique error signatures
    BuildCheck,
    /// Run the test command; loop a fix agent over failing tests
    TestRun,
    /// Iterate fix agents until configured reviewers report clean
    Remediation,
    /// Single LLM call producing a run summary message
    Summary,
    /// Single LLM call producing a structured vibe brief
    VibeIntake,
    /// Single LLM call producing a mood analysis card
    MoodAnalysis,
    /// Single LLM call answering a question directly
    Answer,
    /// Run an arbitrary command under the project directory
    Shell,
    /// Generic single LLM call with a custom prompt
    LlmCall,
    /// Snapshot the project tree (emitted for version nodes)
    Snapshot,
    /// Pause for human resolution (emitted for checkpoint nodes)
    Checkpoint,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::BuildCheck => "build-check",
            ActionKind::TestRun => "test-run",
            ActionKind::Remediation => "remediation",
            ActionKind::Summary => "summary",
            ActionKind::VibeIntake => "vibe-intake",
            ActionKind::MoodAnalysis => "mood-analysis",
            ActionKind::Answer => "answer",
            ActionKind::Shell => "shell",
            ActionKind::LlmCall => "llm-call",
            ActionKind::Snapshot => "snapshot",
            ActionKind::Checkpoint => "checkpoint",
        };
        write!(f, "{}", s)
    }
}

/// Transform applied to an upstream source value before prompt assembly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTransform {
    /// Pass the upstream output through unchanged
    #[default]
    Raw,
    /// Extract the `design_system` field from architect JSON output
    DesignSystem,
    /// Scrape `write_file` tool-call paths out of the upstream output
    FileManifest,
    /// Serialize the current project tree with size caps
    ProjectSource,
}

/// Declarative reference to a prior step's output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSource {
    /// Ancestor node id or a well-known key
    /// (`vibe-brief`, `mood-analysis`, `project-source`)
    pub source_key: String,

    /// Label override used when assembling the prompt block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Transform applied before labeling
    #[serde(default)]
    pub transform: SourceTransform,
}

impl UpstreamSource {
    /// Reference an upstream node's raw output
    pub fn raw(source_key: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            alias: None,
            transform: SourceTransform::Raw,
        }
    }

    /// Reference with an explicit transform
    pub fn with_transform(source_key: impl Into<String>, transform: SourceTransform) -> Self {
        Self {
            source_key: source_key.into(),
            alias: None,
            transform,
        }
    }

    /// Set the prompt label alias
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Check whether the source key is one of the reserved keys
    pub fn is_well_known(&self) -> bool {
        WELL_KNOWN_SOURCES.contains(&self.source_key.as_str())
    }
}

/// Kind-specific action configuration carried on action nodes and
/// resolved into plan steps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSettings {
    /// Command line for build-check/test-run/shell kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Wall-clock timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Attempt cap for fix/remediation loops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Output token cap for LLM-backed kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// System prompt override for LLM-backed kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Step keys whose outputs the remediation action scans for issues
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation_reviewer_keys: Vec<String>,

    /// Agents the remediation action invokes with consolidated issues
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation_fix_agents: Vec<String>,
}

/// A node in a flow template DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FlowNode {
    /// An LLM agent invocation
    #[serde(rename_all = "camelCase")]
    Agent {
        /// Node id (the step's `instanceId` once resolved)
        id: NodeId,
        /// Registered agent name
        agent_name: String,
        /// Prompt template with a `{{userMessage}}` placeholder
        input_template: String,
        /// Per-node output token cap
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_output_tokens: Option<u32>,
        /// Per-node tool step cap
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tool_steps: Option<u32>,
        /// Per-node system prompt override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
        /// Restrict the agent's tool set to these names
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_overrides: Option<Vec<String>>,
        /// Upstream outputs assembled into the prompt
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        upstream_sources: Vec<UpstreamSource>,
    },

    /// A branch predicate evaluated at resolution time
    #[serde(rename_all = "camelCase")]
    Condition {
        /// Node id
        id: NodeId,
        /// Evaluation mode
        #[serde(flatten)]
        mode: ConditionMode,
    },

    /// A human-in-the-loop pause
    #[serde(rename_all = "camelCase")]
    Checkpoint {
        /// Node id
        id: NodeId,
        /// Display label
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        /// Checkpoint flavor
        checkpoint_type: CheckpointType,
        /// Message shown to the user
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Skip this checkpoint when the chat's YOLO flag is on
        #[serde(default)]
        skip_in_yolo: bool,
        /// Auto-resolve timeout; resolves to the default approve choice
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Choices for design-direction checkpoints
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },

    /// A post-processing action
    #[serde(rename_all = "camelCase")]
    Action {
        /// Node id
        id: NodeId,
        /// Action kind
        action_kind: ActionKind,
        /// Kind-specific settings
        #[serde(default)]
        settings: ActionSettings,
    },

    /// Marker node indicating an automatic snapshot point
    #[serde(rename_all = "camelCase")]
    Version {
        /// Node id (also the snapshot label)
        id: NodeId,
        /// Display label
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },

    /// Static data shared with downstream agents
    #[serde(rename_all = "camelCase")]
    Config {
        /// Node id
        id: NodeId,
        /// Base system prompt prepended to downstream agent prompts
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_system_prompt: Option<String>,
    },
}

impl FlowNode {
    /// The node's identifier
    pub fn id(&self) -> &str {
        match self {
            FlowNode::Agent { id, .. }
            | FlowNode::Condition { id, .. }
            | FlowNode::Checkpoint { id, .. }
            | FlowNode::Action { id, .. }
            | FlowNode::Version { id, .. }
            | FlowNode::Config { id, .. } => id,
        }
    }

    /// Short kind tag for logs and validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            FlowNode::Agent { .. } => "agent",
            FlowNode::Condition { .. } => "condition",
            FlowNode::Checkpoint { .. } => "checkpoint",
            FlowNode::Action { .. } => "action",
            FlowNode::Version { .. } => "version",
            FlowNode::Config { .. } => "config",
        }
    }

    /// Whether this node becomes a plan step when active
    ///
    /// Agent, action, version, and checkpoint nodes all carry step keys;
    /// condition and config nodes only shape the walk.
    pub fn emits_step(&self) -> bool {
        matches!(
            self,
            FlowNode::Agent { .. }
                | FlowNode::Action { .. }
                | FlowNode::Version { .. }
                | FlowNode::Checkpoint { .. }
        )
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    /// Source node id
    pub source: NodeId,

    /// Target node id
    pub target: NodeId,

    /// Branch label for condition sources: `"true"` or `"false"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FlowEdge {
    /// Plain edge with no branch handle
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            label: None,
        }
    }

    /// Condition branch edge with a `"true"`/`"false"` handle
    pub fn branch(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: Some(handle.into()),
            label: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trip() {
        for s in ["build", "fix", "question"] {
            let intent: Intent = s.parse().unwrap();
            assert_eq!(intent.to_string(), s);
        }
        assert!("deploy".parse::<Intent>().is_err());
    }

    #[test]
    fn test_scope_round_trip() {
        for s in ["frontend", "backend", "styling", "full"] {
            let scope: Scope = s.parse().unwrap();
            assert_eq!(scope.to_string(), s);
        }
        assert!("infra".parse::<Scope>().is_err());
    }

    #[test]
    fn test_node_serialization_tags() {
        let node = FlowNode::Agent {
            id: "research".to_string(),
            agent_name: "research".to_string(),
            input_template: "Research: {{userMessage}}".to_string(),
            max_output_tokens: None,
            max_tool_steps: None,
            system_prompt: None,
            tool_overrides: None,
            upstream_sources: vec![],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "agent");
        assert_eq!(json["agentName"], "research");

        let back: FlowNode = serde_json::from_value(json).unwrap();
        assert_eq!(back.id(), "research");
        assert!(back.emits_step());
    }

    #[test]
    fn test_condition_mode_serialization() {
        let node = FlowNode::Condition {
            id: "cond-backend".to_string(),
            mode: ConditionMode::Predefined {
                id: "needsBackend".to_string(),
            },
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "condition");
        assert_eq!(json["mode"], "predefined");
        assert!(!node.emits_step());
    }

    #[test]
    fn test_action_kind_rename() {
        let json = serde_json::to_value(ActionKind::BuildCheck).unwrap();
        assert_eq!(json, "build-check");
        assert_eq!(ActionKind::VibeIntake.to_string(), "vibe-intake");
    }

    #[test]
    fn test_upstream_source_well_known() {
        assert!(UpstreamSource::raw("vibe-brief").is_well_known());
        assert!(!UpstreamSource::raw("architect").is_well_known());
    }

    #[test]
    fn test_edge_builders() {
        let e = FlowEdge::branch("cond", "yes-path", "true");
        assert_eq!(e.source_handle.as_deref(), Some("true"));
        let p = FlowEdge::new("a", "b");
        assert!(p.source_handle.is_none());
    }
}
