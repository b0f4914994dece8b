//! Template validation and topological ordering
//!
//! Validation accumulates issues rather than short-circuiting so the editor
//! can surface everything wrong with a template in one pass. Errors block
//! saving; warnings do not.

use crate::expr;
use crate::model::{ConditionMode, FlowEdge, FlowNode, FlowTemplate, NodeId, SourceTransform};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Valid predefined condition identifiers
pub const PREDEFINED_CONDITIONS: &[&str] = &[
    "needsBackend",
    "hasFiles",
    "scopeIncludes:frontend",
    "scopeIncludes:backend",
    "scopeIncludes:styling",
];

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Blocks saving the template
    Error,
    /// Surfaced but non-blocking
    Warning,
}

/// A single validation finding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Severity of the finding
    pub severity: IssueSeverity,

    /// Node the finding refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,

    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    fn error(node_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            node_id: node_id.map(|s| s.to_string()),
            message: message.into(),
        }
    }

    fn warning(node_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            node_id: node_id.map(|s| s.to_string()),
            message: message.into(),
        }
    }

    /// Whether this issue blocks saving
    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

/// Kahn's algorithm with insertion-order tie-breaking
///
/// Returns the full ordering, or `None` if the graph contains a cycle.
/// Ties are broken by node position in `nodes`, which keeps resolved plans
/// stable across runs for a given template.
pub fn topological_order(nodes: &[FlowNode], edges: &[FlowEdge]) -> Option<Vec<NodeId>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        // Edges over unknown nodes are reported by validate(); skip here
        if !index.contains_key(edge.source.as_str()) || !index.contains_key(edge.target.as_str()) {
            continue;
        }
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        *in_degree.get_mut(edge.target.as_str()).unwrap() += 1;
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_by_key(|id| index[id]);

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.first().copied() {
        ready.remove(0);
        order.push(id.to_string());
        if let Some(targets) = adjacency.get(id) {
            for target in targets {
                let d = in_degree.get_mut(target).unwrap();
                *d -= 1;
                if *d == 0 {
                    // Insert keeping the ready list sorted by insertion index
                    let pos = ready
                        .iter()
                        .position(|r| index[r] > index[target])
                        .unwrap_or(ready.len());
                    ready.insert(pos, target);
                }
            }
        }
    }

    if order.len() == nodes.len() {
        Some(order)
    } else {
        None
    }
}

/// Compute all ancestors of a node by walking edges backwards
pub fn ancestors(node_id: &str, edges: &[FlowEdge]) -> HashSet<NodeId> {
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        incoming
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }

    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(node_id);

    while let Some(current) = queue.pop_front() {
        if let Some(sources) = incoming.get(current) {
            for source in sources {
                if seen.insert(source.to_string()) {
                    queue.push_back(source);
                }
            }
        }
    }

    seen
}

/// Validate a template against the registered agent set
///
/// Checks run in a fixed order and accumulate issues; only the empty-template
/// check aborts early since nothing else is meaningful without nodes.
pub fn validate(template: &FlowTemplate, known_agent_names: &[&str]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if template.nodes.is_empty() {
        issues.push(ValidationIssue::error(None, "template has no nodes"));
    }
    if template.name.trim().is_empty() {
        issues.push(ValidationIssue::error(None, "template name is empty"));
    }
    if !issues.is_empty() {
        return issues;
    }

    let node_ids: HashSet<&str> = template.nodes.iter().map(|n| n.id()).collect();
    if node_ids.len() != template.nodes.len() {
        let mut seen = HashSet::new();
        for node in &template.nodes {
            if !seen.insert(node.id()) {
                issues.push(ValidationIssue::error(
                    Some(node.id()),
                    format!("duplicate node id '{}'", node.id()),
                ));
            }
        }
    }

    // Edge endpoints must exist
    for edge in &template.edges {
        if !node_ids.contains(edge.source.as_str()) {
            issues.push(ValidationIssue::error(
                None,
                format!("edge references unknown source node '{}'", edge.source),
            ));
        }
        if !node_ids.contains(edge.target.as_str()) {
            issues.push(ValidationIssue::error(
                None,
                format!("edge references unknown target node '{}'", edge.target),
            ));
        }
    }

    // Start and terminal presence
    let targets: HashSet<&str> = template.edges.iter().map(|e| e.target.as_str()).collect();
    let sources: HashSet<&str> = template.edges.iter().map(|e| e.source.as_str()).collect();
    let starts: Vec<&str> = template
        .nodes
        .iter()
        .map(|n| n.id())
        .filter(|id| !targets.contains(id))
        .collect();
    let terminals: Vec<&str> = template
        .nodes
        .iter()
        .map(|n| n.id())
        .filter(|id| !sources.contains(id))
        .collect();

    if starts.is_empty() {
        issues.push(ValidationIssue::error(
            None,
            "template has no start node (every node has an incoming edge)",
        ));
    }
    if terminals.is_empty() {
        issues.push(ValidationIssue::error(
            None,
            "template has no terminal node (every node has an outgoing edge)",
        ));
    }

    // Acyclicity
    if topological_order(&template.nodes, &template.edges).is_none() {
        issues.push(ValidationIssue::error(None, "template contains a cycle"));
    }

    // Reachability from start nodes
    let mut reachable: HashSet<&str> = starts.iter().copied().collect();
    let mut queue: VecDeque<&str> = starts.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        for edge in &template.edges {
            if edge.source == current && reachable.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    for node in &template.nodes {
        if !reachable.contains(node.id()) {
            issues.push(ValidationIssue::error(
                Some(node.id()),
                format!("node '{}' is unreachable from any start node", node.id()),
            ));
        }
    }

    // Per-node checks
    for node in &template.nodes {
        match node {
            FlowNode::Agent { agent_name, .. } => {
                if !known_agent_names.contains(&agent_name.as_str()) {
                    issues.push(ValidationIssue::error(
                        Some(node.id()),
                        format!("unknown agent '{}'", agent_name),
                    ));
                }
            }
            FlowNode::Condition { mode, .. } => match mode {
                ConditionMode::Predefined { id } => {
                    if !PREDEFINED_CONDITIONS.contains(&id.as_str()) {
                        issues.push(ValidationIssue::error(
                            Some(node.id()),
                            format!("unknown predefined condition '{}'", id),
                        ));
                    }
                }
                ConditionMode::Expression { expression } => {
                    if expression.trim().is_empty() {
                        issues.push(ValidationIssue::error(
                            Some(node.id()),
                            "condition expression is empty",
                        ));
                    } else {
                        match expr::identifiers(expression) {
                            Ok(idents) => {
                                for ident in &idents {
                                    if expr::DANGEROUS_IDENTIFIERS.contains(&ident.as_str()) {
                                        issues.push(ValidationIssue::error(
                                            Some(node.id()),
                                            format!(
                                                "expression references forbidden identifier '{}'",
                                                ident
                                            ),
                                        ));
                                    } else if !expr::ALLOWED_VARIABLES.contains(&ident.as_str()) {
                                        issues.push(ValidationIssue::error(
                                            Some(node.id()),
                                            format!(
                                                "expression references unknown variable '{}'",
                                                ident
                                            ),
                                        ));
                                    }
                                }
                                if let Err(e) = expr::check_syntax(expression) {
                                    issues.push(ValidationIssue::error(
                                        Some(node.id()),
                                        format!("expression does not parse: {}", e),
                                    ));
                                }
                            }
                            Err(e) => {
                                issues.push(ValidationIssue::error(
                                    Some(node.id()),
                                    format!("expression does not lex: {}", e),
                                ));
                            }
                        }
                    }
                }
            },
            FlowNode::Checkpoint { label, .. } => {
                if label.as_deref().unwrap_or("").trim().is_empty() {
                    issues.push(ValidationIssue::warning(
                        Some(node.id()),
                        "checkpoint has no label",
                    ));
                }
            }
            FlowNode::Version { label, .. } => {
                if label.as_deref().unwrap_or("").trim().is_empty() {
                    issues.push(ValidationIssue::warning(
                        Some(node.id()),
                        "version marker has no label",
                    ));
                }
            }
            FlowNode::Action { .. } | FlowNode::Config { .. } => {}
        }
    }

    // Condition branch labels
    for node in &template.nodes {
        if let FlowNode::Condition { .. } = node {
            let has_labeled_branch = template.edges.iter().any(|e| {
                e.source == node.id()
                    && matches!(e.source_handle.as_deref(), Some("true") | Some("false"))
            });
            if !has_labeled_branch {
                issues.push(ValidationIssue::warning(
                    Some(node.id()),
                    "condition has no labeled 'true'/'false' branch",
                ));
            }
        }
    }

    // Upstream sources
    for node in &template.nodes {
        if let FlowNode::Agent {
            upstream_sources, ..
        } = node
        {
            if upstream_sources.is_empty() {
                continue;
            }
            let node_ancestors = ancestors(node.id(), &template.edges);
            let mut labels: HashSet<&str> = HashSet::new();

            for source in upstream_sources {
                if !source.is_well_known() && !node_ancestors.contains(&source.source_key) {
                    issues.push(ValidationIssue::error(
                        Some(node.id()),
                        format!(
                            "upstream source '{}' is neither an ancestor nor a well-known key",
                            source.source_key
                        ),
                    ));
                }

                let label = source.alias.as_deref().unwrap_or(&source.source_key);
                if !labels.insert(label) {
                    issues.push(ValidationIssue::error(
                        Some(node.id()),
                        format!("duplicate upstream alias '{}'", label),
                    ));
                }

                if source.transform == SourceTransform::DesignSystem
                    && !source.source_key.contains("architect")
                {
                    issues.push(ValidationIssue::warning(
                        Some(node.id()),
                        format!(
                            "design-system transform applied to non-architect source '{}'",
                            source.source_key
                        ),
                    ));
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionKind, ActionSettings, UpstreamSource};

    fn agent(id: &str, name: &str) -> FlowNode {
        FlowNode::Agent {
            id: id.to_string(),
            agent_name: name.to_string(),
            input_template: "{{userMessage}}".to_string(),
            max_output_tokens: None,
            max_tool_steps: None,
            system_prompt: None,
            tool_overrides: None,
            upstream_sources: vec![],
        }
    }

    fn template(nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> FlowTemplate {
        FlowTemplate {
            id: "t1".to_string(),
            name: "test".to_string(),
            intent: crate::model::Intent::Build,
            enabled: true,
            is_default: false,
            version: 1,
            nodes,
            edges,
        }
    }

    const AGENTS: &[&str] = &["research", "architect"];

    #[test]
    fn test_empty_template_short_circuits() {
        let t = template(vec![], vec![]);
        let issues = validate(&t, AGENTS);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
    }

    #[test]
    fn test_valid_chain() {
        let t = template(
            vec![agent("a", "research"), agent("b", "architect")],
            vec![FlowEdge::new("a", "b")],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let t = template(
            vec![agent("a", "research")],
            vec![FlowEdge::new("a", "ghost")],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues
            .iter()
            .any(|i| i.is_error() && i.message.contains("ghost")));
    }

    #[test]
    fn test_cycle_detected() {
        let t = template(
            vec![agent("a", "research"), agent("b", "architect")],
            vec![FlowEdge::new("a", "b"), FlowEdge::new("b", "a")],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues.iter().any(|i| i.message.contains("cycle")));
        assert!(topological_order(&t.nodes, &t.edges).is_none());
    }

    #[test]
    fn test_unreachable_node() {
        let t = template(
            vec![
                agent("a", "research"),
                agent("b", "architect"),
                agent("c", "research"),
                agent("d", "architect"),
            ],
            vec![
                FlowEdge::new("a", "b"),
                // c -> d forms an island; with no incoming edges c is a
                // second start node, so instead make d -> c a cycle island
                FlowEdge::new("c", "d"),
                FlowEdge::new("d", "c"),
            ],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues.iter().any(|i| i.message.contains("unreachable")));
    }

    #[test]
    fn test_unknown_agent() {
        let t = template(vec![agent("a", "mystery")], vec![]);
        let issues = validate(&t, AGENTS);
        assert!(issues
            .iter()
            .any(|i| i.is_error() && i.message.contains("mystery")));
    }

    #[test]
    fn test_dangerous_expression_rejected() {
        let t = template(
            vec![
                FlowNode::Condition {
                    id: "cond".to_string(),
                    mode: ConditionMode::Expression {
                        expression: "process && needsBackend".to_string(),
                    },
                },
                agent("a", "research"),
            ],
            vec![FlowEdge::branch("cond", "a", "true")],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues
            .iter()
            .any(|i| i.is_error() && i.message.contains("forbidden identifier 'process'")));
    }

    #[test]
    fn test_unknown_expression_variable_rejected() {
        let t = template(
            vec![
                FlowNode::Condition {
                    id: "cond".to_string(),
                    mode: ConditionMode::Expression {
                        expression: "budget === 'high'".to_string(),
                    },
                },
                agent("a", "research"),
            ],
            vec![FlowEdge::branch("cond", "a", "true")],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues
            .iter()
            .any(|i| i.is_error() && i.message.contains("unknown variable 'budget'")));
    }

    #[test]
    fn test_condition_without_labeled_branch_warns() {
        let t = template(
            vec![
                FlowNode::Condition {
                    id: "cond".to_string(),
                    mode: ConditionMode::Predefined {
                        id: "needsBackend".to_string(),
                    },
                },
                agent("a", "research"),
            ],
            vec![FlowEdge::new("cond", "a")],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues
            .iter()
            .any(|i| !i.is_error() && i.message.contains("labeled")));
    }

    #[test]
    fn test_upstream_must_be_ancestor_or_well_known() {
        let mut downstream = agent("b", "architect");
        if let FlowNode::Agent {
            upstream_sources, ..
        } = &mut downstream
        {
            upstream_sources.push(UpstreamSource::raw("a"));
            upstream_sources.push(UpstreamSource::raw("vibe-brief"));
            upstream_sources.push(UpstreamSource::raw("stranger"));
        }
        let t = template(
            vec![agent("a", "research"), downstream],
            vec![FlowEdge::new("a", "b")],
        );
        let issues = validate(&t, AGENTS);
        let errors: Vec<_> = issues.iter().filter(|i| i.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("stranger"));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut downstream = agent("c", "architect");
        if let FlowNode::Agent {
            upstream_sources, ..
        } = &mut downstream
        {
            upstream_sources.push(UpstreamSource::raw("a").aliased("ctx"));
            upstream_sources.push(UpstreamSource::raw("b").aliased("ctx"));
        }
        let t = template(
            vec![agent("a", "research"), agent("b", "research"), downstream],
            vec![
                FlowEdge::new("a", "b"),
                FlowEdge::new("b", "c"),
            ],
        );
        let issues = validate(&t, AGENTS);
        assert!(issues
            .iter()
            .any(|i| i.is_error() && i.message.contains("duplicate upstream alias")));
    }

    #[test]
    fn test_topological_order_stable() {
        // Diamond: a -> {b, c} -> d; insertion order b before c
        let t = template(
            vec![
                agent("a", "research"),
                agent("b", "research"),
                agent("c", "research"),
                agent("d", "research"),
            ],
            vec![
                FlowEdge::new("a", "b"),
                FlowEdge::new("a", "c"),
                FlowEdge::new("b", "d"),
                FlowEdge::new("c", "d"),
            ],
        );
        let order = topological_order(&t.nodes, &t.edges).unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_ancestors_walk() {
        let edges = vec![
            FlowEdge::new("a", "b"),
            FlowEdge::new("b", "c"),
            FlowEdge::new("x", "c"),
        ];
        let anc = ancestors("c", &edges);
        assert_eq!(anc.len(), 3);
        assert!(anc.contains("a") && anc.contains("b") && anc.contains("x"));
        assert!(ancestors("a", &edges).is_empty());
    }

    #[test]
    fn test_action_node_passes() {
        let t = template(
            vec![
                agent("a", "research"),
                FlowNode::Action {
                    id: "check".to_string(),
                    action_kind: ActionKind::BuildCheck,
                    settings: ActionSettings::default(),
                },
            ],
            vec![FlowEdge::new("a", "check")],
        );
        assert!(validate(&t, AGENTS).is_empty());
    }
}
