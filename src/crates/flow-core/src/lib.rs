//! Flow template model, validator, and resolver for pageforge pipelines
//!
//! A pipeline's shape is described by a [`FlowTemplate`](model::FlowTemplate):
//! a versioned DAG of agent, condition, checkpoint, action, version, and
//! config nodes. This crate owns everything that happens to a template
//! before execution:
//!
//! - structural validation ([`validate`](validate::validate)) and
//!   topological ordering,
//! - the sandboxed condition-expression interpreter ([`expr`]),
//! - resolution against runtime context into an
//!   [`ExecutionPlan`](resolver::ExecutionPlan) of dependency-keyed steps
//!   ([`resolver::resolve`]),
//! - the stock Build/Fix/Question templates and their auto-upgrade
//!   ([`templates`]).
//!
//! Driving the resolved plan is the orchestrator crate's job; nothing in
//! here performs I/O.

pub mod error;
pub mod expr;
pub mod model;
pub mod resolver;
pub mod templates;
pub mod validate;

pub use error::{FlowError, Result};
pub use model::{
    ActionKind, ActionSettings, CheckpointType, ConditionMode, FlowEdge, FlowNode, FlowTemplate,
    Intent, NodeId, Scope, SourceTransform, UpstreamSource, WELL_KNOWN_SOURCES,
};
pub use resolver::{
    resolve, ActionStep, AgentStep, CheckpointSpec, ExecutionPlan, PlanStep, ResolutionContext,
};
pub use templates::{
    default_template_for, default_templates, upgrade_if_outdated, DEFAULT_AGENT_NAMES,
    FLOW_DEFAULTS_VERSION,
};
pub use validate::{topological_order, validate as validate_template, IssueSeverity, ValidationIssue};
