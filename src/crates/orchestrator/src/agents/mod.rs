//! Agent registry and step execution
//!
//! The registry binds agent names to role prompts; templates may only
//! reference registered names (validation enforces it). The runner executes
//! one agent step end to end: prompt assembly, streaming, tool routing,
//! persistence, events.

pub mod classifier;
pub mod runner;
pub mod tools;

/// A registered agent role
#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    /// Agent name referenced by templates
    pub name: &'static str,
    /// Role system prompt
    pub system_prompt: &'static str,
}

/// All registered agents
pub const AGENTS: &[AgentSpec] = &[
    AgentSpec {
        name: "research",
        system_prompt: "You are a research agent. Investigate the domain, audience, and \
                        competitive landscape for the request and report concise findings.",
    },
    AgentSpec {
        name: "architect",
        system_prompt: "You are a software architect. Produce a JSON architecture plan with a \
                        `design_system` field (colors, typography, spacing) plus page structure \
                        and component breakdown.",
    },
    AgentSpec {
        name: "frontend-dev",
        system_prompt: "You are a frontend developer. Write the project's HTML/CSS/JS files \
                        using write_file tool calls. Follow the design system you are given.",
    },
    AgentSpec {
        name: "backend-dev",
        system_prompt: "You are a backend developer. Implement server endpoints and data \
                        handling using write_file tool calls.",
    },
    AgentSpec {
        name: "styling",
        system_prompt: "You are a styling specialist. Refine visual hierarchy, spacing, and \
                        polish using write_file tool calls; keep markup changes minimal.",
    },
    AgentSpec {
        name: "code-review",
        system_prompt: "You are a code reviewer. List concrete issues as bullet points, or \
                        reply ISSUES: none when the project is clean.",
    },
    AgentSpec {
        name: "security",
        system_prompt: "You are a security reviewer. List concrete vulnerabilities as bullet \
                        points, or reply ISSUES: none when the project is clean.",
    },
    AgentSpec {
        name: "qa",
        system_prompt: "You are a QA reviewer. Check the result against the user's request and \
                        list gaps as bullet points, or reply ISSUES: none.",
    },
];

/// Names for template validation
pub fn known_agent_names() -> Vec<&'static str> {
    AGENTS.iter().map(|a| a.name).collect()
}

/// Role prompt for a registered agent
pub fn system_prompt_for(name: &str) -> Option<&'static str> {
    AGENTS
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.system_prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_default_templates() {
        let names = known_agent_names();
        for required in flow_core::DEFAULT_AGENT_NAMES {
            assert!(names.contains(required), "missing agent {}", required);
        }
    }

    #[test]
    fn test_prompt_lookup() {
        assert!(system_prompt_for("research").is_some());
        assert!(system_prompt_for("nonexistent").is_none());
    }
}
