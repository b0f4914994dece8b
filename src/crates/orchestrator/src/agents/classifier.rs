//! Intent classification
//!
//! A small dedicated classifier call runs before template selection and
//! returns `{intent, scope, needsBackend, reasoning}`. The model is asked
//! for bare JSON; parsing tolerates surrounding prose by extracting the
//! first object. A parse or provider failure falls back to a keyword
//! heuristic so a flaky classifier never blocks the pipeline.

use crate::Result;
use flow_core::{Intent, Scope};
use llm::{ChatMessage, ChatProvider, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const CLASSIFIER_PROMPT: &str = "You classify user requests for a web project generator. \
Respond with only a JSON object: {\"intent\": \"build\"|\"fix\"|\"question\", \
\"scope\": \"frontend\"|\"backend\"|\"styling\"|\"full\", \"needsBackend\": bool, \
\"reasoning\": string}. `build` creates something new, `fix` changes existing output, \
`question` needs no artifact changes.";

/// Classifier output driving template selection and condition pruning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Request intent
    pub intent: Intent,
    /// Request scope
    pub scope: Scope,
    /// Whether backend work is needed
    pub needs_backend: bool,
    /// Model's one-line justification
    #[serde(default)]
    pub reasoning: String,
}

/// Extract the first JSON object embedded in model output
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Keyword fallback when the classifier call or parse fails
pub fn heuristic_classification(user_message: &str, has_files: bool) -> Classification {
    let lower = user_message.to_lowercase();

    let question_markers = ["how do", "what is", "why ", "can you explain", "?"];
    let fix_markers = ["fix", "broken", "bug", "change", "adjust", "update", "tweak"];
    let backend_markers = ["api", "backend", "database", "server", "auth", "form submission"];
    let styling_markers = ["color", "font", "spacing", "styling", "css", "padding", "margin"];

    let intent = if question_markers.iter().any(|m| lower.contains(m)) && !has_files {
        Intent::Question
    } else if has_files && fix_markers.iter().any(|m| lower.contains(m)) {
        Intent::Fix
    } else {
        Intent::Build
    };

    let needs_backend = backend_markers.iter().any(|m| lower.contains(m));
    let scope = if styling_markers.iter().any(|m| lower.contains(m))
        && !needs_backend
        && intent == Intent::Fix
    {
        Scope::Styling
    } else if needs_backend && intent == Intent::Fix {
        Scope::Backend
    } else {
        Scope::Full
    };

    Classification {
        intent,
        scope,
        needs_backend,
        reasoning: "keyword heuristic".to_string(),
    }
}

/// Classify a user message via the provider, with heuristic fallback
pub async fn classify(
    provider: &Arc<dyn ChatProvider>,
    user_message: &str,
    has_files: bool,
) -> Result<Classification> {
    let request = CompletionRequest::new(vec![ChatMessage::user(format!(
        "Project has existing files: {}\nRequest: {}",
        has_files, user_message
    ))])
    .with_system(CLASSIFIER_PROMPT)
    .with_max_tokens(512)
    .with_temperature(0.0);

    match provider.chat(request).await {
        Ok(completion) => {
            if let Some(json) = extract_json(&completion.content) {
                match serde_json::from_str::<Classification>(json) {
                    Ok(classification) => {
                        debug!(
                            intent = %classification.intent,
                            scope = %classification.scope,
                            needs_backend = classification.needs_backend,
                            "classified request"
                        );
                        return Ok(classification);
                    }
                    Err(e) => warn!(error = %e, "classifier output did not parse"),
                }
            } else {
                warn!("classifier output contained no JSON object");
            }
            Ok(heuristic_classification(user_message, has_files))
        }
        Err(e) => {
            warn!(error = %e, "classifier call failed, using heuristic");
            Ok(heuristic_classification(user_message, has_files))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let json = extract_json(r#"{"intent":"build"}"#).unwrap();
        assert_eq!(json, r#"{"intent":"build"}"#);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let text = "Sure! Here is the classification:\n{\"intent\":\"fix\",\"nested\":{\"a\":1}}\nDone.";
        let json = extract_json(text).unwrap();
        assert_eq!(json, "{\"intent\":\"fix\",\"nested\":{\"a\":1}}");
    }

    #[test]
    fn test_extract_json_handles_braces_in_strings() {
        let text = r#"{"reasoning":"uses { and } inside","intent":"build"}"#;
        assert_eq!(extract_json(text).unwrap(), text);
    }

    #[test]
    fn test_heuristic_build() {
        let c = heuristic_classification("Build a landing page for my bakery", false);
        assert_eq!(c.intent, Intent::Build);
        assert_eq!(c.scope, Scope::Full);
    }

    #[test]
    fn test_heuristic_styling_fix() {
        let c = heuristic_classification("fix the spacing on the hero", true);
        assert_eq!(c.intent, Intent::Fix);
        assert_eq!(c.scope, Scope::Styling);
        assert!(!c.needs_backend);
    }

    #[test]
    fn test_heuristic_backend() {
        let c = heuristic_classification("fix the contact form api endpoint", true);
        assert_eq!(c.intent, Intent::Fix);
        assert!(c.needs_backend);
        assert_eq!(c.scope, Scope::Backend);
    }

    #[test]
    fn test_classification_round_trip() {
        let json = r#"{"intent":"build","scope":"full","needsBackend":true,"reasoning":"new site"}"#;
        let c: Classification = serde_json::from_str(json).unwrap();
        assert_eq!(c.intent, Intent::Build);
        assert!(c.needs_backend);
    }
}
