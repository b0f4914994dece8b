//! Human-in-the-loop checkpoint gates
//!
//! A checkpoint step suspends its downstream until an external resolve call
//! keyed by `{chatId, checkpointId}` arrives, the node's timeout elapses
//! (resolving to the default approve choice), or the pipeline is cancelled.
//! YOLO-flagged chats skip nodes that opt in via `skipInYolo`.

use crate::{OrchestratorError, Result};
use dashmap::DashMap;
use flow_core::resolver::CheckpointSpec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fallback choice when a checkpoint times out or has no options
pub const DEFAULT_CHOICE: &str = "approve";

fn gate_key(chat_id: &str, checkpoint_id: &str) -> String {
    format!("{}:{}", chat_id, checkpoint_id)
}

/// Registry of pending checkpoint gates
#[derive(Clone, Default)]
pub struct CheckpointRegistry {
    pending: Arc<DashMap<String, oneshot::Sender<String>>>,
}

impl CheckpointRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The default choice for a checkpoint spec
    pub fn default_choice(spec: &CheckpointSpec) -> String {
        spec.options
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_CHOICE.to_string())
    }

    /// Resolve a pending checkpoint; returns false when nothing was waiting
    pub fn resolve(&self, chat_id: &str, checkpoint_id: &str, choice: &str) -> bool {
        match self.pending.remove(&gate_key(chat_id, checkpoint_id)) {
            Some((_, tx)) => {
                info!(chat = chat_id, checkpoint = checkpoint_id, choice, "checkpoint resolved");
                tx.send(choice.to_string()).is_ok()
            }
            None => false,
        }
    }

    /// Whether a checkpoint is currently waiting
    pub fn is_pending(&self, chat_id: &str, checkpoint_id: &str) -> bool {
        self.pending.contains_key(&gate_key(chat_id, checkpoint_id))
    }

    /// Block until the checkpoint resolves, times out, or is cancelled
    ///
    /// Returns the committed choice. Timeout resolves to the spec's default
    /// approve choice rather than failing the step.
    pub async fn wait(
        &self,
        chat_id: &str,
        checkpoint_id: &str,
        spec: &CheckpointSpec,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(gate_key(chat_id, checkpoint_id), tx);

        let timeout = spec.timeout_ms.map(Duration::from_millis);
        debug!(chat = chat_id, checkpoint = checkpoint_id, ?timeout, "checkpoint waiting");

        let choice = tokio::select! {
            received = rx => match received {
                Ok(choice) => choice,
                // Sender dropped without resolution; treat as default
                Err(_) => Self::default_choice(spec),
            },
            _ = async {
                match timeout {
                    Some(duration) => tokio::time::sleep(duration).await,
                    // No timeout configured: wait indefinitely
                    None => std::future::pending().await,
                }
            } => {
                info!(chat = chat_id, checkpoint = checkpoint_id, "checkpoint timed out, using default");
                Self::default_choice(spec)
            }
            _ = cancel.cancelled() => {
                self.pending.remove(&gate_key(chat_id, checkpoint_id));
                return Err(OrchestratorError::Cancelled);
            }
        };

        self.pending.remove(&gate_key(chat_id, checkpoint_id));
        Ok(choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::model::CheckpointType;

    fn spec(timeout_ms: Option<u64>, options: Vec<String>) -> CheckpointSpec {
        CheckpointSpec {
            checkpoint_type: CheckpointType::DesignDirection,
            message: None,
            skip_in_yolo: true,
            timeout_ms,
            options,
        }
    }

    #[tokio::test]
    async fn test_resolve_delivers_choice() {
        let registry = CheckpointRegistry::new();
        let cancel = CancellationToken::new();
        let waiter = registry.clone();
        let cancel_clone = cancel.clone();

        let handle = tokio::spawn(async move {
            waiter
                .wait("c1", "design", &spec(None, vec!["bold".into()]), &cancel_clone)
                .await
        });

        // Give the waiter time to register
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.is_pending("c1", "design"));
        assert!(registry.resolve("c1", "design", "minimal"));

        assert_eq!(handle.await.unwrap().unwrap(), "minimal");
        assert!(!registry.is_pending("c1", "design"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_first_option() {
        let registry = CheckpointRegistry::new();
        let cancel = CancellationToken::new();
        let choice = registry
            .wait(
                "c1",
                "design",
                &spec(Some(30), vec!["bold".into(), "minimal".into()]),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(choice, "bold");
    }

    #[tokio::test]
    async fn test_timeout_without_options_approves() {
        let registry = CheckpointRegistry::new();
        let cancel = CancellationToken::new();
        let choice = registry
            .wait("c1", "gate", &spec(Some(30), vec![]), &cancel)
            .await
            .unwrap();
        assert_eq!(choice, DEFAULT_CHOICE);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let registry = CheckpointRegistry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry.wait("c1", "gate", &spec(None, vec![]), &cancel).await;
        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    }

    #[test]
    fn test_resolve_without_waiter() {
        let registry = CheckpointRegistry::new();
        assert!(!registry.resolve("c1", "ghost", "approve"));
    }
}
