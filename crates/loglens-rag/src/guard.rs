// Generation guard - bounded retry around the generation provider
//
// Explicit state machine: Pending -> Calling -> Validating -> Accepted,
// with Retrying loops back to Calling and a terminal Failed once the
// budget is spent. Every attempt reuses the same prompt. This is the ONLY
// retry point in the pipeline; embedding and retrieval failures are
// immediately fatal for the request so configuration errors stay visible.

use std::time::Duration;

use tracing::{info, warn};

use loglens_core::GenerationParams;
use loglens_providers::{GenError, GenerationProvider};

use crate::error::GenerationFailed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Pending,
    Calling,
    Validating,
    Retrying,
    Accepted,
    Failed,
}

pub struct GenerationGuard {
    retries: u32,
    min_output_chars: usize,
}

impl GenerationGuard {
    pub fn new(retries: u32, min_output_chars: usize) -> Self {
        Self {
            retries,
            min_output_chars: min_output_chars.max(1),
        }
    }

    /// Total provider invocations never exceed `retries + 1`.
    pub async fn run(
        &self,
        provider: &dyn GenerationProvider,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationFailed> {
        let mut state = GuardState::Pending;
        let mut attempt: u32 = 0;
        let mut last_output: Option<String> = None;
        let mut last_error = None;

        loop {
            state = match state {
                GuardState::Pending => GuardState::Calling,

                GuardState::Calling => {
                    attempt += 1;
                    match provider.generate(prompt, params).await {
                        Ok(raw) => {
                            last_output = Some(raw.trim().to_string());
                            GuardState::Validating
                        }
                        Err(e) => {
                            warn!(
                                attempt,
                                budget = self.retries + 1,
                                error = %e,
                                "Generation call failed"
                            );
                            // auth failures are surfaced, never retried
                            let fatal = matches!(e, GenError::Auth(_));
                            last_error = Some(e);
                            if !fatal && attempt <= self.retries {
                                GuardState::Retrying
                            } else {
                                GuardState::Failed
                            }
                        }
                    }
                }

                GuardState::Validating => {
                    let ok = last_output
                        .as_deref()
                        .map(|raw| !raw.is_empty() && raw.chars().count() >= self.min_output_chars)
                        .unwrap_or(false);
                    if ok {
                        GuardState::Accepted
                    } else if attempt <= self.retries {
                        warn!(
                            attempt,
                            min_chars = self.min_output_chars,
                            "Output too short, retrying with the same prompt"
                        );
                        GuardState::Retrying
                    } else {
                        GuardState::Failed
                    }
                }

                GuardState::Retrying => {
                    tokio::time::sleep(Duration::from_millis(300 * attempt as u64)).await;
                    GuardState::Calling
                }

                GuardState::Accepted => {
                    info!(attempt, "Generation accepted");
                    return Ok(last_output.take().unwrap_or_default());
                }

                GuardState::Failed => {
                    return Err(GenerationFailed {
                        attempts: attempt,
                        last_output: last_output.take(),
                        last_error: last_error.take(),
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loglens_core::ProviderKind;
    use loglens_providers::GenError;
    use std::sync::atomic::{AtomicU32, Ordering};

    // stub provider: serves a fixed script of outputs, counting calls
    struct ScriptedProvider {
        outputs: Vec<Result<String, ()>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(outputs: Vec<Result<String, ()>>) -> Self {
            Self {
                outputs,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, GenError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.outputs.get(idx.min(self.outputs.len() - 1)) {
                Some(Ok(text)) => Ok(text.clone()),
                _ => Err(GenError::Backend("scripted failure".to_string())),
            }
        }

        fn model(&self) -> &str {
            "stub"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Ollama
        }
    }

    #[tokio::test]
    async fn test_retries_exactly_up_to_budget() {
        // always empty -> every attempt fails validation
        let provider = ScriptedProvider::new(vec![Ok(String::new())]);
        let guard = GenerationGuard::new(2, 10);

        let err = guard
            .run(&provider, "prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 3); // retries + 1
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_output.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_accepts_first_valid_output() {
        let provider =
            ScriptedProvider::new(vec![Ok("a sufficiently long analysis line".to_string())]);
        let guard = GenerationGuard::new(2, 10);

        let text = guard
            .run(&provider, "prompt", &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(text, "a sufficiently long analysis line");
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let provider = ScriptedProvider::new(vec![
            Ok("short".to_string()),
            Ok("long enough output to pass validation".to_string()),
        ]);
        let guard = GenerationGuard::new(2, 10);

        let text = guard
            .run(&provider, "prompt", &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert!(text.starts_with("long enough"));
    }

    #[tokio::test]
    async fn test_provider_errors_also_consume_budget() {
        let provider = ScriptedProvider::new(vec![Err(())]);
        let guard = GenerationGuard::new(1, 10);

        let err = guard
            .run(&provider, "prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 2);
        assert!(err.last_error.is_some());
        assert!(err.last_output.is_none());
    }

    struct AuthFailingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerationProvider for AuthFailingProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, GenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GenError::Auth("invalid key".to_string()))
        }

        fn model(&self) -> &str {
            "stub"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenaiCompat
        }
    }

    #[tokio::test]
    async fn test_auth_failure_is_never_retried() {
        let provider = AuthFailingProvider {
            calls: AtomicU32::new(0),
        };
        let guard = GenerationGuard::new(3, 10);

        let err = guard
            .run(&provider, "prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        // budget allows 4 attempts, but auth failures stop at the first
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err.last_error, Some(GenError::Auth(_))));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let provider = ScriptedProvider::new(vec![Ok(String::new())]);
        let guard = GenerationGuard::new(0, 10);

        let err = guard
            .run(&provider, "prompt", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 1);
        assert_eq!(err.attempts, 1);
    }
}
