//! Runtime configuration
//!
//! Everything is read once from the environment at startup and passed
//! explicitly into the constructors that need it.

use crate::llm::LlmErrorKind;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Provider credentials and endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl LlmConfig {
    /// Load from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}

/// Bounded retry with exponential backoff for provider calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per model step, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 2,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    ///
    /// Malformed responses are retried straight away. Unavailability and
    /// rate limiting back off exponentially, and a provider-supplied
    /// `retry_after` wins when it is longer, still capped by `max_backoff`.
    pub fn delay_for(
        &self,
        kind: LlmErrorKind,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Duration {
        if !kind.uses_backoff() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        let backoff = self.initial_backoff.saturating_mul(factor);
        let delay = match retry_after {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        };
        delay.min(self.max_backoff)
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    /// Maximum entries into the model-thinking state per run
    pub max_steps: u32,
    /// Token budget for the history sent to the model
    pub context_tokens: usize,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
    pub retry: RetryPolicy,
    pub db_path: String,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
            },
            max_steps: 8,
            context_tokens: 16_000,
            llm_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            db_path: default_db_path(),
            port: 8000,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm: LlmConfig::from_env(),
            max_steps: env_parse("HOUSE_AGENT_MAX_STEPS").unwrap_or(defaults.max_steps),
            context_tokens: env_parse("HOUSE_AGENT_CONTEXT_TOKENS")
                .unwrap_or(defaults.context_tokens),
            llm_timeout: env_parse("HOUSE_AGENT_LLM_TIMEOUT_SECS")
                .map_or(defaults.llm_timeout, Duration::from_secs),
            tool_timeout: env_parse("HOUSE_AGENT_TOOL_TIMEOUT_SECS")
                .map_or(defaults.tool_timeout, Duration::from_secs),
            retry: RetryPolicy {
                // Counts the first call too
                max_attempts: env_parse("HOUSE_AGENT_RETRY_ATTEMPTS")
                    .unwrap_or(defaults.retry.max_attempts),
                initial_backoff: env_parse("HOUSE_AGENT_RETRY_BASE_MS")
                    .map_or(defaults.retry.initial_backoff, Duration::from_millis),
                max_backoff: env_parse("HOUSE_AGENT_RETRY_MAX_MS")
                    .map_or(defaults.retry.max_backoff, Duration::from_millis),
                multiplier: defaults.retry.multiplier,
            },
            db_path: std::env::var("HOUSE_AGENT_DB_PATH").unwrap_or(defaults.db_path),
            port: env_parse("HOUSE_AGENT_PORT").unwrap_or(defaults.port),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.house-agent/house_agent.db")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2,
        };
        let kind = LlmErrorKind::Unavailable;
        assert_eq!(policy.delay_for(kind, 1, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for(kind, 2, None), Duration::from_millis(200));
        assert_eq!(policy.delay_for(kind, 3, None), Duration::from_millis(400));
        assert_eq!(policy.delay_for(kind, 4, None), Duration::from_millis(500));
        assert_eq!(policy.delay_for(kind, 40, None), Duration::from_millis(500));
    }

    #[test]
    fn retry_after_hint_extends_delay() {
        let policy = RetryPolicy::default();
        let hint = Some(Duration::from_secs(5));
        assert_eq!(
            policy.delay_for(LlmErrorKind::RateLimited, 1, hint),
            Duration::from_secs(5)
        );
        let huge = Some(Duration::from_secs(600));
        assert_eq!(
            policy.delay_for(LlmErrorKind::RateLimited, 1, huge),
            policy.max_backoff
        );
    }

    #[test]
    fn malformed_response_retries_without_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(LlmErrorKind::MalformedResponse, 2, None),
            Duration::ZERO
        );
    }
}
