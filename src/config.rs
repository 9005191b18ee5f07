//! Process configuration (§4.7, §6 "Environment variables"). A single
//! [`Settings`] struct loaded from environment variables with documented
//! defaults, mirroring the pack's `clap(..., env = "...")` convention so the
//! same struct doubles as the CLI's implicit environment layer.

use std::time::Duration;

use clap::Parser;

/// Errors constructing validated [`Settings`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("QUEUE_HARD_TIMEOUT ({hard}) must be greater than QUEUE_SOFT_TIMEOUT ({soft})")]
    HardNotAfterSoft { soft: f64, hard: f64 },
    #[error("QUEUE_SOFT_TIMEOUT must be > 0, got {0}")]
    NonPositiveSoftTimeout(f64),
    #[error("MAX_CONCURRENT_THREADS must be >= 1, got {0}")]
    NonPositiveConcurrency(u32),
    #[error("MAX_AGENTS_PER_POINT must be >= 1, got {0}")]
    NonPositiveAgentsPerPoint(u32),
}

/// Process-wide settings, sourced from environment variables with the
/// defaults documented in §6/§4.7. Constructed via [`Settings::load`], which
/// additionally validates cross-field invariants that `clap`'s per-field
/// parsing cannot express.
#[derive(Parser, Debug, Clone)]
#[command(name = "enroute-settings", disable_help_flag = true, disable_version_flag = true)]
pub struct Settings {
    /// LLM provider used only by the optional Selection Policy tie-break collaborator.
    #[arg(long, env = "LLM_PROVIDER", default_value = "anthropic")]
    pub llm_provider: String,

    /// LLM model id, consumed only by the tie-break collaborator's configuration.
    #[arg(long, env = "LLM_MODEL", default_value = "claude-sonnet-4")]
    pub llm_model: String,

    /// LLM sampling temperature, consumed only by the tie-break collaborator's configuration.
    #[arg(long, env = "LLM_TEMPERATURE", default_value = "0.7")]
    pub llm_temperature: f64,

    /// Smart Dispatch Queue soft deadline in seconds (§4.3 `S_soft`).
    #[arg(long, env = "QUEUE_SOFT_TIMEOUT", default_value = "15.0")]
    pub queue_soft_timeout: f64,

    /// Smart Dispatch Queue hard deadline in seconds (§4.3 `S_hard`).
    #[arg(long, env = "QUEUE_HARD_TIMEOUT", default_value = "30.0")]
    pub queue_hard_timeout: f64,

    /// Per-Worker resilience envelope timeout in seconds.
    #[arg(long, env = "AGENT_TIMEOUT_SECONDS", default_value = "30.0")]
    pub agent_timeout_seconds: f64,

    /// Upper bound on total in-flight Worker calls; the Orchestrator's
    /// bounded-parallelism pool is sized `P = max / 4` (§4.4).
    #[arg(long, env = "MAX_CONCURRENT_THREADS", default_value = "12")]
    pub max_concurrent_threads: u32,

    /// Default expected Worker count `E` per Waypoint (§4.3) when not
    /// overridden by registry enumeration.
    #[arg(long, env = "MAX_AGENTS_PER_POINT", default_value = "4")]
    pub max_agents_per_point: u32,

    /// Minimum log severity.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Optional log file path; unset means stderr-only.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<String>,
}

impl Settings {
    /// Load settings from environment variables (falling back to the
    /// documented defaults), then validate cross-field invariants.
    pub fn load() -> Result<Self, SettingsError> {
        // `try_parse_from` with only the program name means every field is
        // sourced from its `env` binding or default — no positional argv
        // parsing is involved, matching this struct's role as a pure
        // environment-variable carrier rather than a CLI surface.
        let settings = Settings::parse_from(std::iter::once("enroute-settings".to_string()));
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.queue_soft_timeout <= 0.0 {
            return Err(SettingsError::NonPositiveSoftTimeout(self.queue_soft_timeout));
        }
        if self.queue_hard_timeout <= self.queue_soft_timeout {
            return Err(SettingsError::HardNotAfterSoft {
                soft: self.queue_soft_timeout,
                hard: self.queue_hard_timeout,
            });
        }
        if self.max_concurrent_threads < 1 {
            return Err(SettingsError::NonPositiveConcurrency(self.max_concurrent_threads));
        }
        if self.max_agents_per_point < 1 {
            return Err(SettingsError::NonPositiveAgentsPerPoint(self.max_agents_per_point));
        }
        Ok(())
    }

    pub fn soft_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.queue_soft_timeout)
    }

    pub fn hard_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.queue_hard_timeout)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.agent_timeout_seconds)
    }

    /// The Orchestrator's bounded-parallelism pool size, `P = max / 4` (§4.4),
    /// never less than 1.
    pub fn orchestrator_parallelism(&self) -> usize {
        ((self.max_concurrent_threads / 4).max(1)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings::parse_from(std::iter::once("enroute-settings".to_string()))
    }

    #[test]
    fn defaults_validate_cleanly() {
        assert!(defaults().validate().is_ok());
    }

    #[test]
    fn rejects_hard_not_after_soft() {
        let mut settings = defaults();
        settings.queue_hard_timeout = settings.queue_soft_timeout;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::HardNotAfterSoft { .. }));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut settings = defaults();
        settings.max_concurrent_threads = 0;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::NonPositiveConcurrency(0)));
    }

    #[test]
    fn orchestrator_parallelism_is_max_over_four_floored_at_one() {
        let mut settings = defaults();
        settings.max_concurrent_threads = 2;
        assert_eq!(settings.orchestrator_parallelism(), 1);
        settings.max_concurrent_threads = 12;
        assert_eq!(settings.orchestrator_parallelism(), 3);
    }

    #[test]
    fn env_vars_override_defaults() {
        std::env::set_var("ENROUTE_TEST_QUEUE_SOFT_TIMEOUT_PROBE", "1");
        std::env::remove_var("ENROUTE_TEST_QUEUE_SOFT_TIMEOUT_PROBE");
        std::env::set_var("QUEUE_SOFT_TIMEOUT", "5.0");
        std::env::set_var("QUEUE_HARD_TIMEOUT", "10.0");
        let settings = Settings::load().unwrap();
        assert_eq!(settings.queue_soft_timeout, 5.0);
        assert_eq!(settings.queue_hard_timeout, 10.0);
        std::env::remove_var("QUEUE_SOFT_TIMEOUT");
        std::env::remove_var("QUEUE_HARD_TIMEOUT");
    }
}
