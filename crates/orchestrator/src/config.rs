//! Orchestrator tunables loaded from environment variables.

use std::time::Duration;

/// Default cap on consecutive rate-limit resubmissions for one clip.
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Default number of consecutive non-terminal polls before the stuck
/// signal fires.
pub const DEFAULT_STUCK_AFTER_POLLS: u32 = 60;

/// Orchestrator configuration.
///
/// All fields have defaults suitable for production polling cadences;
/// tests shrink them.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Override the per-adapter polling interval. `None` uses each
    /// adapter's preferred interval.
    pub poll_interval: Option<Duration>,
    /// Template ids the strategy selector may choose from.
    pub available_templates: Vec<String>,
    /// Cap on rate-limit resubmissions per clip before the job fails.
    pub max_rate_limit_retries: u32,
    /// Consecutive non-terminal polls before [`JobEvent::Stuck`] fires.
    ///
    /// [`JobEvent::Stuck`]: crate::events::JobEvent::Stuck
    pub stuck_after_polls: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: None,
            available_templates: Vec::new(),
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            stuck_after_polls: DEFAULT_STUCK_AFTER_POLLS,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default        |
    /// |-------------------------------------|----------------|
    /// | `CLIPCHAIN_POLL_INTERVAL_SECS`      | adapter choice |
    /// | `CLIPCHAIN_TEMPLATES`               | (empty)        |
    /// | `CLIPCHAIN_MAX_RATE_LIMIT_RETRIES`  | `5`            |
    /// | `CLIPCHAIN_STUCK_AFTER_POLLS`       | `60`           |
    pub fn from_env() -> Self {
        let poll_interval = std::env::var("CLIPCHAIN_POLL_INTERVAL_SECS")
            .ok()
            .map(|v| {
                Duration::from_secs(
                    v.parse()
                        .expect("CLIPCHAIN_POLL_INTERVAL_SECS must be a valid u64"),
                )
            });

        let available_templates: Vec<String> = std::env::var("CLIPCHAIN_TEMPLATES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_rate_limit_retries: u32 = std::env::var("CLIPCHAIN_MAX_RATE_LIMIT_RETRIES")
            .unwrap_or_else(|_| DEFAULT_MAX_RATE_LIMIT_RETRIES.to_string())
            .parse()
            .expect("CLIPCHAIN_MAX_RATE_LIMIT_RETRIES must be a valid u32");

        let stuck_after_polls: u32 = std::env::var("CLIPCHAIN_STUCK_AFTER_POLLS")
            .unwrap_or_else(|_| DEFAULT_STUCK_AFTER_POLLS.to_string())
            .parse()
            .expect("CLIPCHAIN_STUCK_AFTER_POLLS must be a valid u32");

        Self {
            poll_interval,
            available_templates,
            max_rate_limit_retries,
            stuck_after_polls,
        }
    }
}
