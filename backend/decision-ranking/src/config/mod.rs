use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "DECISION_RANKING_";

/// Runtime settings for the rank processor.
///
/// Loaded from `DECISION_RANKING_*` environment variables (and `.env` in
/// local development), e.g. `DECISION_RANKING_ENGINE_TIMEOUT_MS=2000`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RankConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Upper bound on a single engine call
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,

    /// Applied when a request does not say whether to defer activation
    #[serde(default)]
    pub defer_activation: bool,
}

fn default_service_name() -> String {
    "decision-ranking".to_string()
}

fn default_engine_timeout_ms() -> u64 {
    5000
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            engine_timeout_ms: default_engine_timeout_ms(),
            defer_activation: false,
        }
    }
}

impl RankConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed(ENV_PREFIX).from_env()
    }

    /// Load from an explicit set of variables; used by tests
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_defer_activation(mut self, defer: bool) -> Self {
        self.defer_activation = defer;
        self
    }
}
