use ledger_core::config::DatabaseConfig;
use ledger_core::retry::RetryConfig;
use ledger_core::LedgerError;
use serde::Deserialize;

/// Engine settings, loaded from the layered configuration sources.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database: DatabaseConfig,
    /// Retry policy for document batches and running-balance
    /// recomputation.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_service_name() -> String {
    "ledger-engine".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    pub fn load() -> Result<Self, LedgerError> {
        ledger_core::config::load()
    }
}
