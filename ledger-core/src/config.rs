use crate::error::LedgerError;
use config::{Config as Cfg, File};
use serde::de::DeserializeOwned;

/// Load a settings struct from the layered sources used across the
/// workspace: an optional `configuration` file, overridden by
/// `APP__`-prefixed environment variables (`APP__DATABASE__URL` maps to
/// `database.url`).
pub fn load<T: DeserializeOwned>() -> Result<T, LedgerError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Database connection settings shared by every store-backed binary.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}
