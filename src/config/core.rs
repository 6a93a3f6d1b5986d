use super::de;
use crate::parallel::{Capabilities, DispatchOptions};
use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// Repository-level config file looked up in the working directory.
pub const CONFIG_FILE: &str = "bpc.toml";

/// Prefix of the environment variables that override the config files.
pub const ENV_PREFIX: &str = "BPC_";

/// Dispatch settings shared by every tool built on this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Worker count; unset or `0` means one per CPU
    #[serde(deserialize_with = "de::jobs")]
    pub jobs: Option<usize>,

    /// Whether tasks write to a resource that needs the session lock
    #[serde(deserialize_with = "de::boolean_state")]
    pub shared: bool,

    /// Allow parallel execution at all
    #[serde(deserialize_with = "de::boolean_state")]
    pub parallel: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            shared: false,
            parallel: true,
        }
    }
}

impl DispatchConfig {
    /// Load defaults, `bpc.toml` in the working directory, then `BPC_*` variables.
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment().merge(Toml::file(CONFIG_FILE)).merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Like [`load`](Self::load) but with an explicit config file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::extract(
            Self::figment()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Embedded defaults only; callers may merge further providers.
    pub fn figment() -> Figment {
        Figment::new().merge(Toml::string(DEFAULT_CONFIG))
    }

    pub fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        tracing::trace!("dispatch config: {:?}", config);
        Ok(config)
    }

    pub fn into_options(self, capabilities: Capabilities) -> DispatchOptions {
        DispatchOptions::new(capabilities)
            .jobs(self.jobs)
            .shared(self.shared)
            .parallel(self.parallel)
    }
}
