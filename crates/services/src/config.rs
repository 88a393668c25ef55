use std::env;
use std::time::Duration;

use url::Url;

use crate::autosave::AutoSavePolicy;
use crate::error::EngineConfigError;

const DEFAULT_TICK_MILLIS: u64 = 1_000;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

/// Connection settings of the remote session API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Runtime knobs of the exam engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub autosave: AutoSavePolicy,
    pub tick_every: Duration,
    pub remote: Option<RemoteConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autosave: AutoSavePolicy::default(),
            tick_every: Duration::from_millis(DEFAULT_TICK_MILLIS),
            remote: None,
        }
    }
}

impl EngineConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `EngineConfigError` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, EngineConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns `EngineConfigError` if a variable is set but malformed.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EngineConfigError> {
        let defaults = AutoSavePolicy::default();
        let save_secs = read_positive(&lookup, "EXAM_AUTOSAVE_SECS")?
            .map_or(defaults.save_every, Duration::from_secs);
        let sync_secs = read_positive(&lookup, "EXAM_SYNC_SECS")?
            .map_or(defaults.sync_every, Duration::from_secs);
        let tick_every = Duration::from_millis(
            read_positive(&lookup, "EXAM_TICK_MILLIS")?.unwrap_or(DEFAULT_TICK_MILLIS),
        );

        let remote = match lookup("EXAM_REMOTE_URL").filter(|v| !v.trim().is_empty()) {
            None => None,
            Some(raw) => {
                let base_url = Url::parse(raw.trim()).map_err(|source| {
                    EngineConfigError::InvalidUrl {
                        name: "EXAM_REMOTE_URL",
                        source,
                    }
                })?;
                let token = lookup("EXAM_REMOTE_TOKEN").filter(|v| !v.trim().is_empty());
                let timeout = Duration::from_secs(
                    read_positive(&lookup, "EXAM_REMOTE_TIMEOUT_SECS")?
                        .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
                );
                Some(RemoteConfig {
                    base_url,
                    token,
                    timeout,
                })
            }
        };

        Ok(Self {
            autosave: AutoSavePolicy {
                save_every: save_secs,
                sync_every: sync_secs,
            },
            tick_every,
            remote,
        })
    }
}

fn read_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, EngineConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(EngineConfigError::InvalidNumber { name, raw }),
    }
}
