use crate::error::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};

/// Column-hook configuration.
///
/// Defaults: column hooks enabled, at most 1000 records re-fetched per call,
/// warn when a call skips column hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HookConfig {
    /// Master switch for column-change detection.
    pub enable_column_hooks: bool,
    /// Largest "before" snapshot that is re-fetched for change detection.
    pub max_refetch: usize,
    /// Log a warning when a call exceeds `max_refetch`.
    pub warn_on_skip: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enable_column_hooks: true,
            max_refetch: 1000,
            warn_on_skip: true,
        }
    }
}

impl HookConfig {
    pub const ENV_ENABLE_COLUMN_HOOKS: &'static str = "FLARE_ENABLE_COLUMN_HOOKS";
    pub const ENV_MAX_REFETCH: &'static str = "FLARE_MAX_REFETCH";
    pub const ENV_WARN_ON_SKIP: &'static str = "FLARE_WARN_ON_SKIP";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set the re-fetch ceiling.
    pub fn with_max_refetch(mut self, max_refetch: usize) -> Self {
        self.max_refetch = max_refetch;
        self
    }

    pub fn enable_column_hooks(mut self) -> Self {
        self.enable_column_hooks = true;
        self
    }

    pub fn disable_column_hooks(mut self) -> Self {
        self.enable_column_hooks = false;
        self
    }

    pub fn with_warn_on_skip(mut self, warn: bool) -> Self {
        self.warn_on_skip = warn;
        self
    }

    /// Read overrides from `FLARE_*` environment variables; unset variables keep defaults.
    pub fn from_env() -> OrmResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Like [`HookConfig::from_env`], reading variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(Self::ENV_ENABLE_COLUMN_HOOKS) {
            config.enable_column_hooks = parse_bool(Self::ENV_ENABLE_COLUMN_HOOKS, &raw)?;
        }
        if let Some(raw) = lookup(Self::ENV_MAX_REFETCH) {
            config.max_refetch = raw.trim().parse().map_err(|_| {
                OrmError::Config(format!(
                    "{} must be a non-negative integer, got {raw:?}",
                    Self::ENV_MAX_REFETCH
                ))
            })?;
        }
        if let Some(raw) = lookup(Self::ENV_WARN_ON_SKIP) {
            config.warn_on_skip = parse_bool(Self::ENV_WARN_ON_SKIP, &raw)?;
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> OrmResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(OrmError::Config(format!("{key} must be a boolean, got {raw:?}"))),
    }
}
