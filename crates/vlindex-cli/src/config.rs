use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use vlindex_core::{DescriptorSpec, IndexType, Metric};

const CONFIG_ENV: &str = "VLINDEX_CONFIG";

/// CLI configuration: an optional TOML file, then `VLINDEX_*` environment
/// variables on top, then built-in defaults for anything left unset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Descriptor version for new indexes and pairwise matching.
    pub descriptor_version: u32,
    /// Vector length; defaults to the built-in length of `descriptor_version`.
    pub descriptor_length: Option<usize>,
    pub metric: Metric,
    /// Default number of neighbours returned by `search`.
    pub max_count: usize,
    /// Layout used by `create` when `--format` is not given.
    pub default_format: IndexType,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            descriptor_version: 54,
            descriptor_length: None,
            metric: Metric::L2,
            max_count: 1,
            default_format: IndexType::Dynamic,
        }
    }
}

impl Config {
    /// Load from `path` (or `$VLINDEX_CONFIG`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        tracing::debug!(?config, "configuration resolved");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("invalid configuration file {}", path.display()))
    }

    /// Override fields from `VLINDEX_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env_parse(&lookup, "VLINDEX_DESCRIPTOR_VERSION") {
            self.descriptor_version = v;
        }
        if let Some(v) = env_parse(&lookup, "VLINDEX_DESCRIPTOR_LENGTH") {
            self.descriptor_length = Some(v);
        }
        if let Some(v) = env_parse(&lookup, "VLINDEX_METRIC") {
            self.metric = v;
        }
        if let Some(v) = env_parse(&lookup, "VLINDEX_MAX_COUNT") {
            self.max_count = v;
        }
        if let Some(v) = env_parse(&lookup, "VLINDEX_DEFAULT_FORMAT") {
            self.default_format = v;
        }
    }

    /// Descriptor contract for new indexes and matching.
    pub fn spec(&self) -> vlindex_core::Result<DescriptorSpec> {
        match self.descriptor_length {
            Some(length) => DescriptorSpec::new(self.descriptor_version, length, self.metric),
            None => Ok(DescriptorSpec::known(self.descriptor_version)?.with_metric(self.metric)),
        }
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
