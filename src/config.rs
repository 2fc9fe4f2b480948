//! Configuration for the content pipeline.
//!
//! Configuration is read from a TOML file (conventionally `textbook.toml`). Every section and
//! every field is optional; an absent file yields [`TextbookConfig::default`].
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::error::ContentError;

pub const CONFIG_FILE_NAME: &str = "textbook.toml";

/// Environment variable consulted by the CLI when `--deployment` is not given.
pub const DEPLOYMENT_ENV_VAR: &str = "TEXTBOOK_DEPLOYMENT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextbookConfig {
    pub compiler: CompilerConfig,
    pub assets: AssetConfig,
    pub resolver: ResolverConfig,
}

/// What the compiler does with files that are neither markdown nor YAML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpaquePolicy {
    /// Skip them, counting them in the ignored stat.
    #[default]
    Ignore,
    /// Record them as opaque entries (size only) so they remain addressable.
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Content source root.
    pub root: PathBuf,
    /// Where the compiled artifact is written.
    pub output: PathBuf,
    pub opaque: OpaquePolicy,
    /// Write parsed YAML values into the artifact. When false the YAML is still validated at
    /// compile time but parsed again on first access.
    pub embed_parsed: bool,
    /// Descend into dot-files and dot-directories.
    pub include_hidden: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("content"),
            output: PathBuf::from("content.json"),
            opaque: OpaquePolicy::Ignore,
            embed_parsed: true,
            include_hidden: false,
        }
    }
}

/// Base paths assets are served under, per deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub dev_base_path: String,
    pub prod_base_path: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            dev_base_path: "/".to_string(),
            prod_base_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Concept maps to resolve, in order.
    pub concept_maps: Vec<String>,
    /// Upper bound on any single YAML fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concept_maps: Vec::new(),
            fetch_timeout_ms: 5_000,
        }
    }
}

impl ResolverConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl TextbookConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ContentError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(Self::default());
        }
        let content =
            read_to_string(path).map_err(|e| ContentError::from_io(format!("{path:?}"), e))?;
        let mut config: TextbookConfig = content.parse()?;
        // A relative content root is taken relative to the config file, not the cwd.
        if let Some(dir) = path.parent() {
            if config.compiler.root.is_relative() {
                config.compiler.root = dir.join(&config.compiler.root);
            }
            if config.compiler.output.is_relative() {
                config.compiler.output = dir.join(&config.compiler.output);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ContentError> {
        if self.resolver.fetch_timeout_ms == 0 {
            return Err(ContentError::Config(
                "resolver.fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for TextbookConfig {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: TextbookConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Deployment target, selecting which asset base path applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    #[default]
    Development,
    Production,
}

impl FromStr for Deployment {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Deployment::Development),
            "prod" | "production" => Ok(Deployment::Production),
            other => Err(ContentError::Config(format!(
                "unknown deployment '{other}', expected dev or prod"
            ))),
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deployment::Development => write!(f, "development"),
            Deployment::Production => write!(f, "production"),
        }
    }
}
