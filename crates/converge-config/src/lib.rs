pub mod error;

pub use error::*;

use converge_core::{Classifier, OperationKind, PollSpec, TransientRule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "CONVERGE_CONFIG_PATH";
const CANDIDATES: [&str; 4] = [
    "converge.local.yaml",
    ".converge.local.yaml",
    "converge.yaml",
    ".converge.yaml",
];

/// Engine settings read from `converge.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wait timings per operation kind
    #[serde(default)]
    pub waits: WaitDefaults,

    /// Keep the built-in attach/detach race rule
    #[serde(default = "default_true")]
    pub attach_detach_retry: bool,

    /// Extra classifier rules, evaluated in order
    #[serde(default)]
    pub transient_rules: Vec<TransientRule>,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            waits: WaitDefaults::default(),
            attach_detach_retry: true,
            transient_rules: Vec::new(),
        }
    }
}

/// Wait timings; unset kinds fall back to `PollSpec::default()`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitDefaults {
    #[serde(default)]
    pub create: Option<PollSpec>,
    #[serde(default)]
    pub update: Option<PollSpec>,
    #[serde(default)]
    pub delete: Option<PollSpec>,
}

impl EngineConfig {
    /// Wait spec for `kind`
    pub fn wait_for(&self, kind: OperationKind) -> PollSpec {
        let configured = match kind {
            OperationKind::Create => &self.waits.create,
            OperationKind::Update => &self.waits.update,
            OperationKind::Delete => &self.waits.delete,
        };
        configured.clone().unwrap_or_default()
    }

    /// Classifier built from the configured rules
    pub fn classifier(&self) -> Classifier {
        let base = if self.attach_detach_retry {
            Classifier::default()
        } else {
            Classifier::empty()
        };
        base.with_rules(self.transient_rules.iter().cloned())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let waits = [
            ("create", &self.waits.create),
            ("update", &self.waits.update),
            ("delete", &self.waits.delete),
        ];
        for (kind, spec) in waits {
            if let Some(spec) = spec {
                spec.validate().map_err(|e| ConfigError::Invalid {
                    path: path.display().to_string(),
                    message: format!("waits.{}: {}", kind, e),
                })?;
            }
        }
        Ok(())
    }
}

/// Per-user config directory, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("converge");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the engine config file
///
/// Search order:
/// 1. `CONVERGE_CONFIG_PATH`
/// 2. current directory: converge.local.yaml, .converge.local.yaml, converge.yaml, .converge.yaml
/// 3. the same names under `./.converge/`
/// 4. `~/.config/converge/converge.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points to a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".converge");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("converge").join("converge.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load and validate the config at `path`
pub fn load(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = if content.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml::from_str(&content)?
    };
    config.validate(path)?;

    tracing::debug!(
        "Loaded engine config from {} ({} extra rules)",
        path.display(),
        config.transient_rules.len()
    );
    Ok(config)
}

/// Load the discovered config, or defaults when there is none
pub fn load_or_default() -> Result<EngineConfig> {
    match find_config_file() {
        Ok(path) => load(path),
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("No engine config found, using defaults");
            Ok(EngineConfig::default())
        }
        Err(e) => Err(e),
    }
}
