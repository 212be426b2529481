use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - CONVERGE_CONFIG_PATH\n\
        - current directory: converge.local.yaml, .converge.local.yaml, converge.yaml, .converge.yaml\n\
        - ./.converge/\n\
        - ~/.config/converge/converge.yaml"
    )]
    ConfigFileNotFound,

    #[error("Invalid config in {path}: {message}")]
    Invalid { path: String, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
