use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(bpindex_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(bpindex_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(bpindex_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("Invalid duration for `{key}`: {value}")]
    #[diagnostic(
        code(bpindex_config::invalid_duration),
        help("Use a duration like `500ms`, `30s`, `5m` or `1h30m`")
    )]
    InvalidDuration { key: String, value: String },

    #[error("Invalid value for `{key}`: {reason}")]
    #[diagnostic(code(bpindex_config::invalid_value))]
    InvalidValue { key: String, reason: String },

    #[error("Path is empty")]
    #[diagnostic(code(bpindex_config::empty_path))]
    EmptyPath,

    #[error("IO error: {0}")]
    #[diagnostic(code(bpindex_config::io))]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(bpindex_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(bpindex_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_duration_message() {
        let err = ConfigError::InvalidDuration {
            key: "fetch_timeout".to_string(),
            value: "soon".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fetch_timeout"));
        assert!(msg.contains("soon"));
    }

    #[test]
    fn test_already_exists_message() {
        let err = ConfigError::ConfigAlreadyExists;
        assert_eq!(err.to_string(), "Configuration file already exists");
    }
}
