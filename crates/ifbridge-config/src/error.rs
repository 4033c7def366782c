/// Errors that can occur while loading device configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    /// The embedded schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The document failed schema validation.
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    /// The document is not valid JSON or does not match the model.
    #[error("invalid configuration JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The document is well-formed but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Directive settings do not fit the interface they target.
    #[error("invalid settings for {command}: {message}")]
    InvalidSettings {
        command: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
