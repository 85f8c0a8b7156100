use thiserror::Error;

/// Startup failures. Everything that happens inside a tick is absorbed
/// and logged instead of surfacing here.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },
}
