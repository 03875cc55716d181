use thiserror::Error;

/// Top-level error type for the fleet/supervisor/workspace/proxy core.
///
/// One variant per error kind named in the design: each maps to a specific
/// HTTP status at the daemon boundary and to a specific per-Tentacle status
/// transition internally. Lifecycle code logs and swallows these rather than
/// propagating past a single Tentacle's own operation.
#[derive(Debug, Error)]
pub enum TentacleError {
    #[error("config error: {0}")]
    Config(String),

    #[error("hosting api error: {0}")]
    HostingApi(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("workspace busy: {0}")]
    Busy(String),

    #[error("command render error: unknown placeholder '{placeholder}' in template '{template}'")]
    CommandRender { placeholder: String, template: String },

    #[error("build error: {0}")]
    Build(String),

    #[error("spawn error: {0}")]
    Spawn(String),

    #[error("error proxying: {0}")]
    Proxy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TentacleError>;
