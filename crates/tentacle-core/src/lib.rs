pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod git_client;
pub mod hosting;
pub mod html_rewrite;
pub mod process;
pub mod template;
pub mod tentacle;
pub mod workspace;

pub use error::{Result, TentacleError};

use tracing::info;

/// Initialise a default tracing subscriber for the library consumer.
///
/// Call this once at program start. Uses `RUST_LOG` env var for filtering,
/// defaulting to `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).init();

    info!("tentacle-core tracing initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TentacleError::Config("missing field".into());
        assert_eq!(err.to_string(), "config error: missing field");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let tentacle_err: TentacleError = io_err.into();
        assert!(matches!(tentacle_err, TentacleError::Io(_)));
    }
}
