use thiserror::Error;
use tickwise_core::provider::{ProviderError, ProviderErrorKind};
use tickwise_core::RunStatus;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tickwise_core::ValidationError),

    #[error(transparent)]
    Config(#[from] tickwise_core::ConfigError),

    #[error(transparent)]
    Cache(#[from] tickwise_core::CacheError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) => 2,
            Self::Provider(error) if error.kind() == ProviderErrorKind::Unavailable => {
                status_exit_code(RunStatus::Failed)
            }
            Self::Provider(_) => status_exit_code(RunStatus::Partial),
            Self::Cache(_) | Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}

pub const fn status_exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Partial => 3,
        RunStatus::Failed => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_exit_codes() {
        let config = CliError::from(tickwise_core::ConfigError::EmptyTemplate);
        assert_eq!(config.exit_code(), 2);
        assert_eq!(
            CliError::from(ProviderError::unavailable("down")).exit_code(),
            4
        );
        assert_eq!(CliError::from(ProviderError::not_found("gone")).exit_code(), 3);
        assert_eq!(status_exit_code(RunStatus::Success), 0);
    }
}
