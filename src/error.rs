//! Error types for chaindeploy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Backend selection is missing or ambiguous, or an endpoint is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The ledger document could not be opened or committed.
    #[error("Contracts repository error: {0}")]
    RepositoryIo(String),

    #[error("Contract '{name}' is already deployed (use force to overwrite)")]
    DuplicateDeployment { name: String },

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Invalid address expansion: {name}")]
    UnresolvedReference { name: String },

    #[error("Confirmation of '{name}' failed: {reason}")]
    Confirmation { name: String, reason: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid constructor params: {0}")]
    InvalidParams(String),
}

impl DeployError {
    /// Configuration and ledger I/O failures abort the invocation outright.
    /// Every other kind leaves the ledger in a resumable state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeployError::Configuration(_) | DeployError::RepositoryIo(_)
        )
    }
}

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        DeployError::RepositoryIo(err.to_string())
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::InvalidParams(err.to_string())
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        DeployError::Rpc(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(DeployError::Configuration("both".into()).is_fatal());
        assert!(DeployError::RepositoryIo("disk".into()).is_fatal());
        assert!(!DeployError::UnresolvedReference { name: "Admin".into() }.is_fatal());
        assert!(!DeployError::Confirmation {
            name: "Token".into(),
            reason: "reverted".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_messages_name_the_contract() {
        let err = DeployError::DuplicateDeployment {
            name: "Token".into(),
        };
        assert!(err.to_string().contains("Token"));

        let err = DeployError::UnresolvedReference {
            name: "Unknown".into(),
        };
        assert_eq!(err.to_string(), "Invalid address expansion: Unknown");
    }
}
