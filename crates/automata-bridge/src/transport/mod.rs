//! Rollup transport seam.
//!
//! [`RollupRpc`] is everything the account session needs from the rollup:
//! the account nonce, the account state, the global config, and command
//! submission. [`HttpRollupRpc`] implements it against the mini-rollup REST
//! surface; tests substitute their own implementations.

mod http;

pub use http::{HttpRollupRpc, JobPolling};

use async_trait::async_trait;
use serde_json::Value;

use crate::{command::Command, identity::ProcessingKey};

/// Calls the account session makes against the rollup.
#[async_trait]
pub trait RollupRpc: Send + Sync {
    /// Current sequence number of the account owned by `key`.
    async fn nonce(&self, key: &ProcessingKey) -> Result<u64, RpcError>;

    /// Remote state of the account owned by `key`.
    async fn state(&self, key: &ProcessingKey) -> Result<Value, RpcError>;

    /// Global rollup configuration.
    async fn config(&self) -> Result<Value, RpcError>;

    /// Signs `command` with `key`, submits it, and waits for the result.
    async fn send_transaction(
        &self,
        command: &Command,
        key: &ProcessingKey,
    ) -> Result<Value, RpcError>;
}

/// Errors that can occur when talking to the rollup.
#[derive(Debug)]
pub enum RpcError {
    /// HTTP request failed
    Request(String),
    /// Non-2xx HTTP status
    Http(u16),
    /// Failed to parse response
    Parse(String),
    /// Command was rejected by the rollup
    Rejected(String),
    /// Submitted job did not finish within the polling budget
    JobTimeout(String),
    /// Processing key could not be used to sign
    Key(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "request failed: {}", e),
            Self::Http(status) => write!(f, "HTTP error: {}", status),
            Self::Parse(e) => write!(f, "parse error: {}", e),
            Self::Rejected(reason) => write!(f, "command rejected: {}", reason),
            Self::JobTimeout(job) => write!(f, "job {} did not finish in time", job),
            Self::Key(e) => write!(f, "invalid processing key: {}", e),
        }
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_display() {
        let err = RpcError::Request("timeout".to_string());
        assert_eq!(err.to_string(), "request failed: timeout");

        let err = RpcError::Http(500);
        assert_eq!(err.to_string(), "HTTP error: 500");

        let err = RpcError::Rejected("PlayerNotExist".to_string());
        assert_eq!(err.to_string(), "command rejected: PlayerNotExist");

        let err = RpcError::JobTimeout("17".to_string());
        assert_eq!(err.to_string(), "job 17 did not finish in time");
    }
}
