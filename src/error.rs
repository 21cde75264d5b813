use crate::config::ConfigError;
use crate::verification::cipher::CipherError;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway call failed with status {status_code}: {message}")]
    Transport {
        status_code: u16,
        message: String,
        raw: Option<Value>,
    },
    #[error("unexpected payload shape: {detail}")]
    UnexpectedPayloadShape { detail: String, raw: Option<Value> },
    #[error("signature verification failed for {gateway}")]
    SignatureVerificationFailed { gateway: String },
    #[error("{gateway} does not support {operation}")]
    UnsupportedOperation {
        gateway: String,
        operation: &'static str,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GatewayError {
    pub fn shape(detail: impl Into<String>, raw: &Value) -> Self {
        GatewayError::UnexpectedPayloadShape {
            detail: detail.into(),
            raw: Some(raw.clone()),
        }
    }

    pub fn signature(gateway: &str) -> Self {
        GatewayError::SignatureVerificationFailed {
            gateway: gateway.to_string(),
        }
    }

    pub fn unsupported(gateway: &str, operation: &'static str) -> Self {
        GatewayError::UnsupportedOperation {
            gateway: gateway.to_string(),
            operation,
        }
    }

    /// Provider body or envelope attached to the failure, if any.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            GatewayError::Transport { raw, .. } => raw.as_ref(),
            GatewayError::UnexpectedPayloadShape { raw, .. } => raw.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("gateway `{0}` is not configured")]
    UnknownGateway(String),
    #[error("gateway `{gateway}` violates the adapter contract: {reason}")]
    ContractViolation { gateway: String, reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
