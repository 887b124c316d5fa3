//! WhatIf Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::credentials::CredentialError;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Generation Errors
    // =========================================================================
    /// Missing key, missing idea, unknown script type or bad duration.
    /// The message is already user-facing.
    #[error("{0}")]
    ConfigurationError(String),

    /// The request never reached the provider (DNS, TLS, connection reset).
    #[error("Network request failed: {0}")]
    TransportError(String),

    /// Non-success HTTP status or an API-level error payload.
    #[error("Provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },

    /// Well-formed JSON that is missing required keys or has wrong types.
    #[error("{0}")]
    ValidationError(String),

    /// Response content is not valid JSON.
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    /// Another generation is still in flight on the same gateway.
    #[error("Đang tạo kịch bản, vui lòng chờ yêu cầu hiện tại hoàn tất.")]
    Busy,

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Credential store error: {0}")]
    CredentialError(#[from] CredentialError),

    #[error("Settings error: {0}")]
    SettingsError(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Short, stable label for logs and machine-readable CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationError(_) => "configuration",
            Self::TransportError(_) => "transport",
            Self::ProviderError { .. } => "provider",
            Self::ValidationError(_) => "validation",
            Self::ParseError(_) => "parse",
            Self::Busy => "busy",
            Self::Timeout(_) => "timeout",
            Self::CredentialError(_) => "credential",
            Self::SettingsError(_) => "settings",
            Self::IoError(_) => "io",
            Self::JsonError(_) => "json",
            Self::Internal(_) => "internal",
        }
    }
}
