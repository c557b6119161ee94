//! Error types for the proxy.

use thiserror::Error;

use crate::translate::types::ChatErrorResponse;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Backend error: {message}")]
    Provider { message: String },

    #[error("Translation error: {message}")]
    Translation { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("The model '{model}' does not exist or is not served by this proxy")]
    ModelNotFound { model: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
        }
    }

    /// HTTP status reported to the client.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::ModelNotFound { .. } => 404,
            Self::Config { .. } | Self::Toml(_) => 500,
            Self::Provider { .. } | Self::Translation { .. } => 502,
        }
    }

    /// OpenAI-style error body for the client.
    pub fn to_response(&self) -> ChatErrorResponse {
        match self {
            Self::ModelNotFound { .. } => ChatErrorResponse::new(
                "invalid_request_error",
                self.to_string(),
                Some("model_not_found".into()),
            ),
            Self::InvalidRequest { .. } => ChatErrorResponse::invalid_request(self.to_string()),
            _ => ChatErrorResponse::api_error(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
