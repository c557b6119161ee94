//! Model name resolution and the `/v1/models` listing.
//!
//! Clients send whatever model names their UI offers. A name is served only
//! if the config maps it to a backend model or allow-lists it for direct
//! passthrough; anything else is rejected with `model_not_found` rather than
//! guessed at.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::translate::types::{ModelList, ModelObject};
use std::collections::BTreeSet;

/// How a client model name was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedModel {
    /// Found in the `[models]` mapping.
    Mapped(String),
    /// Listed in `allowed_models`, forwarded unchanged.
    Passthrough(String),
}

impl ResolvedModel {
    pub fn backend_name(&self) -> &str {
        match self {
            Self::Mapped(name) | Self::Passthrough(name) => name,
        }
    }
}

/// Resolve the backend model for a client-facing model name.
///
/// # Errors
/// Returns `ProxyError::ModelNotFound` when the name is neither mapped nor allow-listed.
pub fn resolve_model(config: &ProxyConfig, requested: &str) -> Result<ResolvedModel> {
    if let Some(target) = config.models.get(requested) {
        return Ok(ResolvedModel::Mapped(target.clone()));
    }

    if config.allowed_models.iter().any(|m| m == requested) {
        return Ok(ResolvedModel::Passthrough(requested.to_string()));
    }

    Err(ProxyError::model_not_found(requested))
}

/// Every model name a client may request, sorted and deduplicated.
#[must_use]
pub fn served_model_names(config: &ProxyConfig) -> Vec<String> {
    config
        .models
        .keys()
        .chain(config.allowed_models.iter())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Build the OpenAI-style model list.
#[must_use]
pub fn model_list(config: &ProxyConfig, created: i64) -> ModelList {
    let data = served_model_names(config)
        .into_iter()
        .map(|id| ModelObject {
            id,
            object: "model".to_string(),
            created,
            owned_by: config.backend.name.clone(),
        })
        .collect();

    ModelList {
        object: "list".to_string(),
        data,
    }
}
