use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use crate::issuance_opts::{BindingMethod, IssuanceOpt};

/// A holder key managed by the wallet's key management system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedIdentifier {
    /// Key reference in the key management system.
    pub kid: String,
    pub method: BindingMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Json>,
}

impl ManagedIdentifier {
    /// The subject the holder is known as to counterparties.
    pub fn subject(&self) -> &str {
        self.did.as_deref().unwrap_or(&self.kid)
    }
}

#[async_trait]
pub trait IdentifierProvider: Debug + Send + Sync {
    /// Get or create the key an issued credential will be bound to.
    async fn issuance_identifier(&self, opt: &IssuanceOpt) -> Result<ManagedIdentifier>;

    /// Get or create the key used to authenticate to `audience` during a first-party flow.
    async fn authentication_identifier(&self, audience: &Url) -> Result<ManagedIdentifier>;
}
