use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Which checks a verification engine should run besides the proof itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicies {
    pub credential_status: bool,
    pub expiration_date: bool,
    pub issuance_date: bool,
}

impl VerificationPolicies {
    /// Policies used when accepting a freshly issued credential: proof only.
    pub fn issuance() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn verified() -> Self {
        Self {
            verified: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            error: Some(error.into()),
        }
    }
}

/// Low-level signature verification.
#[async_trait]
pub trait CredentialVerifier: Debug + Send + Sync {
    /// Verify a JWT (as a JSON string) or JSON-LD credential.
    async fn verify_credential(
        &self,
        credential: &Json,
        policies: &VerificationPolicies,
    ) -> Result<VerificationResult>;

    /// Verify a compact SD-JWT, disclosures included.
    async fn verify_sd_jwt(&self, credential: &str) -> Result<VerificationResult>;

    /// Verify the issuer signature of a base64url encoded `IssuerSigned` structure.
    async fn verify_mdoc_issuer_signature(&self, credential: &str) -> Result<VerificationResult>;
}
