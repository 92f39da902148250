use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::{metadata::ServerMetadata, offer::CredentialOffer};

/// Serialized checkpoint of the protocol client.
///
/// This is the only state shared between the issuance machine, the
/// first-party sub-machine and the protocol client. It is passed by value and
/// is what gets persisted to resume a flow after a restart. Fields the
/// holder does not interpret are kept in `other`, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub credential_issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_offer: Option<CredentialOffer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_metadata: Option<ServerMetadata>,
    /// Authorization request URL, prepared only when the offer grants `authorization_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<Url>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl ClientState {
    pub fn new(credential_issuer: impl Into<String>) -> Self {
        Self {
            credential_issuer: credential_issuer.into(),
            credential_offer: None,
            client_id: None,
            endpoint_metadata: None,
            authorization_url: None,
            other: Map::new(),
        }
    }

    pub fn export(&self) -> Result<String> {
        serde_json::to_string(self).context("unable to serialize client state")
    }

    pub fn import(state: &str) -> Result<Self> {
        serde_json::from_str(state).context("unable to deserialize client state")
    }

    /// Authorization endpoint the user must be sent to, if this offer needs one.
    pub fn authorization_endpoint(&self) -> Option<&Url> {
        self.authorization_url.as_ref()
    }

    pub fn user_pin_required(&self) -> bool {
        self.credential_offer
            .as_ref()
            .map(CredentialOffer::user_pin_required)
            .unwrap_or(false)
    }

    /// The issuer URL contacts are correlated with; prefers the offer's issuer.
    pub fn issuer(&self) -> &str {
        self.credential_offer
            .as_ref()
            .map(|offer| offer.credential_issuer.as_str())
            .unwrap_or(self.credential_issuer.as_str())
    }
}
