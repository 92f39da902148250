//! Counterparties the wallet has dealt with, and how credentials are linked to them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRole {
    Issuer,
    Verifier,
    Holder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityOrigin {
    /// The identity belongs to the wallet user.
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationIdentifierType {
    Did,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIdentifier {
    #[serde(rename = "type")]
    pub kind: CorrelationIdentifierType,
    pub correlation_id: String,
}

impl CorrelationIdentifier {
    /// Classify a correlation id: DIDs are kept as such, anything else is treated as a URL.
    pub fn for_correlation_id(correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        let kind = if correlation_id.starts_with("did:") {
            CorrelationIdentifierType::Did
        } else {
            CorrelationIdentifierType::Url
        };
        Self {
            kind,
            correlation_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub alias: String,
    pub origin: IdentityOrigin,
    pub roles: Vec<CredentialRole>,
    pub identifier: CorrelationIdentifier,
}

impl Identity {
    pub fn correlation_id(&self) -> &str {
        &self.identifier.correlation_id
    }
}

/// A contact (organization or person) with the identities it is known under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub identities: Vec<Identity>,
}

impl Party {
    pub fn has_identity(&self, correlation_id: &str) -> bool {
        self.identities
            .iter()
            .any(|identity| identity.correlation_id() == correlation_id)
    }
}

/// Lookup criteria for [ContactStore](crate::provider::store::ContactStore).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ContactFilter {
    pub fn by_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            display_name: None,
        }
    }

    pub fn matches(&self, party: &Party) -> bool {
        let correlation = self
            .correlation_id
            .as_deref()
            .map(|id| party.has_identity(id))
            .unwrap_or(true);
        let name = self
            .display_name
            .as_deref()
            .map(|name| party.display_name == name)
            .unwrap_or(true);
        correlation && name
    }
}
