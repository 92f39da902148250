use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Endpoints and issuer metadata as resolved by the protocol client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Present when the issuer supports first-party (challenge based) authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_challenge_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_issuer_metadata: Option<CredentialIssuerMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialIssuerMetadata {
    pub credential_issuer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<IssuerDisplay>,
    #[serde(default)]
    pub credential_configurations_supported: BTreeMap<String, CredentialConfigurationSupported>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfigurationSupported {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cryptographic_binding_methods_supported: Vec<String>,
    #[serde(
        default,
        alias = "cryptographic_suites_supported",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub credential_signing_alg_values_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<CredentialDefinition>,
    /// SD-JWT VC type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    /// mdoc document type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<CredentialDisplay>,
    /// Claim metadata, either keyed by claim name or as a list of claim paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Json>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialDefinition {
    #[serde(rename = "type", default)]
    pub types: Vec<String>,
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Json>,
    #[serde(
        rename = "credentialSubject",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential_subject: Option<Json>,
}

impl CredentialConfigurationSupported {
    /// Credential types, whatever the format calls them.
    pub fn types(&self) -> Vec<String> {
        if let Some(definition) = &self.credential_definition {
            if !definition.types.is_empty() {
                return definition.types.clone();
            }
        }
        self.vct
            .iter()
            .chain(self.doctype.iter())
            .cloned()
            .collect()
    }

    /// Claim display metadata, wherever this configuration keeps it.
    pub fn claims_metadata(&self) -> Option<&Json> {
        self.claims.as_ref().or_else(|| {
            self.credential_definition
                .as_ref()?
                .credential_subject
                .as_ref()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(alias = "url", default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDisplay {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

impl ServerMetadata {
    /// Issuer display name for `locale`, falling back to any named display.
    pub fn issuer_name(&self, locale: Option<&str>) -> Option<&str> {
        let displays = &self.credential_issuer_metadata.as_ref()?.display;
        displays
            .iter()
            .find(|display| locale.is_some() && display.locale.as_deref() == locale)
            .or_else(|| displays.iter().find(|display| display.name.is_some()))
            .and_then(|display| display.name.as_deref())
    }
}
