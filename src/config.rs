use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::issuance_opts::BindingMethod;

/// Wallet-side settings for issuance flows.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// # use openid4vci_holder::config::HolderConfig;
/// let config = HolderConfig::from_json(r#"{ "default_locale": "nl-NL" }"#).unwrap();
/// assert_eq!(config.default_locale.as_deref(), Some("nl-NL"));
/// assert_eq!(config.jwt_cryptographic_suite_preferences[0], "ES256");
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HolderConfig {
    /// Client id presented to issuers. The protocol client generates one when absent.
    pub client_id: Option<String>,
    /// Where the issuer's authorization server sends the user back to.
    pub redirect_uri: Option<Url>,
    pub default_locale: Option<String>,
    /// Credential formats the wallet accepts, in order of preference.
    pub vc_format_preferences: Vec<String>,
    pub jwt_cryptographic_suite_preferences: Vec<String>,
    pub jsonld_cryptographic_suite_preferences: Vec<String>,
    pub binding_method_preferences: Vec<BindingMethod>,
    pub schema_validation: SchemaValidation,
    /// Issuers under these prefixes are not resolvable from a registry when
    /// they issue conformance-test credentials.
    pub ledgerless_issuer_prefixes: Vec<String>,
    pub conformance_marker: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemaValidation {
    Always,
    #[default]
    WhenPresent,
    Never,
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            redirect_uri: None,
            default_locale: None,
            vc_format_preferences: vec![
                "jwt_vc_json".into(),
                "jwt_vc".into(),
                "jwt_vc_json-ld".into(),
                "ldp_vc".into(),
                "dc+sd-jwt".into(),
                "vc+sd-jwt".into(),
                "mso_mdoc".into(),
            ],
            jwt_cryptographic_suite_preferences: vec![
                "ES256".into(),
                "ES256K".into(),
                "EdDSA".into(),
            ],
            jsonld_cryptographic_suite_preferences: vec![
                "Ed25519Signature2018".into(),
                "EcdsaSecp256k1Signature2019".into(),
                "Ed25519Signature2020".into(),
                "JsonWebSignature2020".into(),
            ],
            binding_method_preferences: vec![
                BindingMethod::Did("key".into()),
                BindingMethod::Did("jwk".into()),
                BindingMethod::Jwk,
                BindingMethod::CoseKey,
            ],
            schema_validation: SchemaValidation::default(),
            ledgerless_issuer_prefixes: vec!["did:ebsi:".into()],
            conformance_marker: "vc:ebsi:conformance".into(),
        }
    }
}

impl HolderConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("unable to parse holder configuration")
    }

    pub fn is_ledgerless_issuer(&self, issuer: &str) -> bool {
        self.ledgerless_issuer_prefixes
            .iter()
            .any(|prefix| issuer.starts_with(prefix.as_str()))
    }
}
