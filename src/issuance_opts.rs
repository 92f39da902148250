//! Per-configuration choice of signing suite and key binding.

use std::fmt;

use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::HolderConfig, core::metadata::CredentialConfigurationSupported,
    error::IssuanceOptError, provider::identifier::ManagedIdentifier,
};

/// Suite EBSI issuers expect when they advertise nothing we prefer.
const EBSI_DEFAULT_SUITE: &str = "ES256";

/// How the issued credential is bound to a holder key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BindingMethod {
    /// A DID of the given method, e.g. `key` for `did:key`.
    Did(String),
    Jwk,
    CoseKey,
}

impl TryFrom<String> for BindingMethod {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "jwk" => Ok(Self::Jwk),
            "cose_key" => Ok(Self::CoseKey),
            did => match did.strip_prefix("did:") {
                Some(method) if !method.is_empty() => Ok(Self::Did(method.to_owned())),
                _ => bail!("unknown binding method `{value}`"),
            },
        }
    }
}

impl From<BindingMethod> for String {
    fn from(value: BindingMethod) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BindingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingMethod::Did(method) => write!(f, "did:{method}"),
            BindingMethod::Jwk => f.write_str("jwk"),
            BindingMethod::CoseKey => f.write_str("cose_key"),
        }
    }
}

impl BindingMethod {
    /// Whether an issuer-advertised `cryptographic_binding_methods_supported` entry allows this method.
    fn is_advertised_as(&self, advertised: &str) -> bool {
        match self {
            BindingMethod::Did(method) => {
                advertised == "did" || advertised.strip_prefix("did:") == Some(method.as_str())
            }
            BindingMethod::Jwk => advertised == "jwk",
            BindingMethod::CoseKey => advertised == "cose_key",
        }
    }
}

/// The handling branch a credential format falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFormat {
    JwtVc,
    JsonLd,
    SdJwt,
    MsoMdoc,
}

impl CredentialFormat {
    pub fn classify(format: &str) -> Result<Self, IssuanceOptError> {
        match format {
            "jwt" | "jwt_vc" | "jwt_vc_json" => Ok(Self::JwtVc),
            "ldp" | "ldp_vc" | "jwt_vc_json-ld" => Ok(Self::JsonLd),
            "vc+sd-jwt" | "dc+sd-jwt" => Ok(Self::SdJwt),
            "mso_mdoc" => Ok(Self::MsoMdoc),
            other => Err(IssuanceOptError::UnsupportedFormat(other.to_owned())),
        }
    }
}

/// What the wallet will ask the issuer for, for one credential configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceOpt {
    pub configuration_id: String,
    pub format: String,
    pub format_kind: CredentialFormat,
    pub types: Vec<String>,
    pub crypto_suite: String,
    pub binding: BindingMethod,
    /// Holder key to bind to. Filled in when credentials are requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<ManagedIdentifier>,
}

pub fn resolve_issuance_opt(
    configuration_id: &str,
    configuration: &CredentialConfigurationSupported,
    config: &HolderConfig,
    is_ebsi: bool,
) -> Result<IssuanceOpt, IssuanceOptError> {
    let format_kind = CredentialFormat::classify(&configuration.format)?;
    let suite_preferences = match format_kind {
        CredentialFormat::JsonLd => &config.jsonld_cryptographic_suite_preferences,
        CredentialFormat::JwtVc | CredentialFormat::SdJwt | CredentialFormat::MsoMdoc => {
            &config.jwt_cryptographic_suite_preferences
        }
    };
    let crypto_suite = crypto_suite(
        &configuration.format,
        suite_preferences,
        &configuration.credential_signing_alg_values_supported,
        is_ebsi,
    )?;
    let binding = binding_method(
        &config.binding_method_preferences,
        &configuration.cryptographic_binding_methods_supported,
    )?;

    debug!(configuration_id, %crypto_suite, %binding, "resolved issuance option");
    Ok(IssuanceOpt {
        configuration_id: configuration_id.to_owned(),
        format: configuration.format.clone(),
        format_kind,
        types: configuration.types(),
        crypto_suite,
        binding,
        identifier: None,
    })
}

/// Resolve options for every given configuration, in order.
pub fn resolve_issuance_opts<'a>(
    configurations: impl IntoIterator<Item = (&'a str, &'a CredentialConfigurationSupported)>,
    config: &HolderConfig,
    is_ebsi: bool,
) -> Result<Vec<IssuanceOpt>, IssuanceOptError> {
    configurations
        .into_iter()
        .map(|(id, configuration)| resolve_issuance_opt(id, configuration, config, is_ebsi))
        .collect()
}

fn crypto_suite(
    format: &str,
    preferences: &[String],
    advertised: &[String],
    is_ebsi: bool,
) -> Result<String, IssuanceOptError> {
    if let Some(suite) = preferences.iter().find(|p| advertised.contains(p)) {
        return Ok(suite.clone());
    }
    if is_ebsi && !advertised.is_empty() {
        return Ok(EBSI_DEFAULT_SUITE.to_owned());
    }
    preferences
        .first()
        .or_else(|| advertised.first())
        .cloned()
        .ok_or_else(|| IssuanceOptError::NoSuitePreference(format.to_owned()))
}

fn binding_method(
    preferences: &[BindingMethod],
    advertised: &[String],
) -> Result<BindingMethod, IssuanceOptError> {
    preferences
        .iter()
        .find(|p| advertised.iter().any(|a| p.is_advertised_as(a)))
        .or_else(|| preferences.first())
        .cloned()
        .ok_or(IssuanceOptError::NoBindingPreference)
}
