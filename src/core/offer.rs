//! Credential offers and the URIs that carry them into the wallet.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::OfferError;

use super::{client_state::ClientState, response::AuthorizationCodeResponse};

/// Legacy (draft ≤ 8) issuance initiation scheme.
pub const INITIATE_ISSUANCE_SCHEME: &str = "openid-initiate-issuance";
pub const CREDENTIAL_OFFER_SCHEME: &str = "openid-credential-offer";

const PRE_AUTHORIZED_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOffer {
    pub credential_issuer: String,
    #[serde(default, alias = "credentials")]
    pub credential_configuration_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    /// Draft 11 and earlier signalled the transaction code this way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_pin_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CredentialOffer {
    pub fn pre_authorized_code(&self) -> Option<&PreAuthorizedCodeGrant> {
        self.grants.as_ref()?.pre_authorized_code.as_ref()
    }

    pub fn authorization_code(&self) -> Option<&AuthorizationCodeGrant> {
        self.grants.as_ref()?.authorization_code.as_ref()
    }

    /// Whether the pre-authorized grant demands a transaction code from the user.
    pub fn user_pin_required(&self) -> bool {
        self.pre_authorized_code()
            .map(|grant| grant.tx_code.is_some() || grant.user_pin_required == Some(true))
            .unwrap_or(false)
    }

    pub fn issuer_state(&self) -> Option<&str> {
        self.authorization_code()?.issuer_state.as_deref()
    }
}

/// Where the credential offer itself lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferSource {
    ByValue(CredentialOffer),
    ByReference(Url),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    CredentialOffer(OfferSource),
    /// The authorization server redirected back with a code for a flow in progress.
    AuthorizationCallback(AuthorizationCodeResponse),
}

/// The entry point of an issuance flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub uri: Url,
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_client_state: Option<ClientState>,
}

impl RequestData {
    /// Parse an offer or callback URI.
    ///
    /// ```
    /// # use openid4vci_holder::core::offer::{RequestData, RequestKind, OfferSource};
    /// let data = RequestData::parse(
    ///     "openid-credential-offer://?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Foffer%2F1",
    ///     None,
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(
    ///     data.kind,
    ///     RequestKind::CredentialOffer(OfferSource::ByReference(
    ///         "https://issuer.example.com/offer/1".parse().unwrap()
    ///     ))
    /// );
    /// ```
    pub fn parse(
        uri: &str,
        existing_client_state: Option<ClientState>,
    ) -> Result<Self, OfferError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(OfferError::MissingUri);
        }
        let url = Url::parse(uri)?;
        let query = QueryParameters::from(&url);

        if query.first("credential_offer").is_none()
            && query.first("credential_offer_uri").is_none()
        {
            if let Some(code) = query.first("code") {
                let Some(state) = existing_client_state else {
                    return Err(OfferError::MissingClientState);
                };
                return Ok(Self {
                    kind: RequestKind::AuthorizationCallback(AuthorizationCodeResponse {
                        code: code.to_owned(),
                        state: query.first("state").map(ToOwned::to_owned),
                    }),
                    uri: url,
                    existing_client_state: Some(state),
                });
            }
        }

        let source = match url.scheme() {
            CREDENTIAL_OFFER_SCHEME | "https" => offer_source(&url, &query)?,
            INITIATE_ISSUANCE_SCHEME => {
                OfferSource::ByValue(legacy_offer(&url, &query)?)
            }
            scheme => return Err(OfferError::UnsupportedScheme(scheme.to_owned())),
        };

        Ok(Self {
            uri: url,
            kind: RequestKind::CredentialOffer(source),
            existing_client_state,
        })
    }

    /// The offer, when it was passed by value.
    pub fn credential_offer(&self) -> Option<&CredentialOffer> {
        match &self.kind {
            RequestKind::CredentialOffer(OfferSource::ByValue(offer)) => Some(offer),
            _ => None,
        }
    }

    pub fn authorization_code_response(&self) -> Option<&AuthorizationCodeResponse> {
        match &self.kind {
            RequestKind::AuthorizationCallback(response) => Some(response),
            _ => None,
        }
    }
}

struct QueryParameters(Vec<(String, String)>);

impl From<&Url> for QueryParameters {
    fn from(url: &Url) -> Self {
        Self(url.query_pairs().into_owned().collect())
    }
}

impl QueryParameters {
    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

fn offer_source(url: &Url, query: &QueryParameters) -> Result<OfferSource, OfferError> {
    if let Some(offer) = query.first("credential_offer") {
        return Ok(OfferSource::ByValue(serde_json::from_str(offer)?));
    }
    if let Some(reference) = query.first("credential_offer_uri") {
        return Ok(OfferSource::ByReference(Url::parse(reference)?));
    }
    Err(OfferError::MissingOffer(url.to_string()))
}

fn legacy_offer(url: &Url, query: &QueryParameters) -> Result<CredentialOffer, OfferError> {
    let Some(issuer) = query.first("issuer") else {
        return Err(OfferError::MissingOffer(url.to_string()));
    };

    let grants = match query.first("pre-authorized_code") {
        Some(code) => Grants {
            authorization_code: None,
            pre_authorized_code: Some(PreAuthorizedCodeGrant {
                pre_authorized_code: code.to_owned(),
                tx_code: None,
                user_pin_required: Some(query.first("user_pin_required") == Some("true")),
                authorization_server: None,
            }),
        },
        None => Grants {
            authorization_code: Some(AuthorizationCodeGrant {
                issuer_state: query.first("op_state").map(ToOwned::to_owned),
                authorization_server: None,
            }),
            pre_authorized_code: None,
        },
    };

    Ok(CredentialOffer {
        credential_issuer: issuer.to_owned(),
        credential_configuration_ids: query.all("credential_type"),
        grants: Some(grants),
    })
}

impl Grants {
    pub fn grant_types(&self) -> Vec<&'static str> {
        let mut types = Vec::new();
        if self.authorization_code.is_some() {
            types.push("authorization_code");
        }
        if self.pre_authorized_code.is_some() {
            types.push(PRE_AUTHORIZED_CODE_GRANT);
        }
        types
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn offer_uri(offer: serde_json::Value) -> String {
        let query = serde_urlencoded::to_string([("credential_offer", offer.to_string())]).unwrap();
        format!("openid-credential-offer://?{query}")
    }

    #[test]
    fn offer_by_value_with_tx_code() {
        let uri = offer_uri(json!({
            "credential_issuer": "https://issuer.example.com",
            "credential_configuration_ids": ["UniversityDegree_jwt"],
            "grants": {
                "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                    "pre-authorized_code": "adhjhdjajkdkhjhdj",
                    "tx_code": { "input_mode": "numeric", "length": 4 }
                }
            }
        }));

        let data = RequestData::parse(&uri, None).unwrap();
        let offer = data.credential_offer().unwrap();

        assert_eq!(offer.credential_issuer, "https://issuer.example.com");
        assert!(offer.user_pin_required());
        assert_eq!(
            offer.grants.as_ref().unwrap().grant_types(),
            vec![PRE_AUTHORIZED_CODE_GRANT]
        );
    }

    #[test]
    fn draft_offer_keys() {
        let uri = offer_uri(json!({
            "credential_issuer": "https://issuer.example.com",
            "credentials": ["VerifiableId"],
            "grants": {
                "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                    "pre-authorized_code": "abc",
                    "user_pin_required": false
                }
            }
        }));

        let data = RequestData::parse(&uri, None).unwrap();
        let offer = data.credential_offer().unwrap();
        assert_eq!(offer.credential_configuration_ids, vec!["VerifiableId"]);
        assert!(!offer.user_pin_required());
    }

    #[test]
    fn issuer_hosted_https_offer() {
        let data = RequestData::parse(
            "https://issuer.example.com/offer?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Fo%2F7",
            None,
        )
        .unwrap();
        assert!(matches!(
            data.kind,
            RequestKind::CredentialOffer(OfferSource::ByReference(_))
        ));
    }

    #[test]
    fn legacy_initiate_issuance() {
        let data = RequestData::parse(
            "openid-initiate-issuance://?issuer=https%3A%2F%2Fissuer.example.com&credential_type=OpenBadgeCredential&credential_type=VerifiableId&pre-authorized_code=1234&user_pin_required=true",
            None,
        )
        .unwrap();

        let offer = data.credential_offer().unwrap();
        assert_eq!(
            offer.credential_configuration_ids,
            vec!["OpenBadgeCredential", "VerifiableId"]
        );
        assert!(offer.user_pin_required());
        assert_eq!(offer.pre_authorized_code().unwrap().pre_authorized_code, "1234");
    }

    #[test]
    fn legacy_without_pre_authorized_code_uses_authorization_code() {
        let data = RequestData::parse(
            "openid-initiate-issuance://?issuer=https%3A%2F%2Fissuer.example.com&credential_type=VerifiableId&op_state=xyz",
            None,
        )
        .unwrap();
        let offer = data.credential_offer().unwrap();
        assert_eq!(offer.issuer_state(), Some("xyz"));
        assert!(!offer.user_pin_required());
    }

    #[test]
    fn rejects_bad_entry_points() {
        assert!(matches!(
            RequestData::parse("  ", None),
            Err(OfferError::MissingUri)
        ));
        assert!(matches!(
            RequestData::parse("openid4vp://?request_uri=x", None),
            Err(OfferError::UnsupportedScheme(s)) if s == "openid4vp"
        ));
        assert!(matches!(
            RequestData::parse("https://issuer.example.com/offer", None),
            Err(OfferError::MissingOffer(_))
        ));
        assert!(matches!(
            RequestData::parse("openid-credential-offer://?credential_offer=%7Bnope", None),
            Err(OfferError::MalformedOffer(_))
        ));
    }

    #[test]
    fn authorization_callback_requires_state() {
        let callback = "https://wallet.example.com/callback?code=SplxlOBeZQQYbYS6WxSbIA&state=af0ifjsldkj";
        assert!(matches!(
            RequestData::parse(callback, None),
            Err(OfferError::MissingClientState)
        ));

        let state = ClientState::new("https://issuer.example.com");
        let data = RequestData::parse(callback, Some(state)).unwrap();
        let response = data.authorization_code_response().unwrap();
        assert_eq!(response.code, "SplxlOBeZQQYbYS6WxSbIA");
        assert_eq!(response.state.as_deref(), Some("af0ifjsldkj"));
    }
}
