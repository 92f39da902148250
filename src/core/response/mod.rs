use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A credential endpoint response, as returned by the protocol client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialResponse {
    /// Single credential (drafts up to 14).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Json>,
    /// Credential list (draft 15 and 1.0).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<IssuedCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    /// Issuer hint on how the subject is to be identified, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_subject_issuance: Option<Json>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub credential: Json,
}

impl CredentialResponse {
    pub fn first_credential(&self) -> Option<&Json> {
        self.credential
            .as_ref()
            .or_else(|| self.credentials.first().map(|issued| &issued.credential))
            .filter(|credential| !credential.is_null())
    }
}

/// Code returned to the redirect URI in the authorization code flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeResponse {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Successful answer of the authorization challenge endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationChallengeCodeResponse {
    pub authorization_code: String,
}

impl From<AuthorizationChallengeCodeResponse> for AuthorizationCodeResponse {
    fn from(value: AuthorizationChallengeCodeResponse) -> Self {
        Self {
            code: value.authorization_code,
            state: None,
        }
    }
}
