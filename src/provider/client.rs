use std::{collections::BTreeMap, fmt::Debug};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    core::{
        client_state::ClientState,
        metadata::{CredentialConfigurationSupported, ServerMetadata},
        offer::RequestData,
        response::{AuthorizationChallengeCodeResponse, AuthorizationCodeResponse, CredentialResponse},
    },
    error::AuthorizationChallengeError,
    issuance_opts::IssuanceOpt,
};

/// Settings handed to the protocol client when a flow starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationChallengeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_during_issuance_session: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    /// Transaction code for pre-authorized offers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<AuthorizationCodeResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
}

/// Creates protocol clients, either for a new offer or from a checkpoint.
///
/// Every step of a flow re-hydrates its client from the latest
/// [ClientState], so the state is never shared by reference.
#[async_trait]
pub trait IssuanceClientFactory: Debug + Send + Sync {
    async fn from_uri(
        &self,
        request: &RequestData,
        options: &ClientOptions,
    ) -> Result<Box<dyn IssuanceClient>>;

    async fn from_state(&self, state: &ClientState) -> Result<Box<dyn IssuanceClient>>;
}

/// An OID4VCI protocol client bound to one offer.
#[async_trait]
pub trait IssuanceClient: Debug + Send + Sync {
    fn export_state(&self) -> Result<ClientState>;

    async fn retrieve_server_metadata(&mut self) -> Result<ServerMetadata>;

    /// Supported configurations, restricted to the ones this offer names.
    fn credentials_supported(&self) -> Result<BTreeMap<String, CredentialConfigurationSupported>>;

    fn client_id(&self) -> Option<&str>;

    /// Whether the issuer follows the EBSI conformance profile.
    fn is_ebsi(&self) -> bool;

    fn authorization_url(&self) -> Option<&Url>;

    async fn acquire_authorization_challenge_code(
        &mut self,
        request: AuthorizationChallengeRequest,
    ) -> Result<AuthorizationChallengeCodeResponse, AuthorizationChallengeError>;

    fn has_access_token(&self) -> bool;

    async fn acquire_access_token(&mut self, request: AccessTokenRequest) -> Result<()>;

    /// Request one credential; `opt.identifier` carries the key to bind it to.
    async fn acquire_credential(&mut self, opt: &IssuanceOpt) -> Result<CredentialResponse>;
}
