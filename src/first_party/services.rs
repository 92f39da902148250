use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;
use url::Url;

use crate::{
    core::{response::AuthorizationChallengeCodeResponse, util::AsyncHttpClient},
    error::{AuthorizationChallengeError, ErrorDetails},
    provider::{
        client::{AuthorizationChallengeRequest, IssuanceClientFactory},
        identifier::IdentifierProvider,
        presentation::PresentationSigner,
    },
    siop::{self, DidAuthConfig},
};

use super::state::{FirstPartyContext, FirstPartyEvent, FirstPartyOutput, FirstPartyState};

/// Collaborators of the first-party flow.
#[derive(Debug, Clone)]
pub struct FirstPartyServices {
    pub client_factory: Arc<dyn IssuanceClientFactory>,
    pub identifier_provider: Arc<dyn IdentifierProvider>,
    pub presentation_signer: Arc<dyn PresentationSigner>,
    pub http_client: Arc<dyn AsyncHttpClient>,
}

impl FirstPartyServices {
    /// Run the service of `state`, turning its outcome into the event that completes it.
    pub(crate) async fn invoke(
        &self,
        state: FirstPartyState,
        context: &FirstPartyContext,
    ) -> Option<FirstPartyEvent> {
        let (title, result) = match state {
            FirstPartyState::SendAuthorizationChallengeRequest => {
                return Some(self.send_authorization_challenge_request(context).await)
            }
            FirstPartyState::CreateConfig => (
                "Creating the presentation config failed",
                self.create_config(context)
                    .await
                    .map(FirstPartyOutput::DidAuthConfig),
            ),
            FirstPartyState::GetSiopRequest => (
                "Retrieving the authorization request failed",
                self.get_siop_request(context)
                    .await
                    .map(FirstPartyOutput::AuthorizationRequest),
            ),
            FirstPartyState::SendAuthorizationResponse => (
                "Sending the authorization response failed",
                self.send_authorization_response(context)
                    .await
                    .map(FirstPartyOutput::PresentationSession),
            ),
            _ => return None,
        };
        Some(match result {
            Ok(output) => FirstPartyEvent::Done(output),
            Err(error) => FirstPartyEvent::Failed(ErrorDetails::from_error(title, &error)),
        })
    }

    async fn send_authorization_challenge_request(
        &self,
        context: &FirstPartyContext,
    ) -> FirstPartyEvent {
        let result = self.challenge(context).await;

        match result {
            Ok(response) => {
                FirstPartyEvent::Done(FirstPartyOutput::AuthorizationCode(response.into()))
            }
            Err(AuthorizationChallengeError::InsufficientAuthorization {
                auth_session,
                presentation,
            }) => {
                debug!(?auth_session, "issuer requires a presentation");
                FirstPartyEvent::InsufficientAuthorization {
                    auth_session,
                    presentation,
                }
            }
            Err(AuthorizationChallengeError::Other(error)) => FirstPartyEvent::Failed(
                ErrorDetails::from_error("Sending the authorization challenge request failed", &error),
            ),
        }
    }

    async fn challenge(
        &self,
        context: &FirstPartyContext,
    ) -> Result<AuthorizationChallengeCodeResponse, AuthorizationChallengeError> {
        let mut client = self
            .client_factory
            .from_state(&context.protocol_client_state)
            .await?;
        let request = AuthorizationChallengeRequest {
            client_id: client.client_id().map(ToOwned::to_owned),
            issuer_state: context
                .protocol_client_state
                .credential_offer
                .as_ref()
                .and_then(|offer| offer.issuer_state())
                .map(ToOwned::to_owned),
            auth_session: context.auth_session.clone(),
            presentation_during_issuance_session: context
                .presentation_during_issuance_session
                .clone(),
        };
        client.acquire_authorization_challenge_code(request).await
    }

    async fn create_config(&self, context: &FirstPartyContext) -> Result<DidAuthConfig> {
        let Some(presentation_uri) = &context.presentation_uri else {
            bail!("the issuer did not provide a presentation uri")
        };
        let presentation_uri: Url = presentation_uri
            .parse()
            .context("the presentation uri is not a valid URL")?;
        let audience: Url = context
            .protocol_client_state
            .issuer()
            .parse()
            .context("the credential issuer is not a valid URL")?;
        let identifier = self
            .identifier_provider
            .authentication_identifier(&audience)
            .await?;
        Ok(DidAuthConfig::new(identifier, presentation_uri))
    }

    async fn get_siop_request(
        &self,
        context: &FirstPartyContext,
    ) -> Result<siop::AuthorizationRequestData> {
        let config = context
            .did_auth_config
            .as_ref()
            .context("missing presentation config")?;
        siop::fetch_request(self.http_client.as_ref(), &config.presentation_uri).await
    }

    async fn send_authorization_response(&self, context: &FirstPartyContext) -> Result<String> {
        let request = context
            .authorization_request_data
            .as_ref()
            .context("missing authorization request")?;
        let identifier = context
            .identifier
            .as_ref()
            .context("missing authentication identifier")?;
        if context.selected_credentials.is_empty() {
            bail!("no credentials selected for presentation")
        }
        let response = self
            .presentation_signer
            .sign_response(request, &context.selected_credentials, identifier)
            .await
            .context("unable to sign the authorization response")?;
        siop::submit_response(self.http_client.as_ref(), request, &response).await
    }
}
