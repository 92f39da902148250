use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    contact::Party,
    core::{client_state::ClientState, response::AuthorizationCodeResponse},
    error::ErrorDetails,
    machine::Transition,
    provider::{identifier::ManagedIdentifier, store::DigitalCredential},
    siop::{AuthorizationRequestData, DidAuthConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirstPartyState {
    SendAuthorizationChallengeRequest,
    CreateConfig,
    GetSiopRequest,
    SelectCredentials,
    SendAuthorizationResponse,
    Done,
    Error,
    Aborted,
    Declined,
}

impl FirstPartyState {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error | Self::Aborted | Self::Declined
        )
    }

    /// Whether entering this state invokes a service.
    pub fn is_invoking(self) -> bool {
        matches!(
            self,
            Self::SendAuthorizationChallengeRequest
                | Self::CreateConfig
                | Self::GetSiopRequest
                | Self::SendAuthorizationResponse
        )
    }
}

impl fmt::Display for FirstPartyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SendAuthorizationChallengeRequest => "sendAuthorizationChallengeRequest",
            Self::CreateConfig => "createConfig",
            Self::GetSiopRequest => "getSiopRequest",
            Self::SelectCredentials => "selectCredentials",
            Self::SendAuthorizationResponse => "sendAuthorizationResponse",
            Self::Done => "done",
            Self::Error => "error",
            Self::Aborted => "aborted",
            Self::Declined => "declined",
        };
        f.write_str(name)
    }
}

/// Result of a first-party service.
#[derive(Debug, Clone, PartialEq)]
pub enum FirstPartyOutput {
    AuthorizationCode(AuthorizationCodeResponse),
    DidAuthConfig(DidAuthConfig),
    AuthorizationRequest(AuthorizationRequestData),
    /// `presentation_during_issuance_session` handed out by the issuer.
    PresentationSession(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FirstPartyEvent {
    Next,
    Previous,
    Decline,
    SetSelectedCredentials(Vec<DigitalCredential>),
    Done(FirstPartyOutput),
    /// The challenge endpoint wants a presentation first.
    InsufficientAuthorization {
        auth_session: Option<String>,
        presentation: Option<String>,
    },
    Failed(ErrorDetails),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstPartyContext {
    pub protocol_client_state: ClientState,
    /// Credentials the user chose to present.
    pub selected_credentials: Vec<DigitalCredential>,
    pub contact: Option<Party>,
    pub auth_session: Option<String>,
    pub presentation_uri: Option<String>,
    pub identifier: Option<ManagedIdentifier>,
    pub did_auth_config: Option<DidAuthConfig>,
    pub authorization_request_data: Option<AuthorizationRequestData>,
    pub presentation_during_issuance_session: Option<String>,
    pub authorization_code_response: Option<AuthorizationCodeResponse>,
    pub error: Option<ErrorDetails>,
}

impl FirstPartyContext {
    pub fn new(protocol_client_state: ClientState, contact: Option<Party>) -> Self {
        Self {
            protocol_client_state,
            selected_credentials: vec![],
            contact,
            auth_session: None,
            presentation_uri: None,
            identifier: None,
            did_auth_config: None,
            authorization_request_data: None,
            presentation_during_issuance_session: None,
            authorization_code_response: None,
            error: None,
        }
    }
}

/// The transition table.
///
/// A second `insufficient_authorization` after a presentation was made ends
/// the flow in [FirstPartyState::Error], so the challenge endpoint is called
/// at most twice.
pub fn transition(
    state: FirstPartyState,
    event: &FirstPartyEvent,
    context: &FirstPartyContext,
) -> Transition<FirstPartyState> {
    use FirstPartyEvent as E;
    use FirstPartyOutput as O;
    use FirstPartyState as S;

    match (state, event) {
        (S::SendAuthorizationChallengeRequest, E::Done(O::AuthorizationCode(_))) => {
            Transition::Goto(S::Done)
        }
        (S::SendAuthorizationChallengeRequest, E::InsufficientAuthorization { .. }) => {
            if context.presentation_during_issuance_session.is_some() {
                Transition::Goto(S::Error)
            } else {
                Transition::Goto(S::CreateConfig)
            }
        }
        (S::CreateConfig, E::Done(O::DidAuthConfig(_))) => Transition::Goto(S::GetSiopRequest),
        (S::GetSiopRequest, E::Done(O::AuthorizationRequest(_))) => {
            Transition::Goto(S::SelectCredentials)
        }
        (S::SelectCredentials, E::SetSelectedCredentials(_)) => Transition::Stay,
        (S::SelectCredentials, E::Next) if !context.selected_credentials.is_empty() => {
            Transition::Goto(S::SendAuthorizationResponse)
        }
        (S::SelectCredentials, E::Previous) => Transition::Goto(S::Aborted),
        (S::SelectCredentials, E::Decline) => Transition::Goto(S::Declined),
        (S::SendAuthorizationResponse, E::Done(O::PresentationSession(_))) => {
            Transition::Goto(S::SendAuthorizationChallengeRequest)
        }
        (state, E::Failed(_)) if state.is_invoking() => Transition::Goto(S::Error),
        _ => Transition::Ignored,
    }
}

/// Fold an accepted event into the context.
pub fn reduce(mut context: FirstPartyContext, event: &FirstPartyEvent) -> FirstPartyContext {
    use FirstPartyEvent as E;
    use FirstPartyOutput as O;

    match event {
        E::Done(O::AuthorizationCode(response)) => {
            context.authorization_code_response = Some(response.clone());
        }
        E::InsufficientAuthorization {
            auth_session,
            presentation,
        } => {
            if context.presentation_during_issuance_session.is_some() {
                context.error = Some(ErrorDetails::new(
                    "Authorization challenge failed",
                    "the issuer still reported insufficient_authorization after the presentation",
                ));
            } else {
                context.auth_session = auth_session.clone();
                context.presentation_uri = presentation.clone();
            }
        }
        E::Done(O::DidAuthConfig(config)) => {
            context.identifier = Some(config.identifier.clone());
            context.did_auth_config = Some(config.clone());
        }
        E::Done(O::AuthorizationRequest(request)) => {
            context.authorization_request_data = Some(request.clone());
        }
        E::SetSelectedCredentials(credentials) => {
            context.selected_credentials = credentials.clone();
        }
        E::Done(O::PresentationSession(session)) => {
            context.presentation_during_issuance_session = Some(session.clone());
        }
        E::Failed(error) => context.error = Some(error.clone()),
        E::Next | E::Previous | E::Decline => {}
    }
    context
}
