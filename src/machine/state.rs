use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    branding::CredentialBrandingMap,
    contact::{Identity, Party},
    core::{
        client_state::ClientState,
        metadata::{CredentialConfigurationSupported, ServerMetadata},
        response::AuthorizationCodeResponse,
    },
    credential::MappedCredentialToAccept,
    error::ErrorDetails,
    first_party::FirstPartyCompletion,
};

use super::{context::CredentialTypeSelection, Transition, MachineContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddContactStep {
    /// Waiting for the user to create the contact.
    Executing,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerifyPinStep {
    Idle,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssuanceState {
    #[serde(rename = "initiateOID4VCI")]
    InitiateOid4vci,
    CreateCredentialSelection,
    GetContact,
    TransitionFromSetup,
    AddContact(AddContactStep),
    AddIssuerBranding,
    TransitionFromContactSetup,
    SelectCredentials,
    TransitionFromSelectingCredentials,
    StartFirstPartyApplicationFlow,
    InitiateAuthorizationRequest,
    WaitForAuthorizationResponse,
    VerifyPin(VerifyPinStep),
    GetCredentials,
    VerifyCredentials,
    TransitionFromWalletInput,
    AddContactIdentity,
    AddIssuerBrandingAfterIdentity,
    ReviewCredentials,
    StoreCredentialBranding,
    StoreCredentials,
    HandleError,
    Done,
    Error,
    Aborted,
    Declined,
}

impl IssuanceState {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error | Self::Aborted | Self::Declined
        )
    }

    /// Whether this state is left immediately through a guarded `always` transition.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::TransitionFromSetup
                | Self::TransitionFromContactSetup
                | Self::TransitionFromSelectingCredentials
                | Self::TransitionFromWalletInput
                | Self::AddContact(AddContactStep::Next)
                | Self::VerifyPin(VerifyPinStep::Next)
        )
    }
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InitiateOid4vci => "initiateOID4VCI",
            Self::CreateCredentialSelection => "createCredentialSelection",
            Self::GetContact => "getContact",
            Self::TransitionFromSetup => "transitionFromSetup",
            Self::AddContact(AddContactStep::Executing) => "addContact.executing",
            Self::AddContact(AddContactStep::Next) => "addContact.next",
            Self::AddIssuerBranding => "addIssuerBranding",
            Self::TransitionFromContactSetup => "transitionFromContactSetup",
            Self::SelectCredentials => "selectCredentials",
            Self::TransitionFromSelectingCredentials => "transitionFromSelectingCredentials",
            Self::StartFirstPartyApplicationFlow => "startFirstPartyApplicationFlow",
            Self::InitiateAuthorizationRequest => "initiateAuthorizationRequest",
            Self::WaitForAuthorizationResponse => "waitForAuthorizationResponse",
            Self::VerifyPin(VerifyPinStep::Idle) => "verifyPin.idle",
            Self::VerifyPin(VerifyPinStep::Next) => "verifyPin.next",
            Self::GetCredentials => "getCredentials",
            Self::VerifyCredentials => "verifyCredentials",
            Self::TransitionFromWalletInput => "transitionFromWalletInput",
            Self::AddContactIdentity => "addContactIdentity",
            Self::AddIssuerBrandingAfterIdentity => "addIssuerBrandingAfterIdentity",
            Self::ReviewCredentials => "reviewCredentials",
            Self::StoreCredentialBranding => "storeCredentialBranding",
            Self::StoreCredentials => "storeCredentials",
            Self::HandleError => "handleError",
            Self::Done => "done",
            Self::Error => "error",
            Self::Aborted => "aborted",
            Self::Declined => "declined",
        };
        f.write_str(name)
    }
}

/// Result of an invoked service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutput {
    Initiated {
        client_state: ClientState,
        server_metadata: ServerMetadata,
        credentials_supported: BTreeMap<String, CredentialConfigurationSupported>,
        credential_branding: CredentialBrandingMap,
        authorization_code_url: Option<Url>,
    },
    CredentialSelection(Vec<CredentialTypeSelection>),
    Contact(Option<Party>),
    /// Whether branding for the issuer is now in the branding store.
    IssuerBranding(bool),
    FirstParty(FirstPartyCompletion),
    CredentialsToAccept {
        client_state: ClientState,
        credentials: Vec<MappedCredentialToAccept>,
    },
    CredentialsVerified,
    ContactIdentity(Identity),
    CredentialBrandingStored,
    CredentialsStored,
}

/// Inbound events, plus the completion events of invoked services.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuanceEvent {
    Next,
    Previous,
    Decline,
    CreateContact(Party),
    SetVerificationCode(String),
    SetContactAlias(String),
    SetContactConsent(bool),
    /// Ids of the chosen credential types, see [CredentialTypeSelection::id].
    SetSelectedCredentials(Vec<String>),
    SetAuthorizationCodeUrl(Url),
    InvokedAuthorizationCodeRequest,
    ProvideAuthorizationCodeResponse(AuthorizationCodeResponse),
    Done(ServiceOutput),
    Failed(ErrorDetails),
}

impl IssuanceEvent {
    /// The wire name of a user event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Next => "NEXT",
            Self::Previous => "PREVIOUS",
            Self::Decline => "DECLINE",
            Self::CreateContact(_) => "CREATE_CONTACT",
            Self::SetVerificationCode(_) => "SET_VERIFICATION_CODE",
            Self::SetContactAlias(_) => "SET_CONTACT_ALIAS",
            Self::SetContactConsent(_) => "SET_CONTACT_CONSENT",
            Self::SetSelectedCredentials(_) => "SET_SELECTED_CREDENTIALS",
            Self::SetAuthorizationCodeUrl(_) => "SET_AUTHORIZATION_CODE_URL",
            Self::InvokedAuthorizationCodeRequest => "INVOKED_AUTHORIZATION_CODE_REQUEST",
            Self::ProvideAuthorizationCodeResponse(_) => "PROVIDE_AUTHORIZATION_CODE_RESPONSE",
            Self::Done(_) => "done",
            Self::Failed(_) => "error",
        }
    }
}

/// The event-driven part of the transition table. Guarded `always`
/// transitions live in [guards](super::guards).
pub fn transition(
    state: IssuanceState,
    event: &IssuanceEvent,
    context: &MachineContext,
) -> Transition<IssuanceState> {
    use IssuanceEvent as E;
    use IssuanceState as S;
    use ServiceOutput as O;

    match (state, event) {
        (S::InitiateOid4vci, E::Done(O::Initiated { .. })) => {
            Transition::Goto(S::CreateCredentialSelection)
        }
        (S::CreateCredentialSelection, E::Done(O::CredentialSelection(_))) => {
            Transition::Goto(S::GetContact)
        }
        (S::GetContact, E::Done(O::Contact(_))) => Transition::Goto(S::TransitionFromSetup),

        (S::AddContact(_), E::SetContactAlias(_) | E::SetContactConsent(_)) => Transition::Stay,
        (S::AddContact(_), E::CreateContact(_)) => {
            Transition::Goto(S::AddContact(AddContactStep::Next))
        }
        (S::AddIssuerBranding, E::Done(O::IssuerBranding(_))) => {
            Transition::Goto(S::TransitionFromContactSetup)
        }

        (S::SelectCredentials, E::SetSelectedCredentials(_)) => Transition::Stay,
        (S::SelectCredentials, E::Next) if !context.selected_credentials.is_empty() => {
            Transition::Goto(S::TransitionFromSelectingCredentials)
        }

        (S::StartFirstPartyApplicationFlow, E::Done(O::FirstParty(completion))) => {
            Transition::Goto(match completion {
                FirstPartyCompletion::Code(_) => S::GetCredentials,
                FirstPartyCompletion::Aborted => S::Aborted,
                FirstPartyCompletion::Declined => S::Declined,
            })
        }

        (S::InitiateAuthorizationRequest, E::SetAuthorizationCodeUrl(_)) => Transition::Stay,
        (S::InitiateAuthorizationRequest, E::InvokedAuthorizationCodeRequest) => {
            Transition::Goto(S::WaitForAuthorizationResponse)
        }
        (S::WaitForAuthorizationResponse, E::ProvideAuthorizationCodeResponse(_)) => {
            Transition::Goto(S::TransitionFromSelectingCredentials)
        }

        (S::VerifyPin(_), E::SetVerificationCode(_)) => {
            Transition::Goto(S::VerifyPin(VerifyPinStep::Next))
        }
        (S::VerifyPin(_), E::Previous) => {
            if context.credential_selection.len() > 1 {
                Transition::Goto(S::SelectCredentials)
            } else {
                Transition::Goto(S::Aborted)
            }
        }

        (S::GetCredentials, E::Done(O::CredentialsToAccept { .. })) => {
            Transition::Goto(S::VerifyCredentials)
        }
        (S::VerifyCredentials, E::Done(O::CredentialsVerified)) => {
            Transition::Goto(S::TransitionFromWalletInput)
        }
        (S::AddContactIdentity, E::Done(O::ContactIdentity(_))) => {
            if context.issuer_branding_stored {
                Transition::Goto(S::ReviewCredentials)
            } else {
                Transition::Goto(S::AddIssuerBrandingAfterIdentity)
            }
        }
        (S::AddIssuerBrandingAfterIdentity, E::Done(O::IssuerBranding(_))) => {
            Transition::Goto(S::ReviewCredentials)
        }
        (S::ReviewCredentials, E::Next) => Transition::Goto(S::StoreCredentialBranding),
        (S::StoreCredentialBranding, E::Done(O::CredentialBrandingStored)) => {
            Transition::Goto(S::StoreCredentials)
        }
        (S::StoreCredentials, E::Done(O::CredentialsStored)) => Transition::Goto(S::Done),

        // Both lead to the terminal error state.
        (S::HandleError, E::Next | E::Previous) => Transition::Goto(S::Error),

        (
            S::AddContact(_)
            | S::SelectCredentials
            | S::InitiateAuthorizationRequest
            | S::WaitForAuthorizationResponse
            | S::ReviewCredentials,
            E::Previous,
        ) => Transition::Goto(S::Aborted),
        (
            S::AddContact(_)
            | S::SelectCredentials
            | S::InitiateAuthorizationRequest
            | S::WaitForAuthorizationResponse
            | S::VerifyPin(_)
            | S::ReviewCredentials,
            E::Decline,
        ) => Transition::Goto(S::Declined),

        (state, E::Failed(_)) if !state.is_final() && state != S::HandleError => {
            Transition::Goto(S::HandleError)
        }
        _ => Transition::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::context::tests::context;

    #[test]
    fn handle_error_always_ends_in_error() {
        let ctx = context();
        for event in [IssuanceEvent::Next, IssuanceEvent::Previous] {
            assert_eq!(
                transition(IssuanceState::HandleError, &event, &ctx),
                Transition::Goto(IssuanceState::Error)
            );
        }
        assert_eq!(
            transition(IssuanceState::HandleError, &IssuanceEvent::Decline, &ctx),
            Transition::Ignored
        );
    }

    #[test]
    fn review_outcomes() {
        let ctx = context();
        assert_eq!(
            transition(IssuanceState::ReviewCredentials, &IssuanceEvent::Next, &ctx),
            Transition::Goto(IssuanceState::StoreCredentialBranding)
        );
        assert_eq!(
            transition(IssuanceState::ReviewCredentials, &IssuanceEvent::Decline, &ctx),
            Transition::Goto(IssuanceState::Declined)
        );
        assert_eq!(
            transition(IssuanceState::ReviewCredentials, &IssuanceEvent::Previous, &ctx),
            Transition::Goto(IssuanceState::Aborted)
        );
    }

    #[test]
    fn pin_previous_depends_on_selection() {
        let mut ctx = context();
        let previous = IssuanceEvent::Previous;
        assert_eq!(
            transition(IssuanceState::VerifyPin(VerifyPinStep::Idle), &previous, &ctx),
            Transition::Goto(IssuanceState::Aborted)
        );
        ctx.credential_selection = vec![
            CredentialTypeSelection::new("a", "A", "A"),
            CredentialTypeSelection::new("b", "B", "B"),
        ];
        assert_eq!(
            transition(IssuanceState::VerifyPin(VerifyPinStep::Idle), &previous, &ctx),
            Transition::Goto(IssuanceState::SelectCredentials)
        );
    }

    #[test]
    fn selection_requires_a_choice() {
        let mut ctx = context();
        assert_eq!(
            transition(IssuanceState::SelectCredentials, &IssuanceEvent::Next, &ctx),
            Transition::Ignored
        );
        ctx.selected_credentials = vec!["a".into()];
        assert_eq!(
            transition(IssuanceState::SelectCredentials, &IssuanceEvent::Next, &ctx),
            Transition::Goto(IssuanceState::TransitionFromSelectingCredentials)
        );
    }

    #[test]
    fn failures_route_to_handle_error() {
        let ctx = context();
        let failed = IssuanceEvent::Failed(ErrorDetails::new("Getting credentials failed", "boom"));
        assert_eq!(
            transition(IssuanceState::GetCredentials, &failed, &ctx),
            Transition::Goto(IssuanceState::HandleError)
        );
        assert_eq!(
            transition(IssuanceState::Done, &failed, &ctx),
            Transition::Ignored
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(IssuanceState::InitiateOid4vci.to_string(), "initiateOID4VCI");
        assert_eq!(
            serde_json::to_value(IssuanceState::VerifyPin(VerifyPinStep::Idle)).unwrap(),
            serde_json::json!({ "verifyPin": "idle" })
        );
    }
}
