//! Guards and the guarded `always` transitions they drive.
//!
//! Guards are pure functions of the context. The ones that need the protocol
//! client state fail when it is missing, which routes the flow to
//! [IssuanceState::HandleError].

use crate::{core::client_state::ClientState, error::ErrorDetails};

use super::{
    context::MachineContext,
    state::{AddContactStep, IssuanceState, VerifyPinStep},
};

const GUARD_FAILED: &str = "Checking the issuance flow failed";

pub fn has_no_contact(context: &MachineContext) -> bool {
    context.contact.is_none()
}

pub fn has_contact(context: &MachineContext) -> bool {
    context.contact.is_some()
}

/// More than one credential type is on offer, so the user has to choose.
pub fn select_credential(context: &MachineContext) -> bool {
    context.credential_selection.len() > 1
}

/// The issuer supports the authorization challenge endpoint, the offer is not
/// pre-authorized and no authorization code was obtained yet.
pub fn is_first_party_application(context: &MachineContext) -> bool {
    let has_challenge_endpoint = context
        .server_metadata
        .as_ref()
        .is_some_and(|metadata| metadata.authorization_challenge_endpoint.is_some());
    let pre_authorized = context
        .protocol_client_state
        .as_ref()
        .and_then(|state| state.credential_offer.as_ref())
        .is_some_and(|offer| offer.pre_authorized_code().is_some());

    has_challenge_endpoint && !pre_authorized && context.authorization_code_response.is_none()
}

pub fn require_authorization(context: &MachineContext) -> Result<bool, ErrorDetails> {
    let state = client_state(context)?;
    Ok(state.authorization_endpoint().is_some() && context.authorization_code_response.is_none())
}

pub fn require_pin(context: &MachineContext) -> Result<bool, ErrorDetails> {
    Ok(client_state(context)?.user_pin_required())
}

pub fn has_verification_code(context: &MachineContext) -> bool {
    context
        .verification_code
        .as_deref()
        .is_some_and(|code| !code.is_empty())
}

/// None of the contact's identities correlates with the received credentials' issuer.
pub fn has_no_contact_identity(context: &MachineContext) -> bool {
    let (Some(contact), Some(credential)) =
        (&context.contact, context.credentials_to_accept.first())
    else {
        return false;
    };
    !contact.has_identity(&credential.correlation_id)
}

fn client_state(context: &MachineContext) -> Result<&ClientState, ErrorDetails> {
    context
        .protocol_client_state
        .as_ref()
        .ok_or_else(|| ErrorDetails::new(GUARD_FAILED, "missing protocol client state"))
}

/// The state a transient state moves on to, or `None` for any other state.
pub fn always(
    state: IssuanceState,
    context: &MachineContext,
) -> Result<Option<IssuanceState>, ErrorDetails> {
    let next = match state {
        IssuanceState::TransitionFromSetup => {
            if has_no_contact(context) {
                IssuanceState::AddContact(AddContactStep::Executing)
            } else {
                credential_route(context, true)?
            }
        }
        IssuanceState::TransitionFromContactSetup => credential_route(context, true)?,
        IssuanceState::TransitionFromSelectingCredentials => credential_route(context, false)?,
        IssuanceState::TransitionFromWalletInput => {
            if has_no_contact_identity(context) {
                IssuanceState::AddContactIdentity
            } else {
                IssuanceState::ReviewCredentials
            }
        }
        IssuanceState::AddContact(AddContactStep::Next) => {
            if has_contact(context) {
                IssuanceState::AddIssuerBranding
            } else {
                IssuanceState::AddContact(AddContactStep::Executing)
            }
        }
        IssuanceState::VerifyPin(VerifyPinStep::Next) => {
            if has_verification_code(context) {
                IssuanceState::GetCredentials
            } else {
                IssuanceState::VerifyPin(VerifyPinStep::Idle)
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(next))
}

/// The ordered checks between setup and requesting credentials. The first
/// passing guard wins.
fn credential_route(
    context: &MachineContext,
    check_selection: bool,
) -> Result<IssuanceState, ErrorDetails> {
    if check_selection && select_credential(context) {
        return Ok(IssuanceState::SelectCredentials);
    }
    if is_first_party_application(context) {
        return Ok(IssuanceState::StartFirstPartyApplicationFlow);
    }
    if require_authorization(context)? {
        return Ok(IssuanceState::InitiateAuthorizationRequest);
    }
    if require_pin(context)? {
        return Ok(IssuanceState::VerifyPin(VerifyPinStep::Idle));
    }
    Ok(IssuanceState::GetCredentials)
}
