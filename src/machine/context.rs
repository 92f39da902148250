use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    branding::CredentialBrandingMap,
    contact::Party,
    core::{
        client_state::ClientState,
        metadata::{CredentialConfigurationSupported, ServerMetadata},
        offer::RequestData,
        response::AuthorizationCodeResponse,
    },
    credential::MappedCredentialToAccept,
    error::ErrorDetails,
    first_party::FirstPartyCompletion,
};

use super::state::{IssuanceEvent, ServiceOutput};

/// One offered credential type as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialTypeSelection {
    /// The credential configuration id.
    pub id: String,
    pub credential_type: String,
    pub credential_alias: String,
    pub is_selected: bool,
}

impl CredentialTypeSelection {
    pub fn new(
        id: impl Into<String>,
        credential_type: impl Into<String>,
        credential_alias: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            credential_type: credential_type.into(),
            credential_alias: credential_alias.into(),
            is_selected: false,
        }
    }
}

/// Everything an issuance flow has learned so far.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineContext {
    pub request_data: RequestData,
    pub locale: Option<String>,
    pub authorization_code_url: Option<Url>,
    pub credential_branding: CredentialBrandingMap,
    /// Configurations named by the offer, keyed by configuration id.
    pub credentials_supported: BTreeMap<String, CredentialConfigurationSupported>,
    pub server_metadata: Option<ServerMetadata>,
    pub protocol_client_state: Option<ClientState>,
    pub credential_selection: Vec<CredentialTypeSelection>,
    pub contact_alias: Option<String>,
    pub contact: Option<Party>,
    /// Ids of the chosen entries of `credential_selection`.
    pub selected_credentials: Vec<String>,
    pub authorization_code_response: Option<AuthorizationCodeResponse>,
    pub credentials_to_accept: Vec<MappedCredentialToAccept>,
    /// Transaction code; cleared once credentials were requested.
    pub verification_code: Option<String>,
    pub has_contact_consent: bool,
    pub issuer_branding_stored: bool,
    pub error: Option<ErrorDetails>,
}

impl MachineContext {
    pub fn new(request_data: RequestData, locale: Option<String>) -> Self {
        Self {
            authorization_code_response: request_data.authorization_code_response().cloned(),
            protocol_client_state: request_data.existing_client_state.clone(),
            request_data,
            locale,
            authorization_code_url: None,
            credential_branding: CredentialBrandingMap::new(),
            credentials_supported: BTreeMap::new(),
            server_metadata: None,
            credential_selection: vec![],
            contact_alias: None,
            contact: None,
            selected_credentials: vec![],
            credentials_to_accept: vec![],
            verification_code: None,
            has_contact_consent: true,
            issuer_branding_stored: false,
            error: None,
        }
    }

    /// Supported configurations in the order the offer lists them.
    pub fn offered_configurations(&self) -> Vec<(&str, &CredentialConfigurationSupported)> {
        let offer_order = self
            .protocol_client_state
            .as_ref()
            .and_then(|state| state.credential_offer.as_ref())
            .or_else(|| self.request_data.credential_offer())
            .map(|offer| offer.credential_configuration_ids.as_slice())
            .unwrap_or_default();

        let mut configurations: Vec<_> = self
            .credentials_supported
            .iter()
            .map(|(id, configuration)| (id.as_str(), configuration))
            .collect();
        configurations.sort_by_key(|(id, _)| {
            offer_order
                .iter()
                .position(|offered| offered == id)
                .unwrap_or(usize::MAX)
        });
        configurations
    }

    /// Configurations of the chosen credential types, in selection order.
    pub fn selected_configurations(
        &self,
    ) -> impl Iterator<Item = (&str, Option<&CredentialConfigurationSupported>)> {
        self.selected_credentials
            .iter()
            .map(|id| (id.as_str(), self.credentials_supported.get(id)))
    }
}

/// Fold an accepted event into the context.
pub fn reduce(mut context: MachineContext, event: &IssuanceEvent) -> MachineContext {
    use IssuanceEvent as E;
    use ServiceOutput as O;

    match event {
        E::Done(O::Initiated {
            client_state,
            server_metadata,
            credentials_supported,
            credential_branding,
            authorization_code_url,
        }) => {
            context.protocol_client_state = Some(client_state.clone());
            context.server_metadata = Some(server_metadata.clone());
            context.credentials_supported = credentials_supported.clone();
            context.credential_branding = credential_branding.clone();
            context.authorization_code_url = authorization_code_url.clone();
        }
        E::Done(O::CredentialSelection(selection)) => {
            context.credential_selection = selection.clone();
            // A single offered type needs no choice.
            if let [only] = selection.as_slice() {
                context.selected_credentials = vec![only.id.clone()];
                context.credential_selection[0].is_selected = true;
            }
        }
        E::Done(O::Contact(contact)) => context.contact = contact.clone(),
        E::SetContactAlias(alias) => context.contact_alias = Some(alias.clone()),
        E::SetContactConsent(consent) => context.has_contact_consent = *consent,
        E::CreateContact(party) => context.contact = Some(party.clone()),
        E::Done(O::IssuerBranding(stored)) => {
            context.issuer_branding_stored = context.issuer_branding_stored || *stored;
        }
        E::SetSelectedCredentials(ids) => {
            context.selected_credentials = ids.clone();
            for selection in &mut context.credential_selection {
                selection.is_selected = ids.contains(&selection.id);
            }
        }
        E::SetAuthorizationCodeUrl(url) => context.authorization_code_url = Some(url.clone()),
        E::ProvideAuthorizationCodeResponse(response)
        | E::Done(O::FirstParty(FirstPartyCompletion::Code(response))) => {
            context.authorization_code_response = Some(response.clone());
        }
        E::SetVerificationCode(code) => context.verification_code = Some(code.clone()),
        E::Done(O::CredentialsToAccept {
            client_state,
            credentials,
        }) => {
            context.protocol_client_state = Some(client_state.clone());
            context.credentials_to_accept = credentials.clone();
            context.verification_code = None;
        }
        E::Done(O::ContactIdentity(identity)) => {
            if let Some(contact) = &mut context.contact {
                contact.identities.push(identity.clone());
            }
        }
        E::Failed(error) => context.error = Some(error.clone()),
        E::Next
        | E::Previous
        | E::Decline
        | E::InvokedAuthorizationCodeRequest
        | E::Done(O::FirstParty(_))
        | E::Done(O::CredentialsVerified)
        | E::Done(O::CredentialBrandingStored)
        | E::Done(O::CredentialsStored) => {}
    }
    context
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::contact::{CorrelationIdentifier, Identity, IdentityOrigin, CredentialRole};

    pub(crate) fn context() -> MachineContext {
        let request = RequestData::parse(
            "openid-credential-offer://?credential_offer_uri=https%3A%2F%2Fissuer.example.com%2Foffer%2F1",
            None,
        )
        .unwrap();
        MachineContext::new(request, None)
    }

    #[test]
    fn single_type_is_selected_automatically() {
        let ctx = reduce(
            context(),
            &IssuanceEvent::Done(ServiceOutput::CredentialSelection(vec![
                CredentialTypeSelection::new("pid", "PID", "PID"),
            ])),
        );
        assert_eq!(ctx.selected_credentials, vec!["pid"]);
        assert!(ctx.credential_selection[0].is_selected);

        let ctx = reduce(
            context(),
            &IssuanceEvent::Done(ServiceOutput::CredentialSelection(vec![
                CredentialTypeSelection::new("a", "A", "A"),
                CredentialTypeSelection::new("b", "B", "B"),
            ])),
        );
        assert!(ctx.selected_credentials.is_empty());

        let ctx = reduce(ctx, &IssuanceEvent::SetSelectedCredentials(vec!["b".into()]));
        assert_eq!(ctx.selected_credentials, vec!["b"]);
        assert!(!ctx.credential_selection[0].is_selected);
        assert!(ctx.credential_selection[1].is_selected);
    }

    #[test]
    fn contact_setup_inputs() {
        let ctx = context();
        assert_eq!(ctx.contact_alias, None);
        assert!(ctx.has_contact_consent);

        let ctx = reduce(ctx, &IssuanceEvent::SetContactAlias("My Issuer".into()));
        let ctx = reduce(ctx, &IssuanceEvent::SetContactConsent(false));
        assert_eq!(ctx.contact_alias.as_deref(), Some("My Issuer"));
        assert!(!ctx.has_contact_consent);

        let ctx = reduce(ctx, &IssuanceEvent::SetContactAlias("Example".into()));
        let ctx = reduce(ctx, &IssuanceEvent::SetContactConsent(true));
        assert_eq!(ctx.contact_alias.as_deref(), Some("Example"));
        assert!(ctx.has_contact_consent);
    }

    #[test]
    fn configurations_follow_the_offer() {
        let configuration = |format: &str| -> CredentialConfigurationSupported {
            serde_json::from_value(serde_json::json!({ "format": format })).unwrap()
        };
        let request = RequestData::parse(
            "openid-credential-offer://?credential_offer=%7B%22credential_issuer%22%3A%22https%3A%2F%2Fissuer.example.com%22%2C%22credential_configuration_ids%22%3A%5B%22VerifiableId%22%2C%22Mdl%22%5D%7D",
            None,
        )
        .unwrap();
        let mut ctx = MachineContext::new(request, None);
        ctx.credentials_supported = BTreeMap::from([
            ("Mdl".to_owned(), configuration("mso_mdoc")),
            ("VerifiableId".to_owned(), configuration("jwt_vc_json")),
        ]);

        let ids: Vec<_> = ctx
            .offered_configurations()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, ["VerifiableId", "Mdl"]);
    }

    #[test]
    fn callback_seeds_authorization_code() {
        let state = ClientState::new("https://issuer.example.com");
        let request = RequestData::parse(
            "https://wallet.example.com/cb?code=abc&state=xyz",
            Some(state.clone()),
        )
        .unwrap();
        let ctx = MachineContext::new(request, Some("en".into()));
        assert_eq!(
            ctx.authorization_code_response.as_ref().map(|r| r.code.as_str()),
            Some("abc")
        );
        assert_eq!(ctx.protocol_client_state, Some(state));
    }

    #[test]
    fn identities_are_added_to_the_contact() {
        let ctx = reduce(
            context(),
            &IssuanceEvent::CreateContact(Party {
                id: "c1".into(),
                display_name: "Example Issuer".into(),
                identities: vec![],
            }),
        );
        let identity = Identity {
            id: Some("i1".into()),
            alias: "did:web:issuer.example.com".into(),
            origin: IdentityOrigin::External,
            roles: vec![CredentialRole::Issuer],
            identifier: CorrelationIdentifier::for_correlation_id("did:web:issuer.example.com"),
        };
        let ctx = reduce(
            ctx,
            &IssuanceEvent::Done(ServiceOutput::ContactIdentity(identity)),
        );
        assert!(ctx
            .contact
            .unwrap()
            .has_identity("did:web:issuer.example.com"));
    }

    #[test]
    fn issuer_branding_flag_is_sticky() {
        let ctx = reduce(
            context(),
            &IssuanceEvent::Done(ServiceOutput::IssuerBranding(true)),
        );
        let ctx = reduce(ctx, &IssuanceEvent::Done(ServiceOutput::IssuerBranding(false)));
        assert!(ctx.issuer_branding_stored);
    }
}
