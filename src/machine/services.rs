use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;
use uuid::Uuid;

use crate::{
    branding::{
        credential_branding, issuer_locale_branding_from, primary_credential_type, select_locale,
        CredentialBranding, IssuerBranding,
    },
    config::HolderConfig,
    contact::{ContactFilter, CorrelationIdentifier, CredentialRole, Identity, IdentityOrigin, Party},
    core::{client_state::ClientState, util::AsyncHttpClient},
    credential::{
        map_credential_to_accept,
        sd_jwt::Hasher,
        verify::{CredentialVerification, VerificationOutcome},
        CredentialToAccept,
    },
    error::ErrorDetails,
    events::{EventEmitter, HolderEvent},
    first_party::{FirstPartyCompletion, FirstPartyContext, FirstPartyMachine, FirstPartyServices},
    issuance_opts::resolve_issuance_opts,
    provider::{
        client::{AccessTokenRequest, ClientOptions, IssuanceClientFactory},
        identifier::IdentifierProvider,
        presentation::{CredentialSelector, PresentationSigner},
        store::{BrandingStore, ContactStore, CredentialStore, DigitalCredential},
        verifier::CredentialVerifier,
    },
    utils::{issuer_host, to_human_readable_string},
};

use super::{
    context::{CredentialTypeSelection, MachineContext},
    state::{IssuanceEvent, IssuanceState, ServiceOutput},
};

const FIRST_PARTY_FAILED: &str = "First-party authorization failed";

/// Collaborators of an issuance flow.
#[derive(Debug, Clone)]
pub struct IssuanceServices {
    pub config: HolderConfig,
    pub client_factory: Arc<dyn IssuanceClientFactory>,
    pub identifier_provider: Arc<dyn IdentifierProvider>,
    pub contact_store: Arc<dyn ContactStore>,
    pub credential_store: Arc<dyn CredentialStore>,
    pub branding_store: Arc<dyn BrandingStore>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub http_client: Arc<dyn AsyncHttpClient>,
    /// Needed to read SD-JWT credentials.
    pub hasher: Option<Arc<dyn Hasher>>,
    pub emitter: Arc<dyn EventEmitter>,
    /// Needed for first-party authorization only.
    pub presentation_signer: Option<Arc<dyn PresentationSigner>>,
    pub credential_selector: Option<Arc<dyn CredentialSelector>>,
}

impl IssuanceServices {
    /// Run the service of `state`, turning its outcome into the event that completes it.
    pub(crate) async fn invoke(
        &self,
        state: IssuanceState,
        context: &MachineContext,
    ) -> Option<IssuanceEvent> {
        use IssuanceState as S;

        let (title, result) = match state {
            S::InitiateOid4vci => ("Initiating issuance failed", self.initiate(context).await),
            S::CreateCredentialSelection => (
                "Creating the credential selection failed",
                Ok(ServiceOutput::CredentialSelection(
                    self.create_credential_selection(context),
                )),
            ),
            S::GetContact => (
                "Retrieving the contact failed",
                self.get_contact(context).await.map(ServiceOutput::Contact),
            ),
            S::AddIssuerBranding | S::AddIssuerBrandingAfterIdentity => (
                "Adding issuer branding failed",
                self.add_issuer_branding(context)
                    .await
                    .map(ServiceOutput::IssuerBranding),
            ),
            S::StartFirstPartyApplicationFlow => {
                return Some(match self.start_first_party_application_flow(context).await {
                    Ok(completion) => IssuanceEvent::Done(ServiceOutput::FirstParty(completion)),
                    Err(error) => IssuanceEvent::Failed(error),
                })
            }
            S::GetCredentials => (
                "Getting credentials failed",
                self.get_credentials(context).await,
            ),
            S::VerifyCredentials => (
                "Verifying credentials failed",
                self.verify_credentials(context)
                    .await
                    .map(|()| ServiceOutput::CredentialsVerified),
            ),
            S::AddContactIdentity => (
                "Adding the contact identity failed",
                self.add_contact_identity(context)
                    .await
                    .map(ServiceOutput::ContactIdentity),
            ),
            S::StoreCredentialBranding => (
                "Storing credential branding failed",
                self.store_credential_branding(context)
                    .await
                    .map(|()| ServiceOutput::CredentialBrandingStored),
            ),
            S::StoreCredentials => (
                "Storing credentials failed",
                self.store_credentials(context)
                    .await
                    .map(|()| ServiceOutput::CredentialsStored),
            ),
            _ => return None,
        };
        Some(match result {
            Ok(output) => IssuanceEvent::Done(output),
            Err(error) => IssuanceEvent::Failed(ErrorDetails::from_error(title, &error)),
        })
    }

    async fn initiate(&self, context: &MachineContext) -> Result<ServiceOutput> {
        let mut client = match &context.protocol_client_state {
            Some(state) => self.client_factory.from_state(state).await?,
            None => {
                let options = ClientOptions {
                    client_id: self.config.client_id.clone(),
                    redirect_uri: self.config.redirect_uri.clone(),
                };
                self.client_factory
                    .from_uri(&context.request_data, &options)
                    .await?
            }
        };
        let server_metadata = client
            .retrieve_server_metadata()
            .await
            .context("unable to retrieve server metadata")?;
        let mut credentials_supported = client.credentials_supported()?;
        if credentials_supported.is_empty() {
            bail!("the issuer supports none of the offered credentials")
        }
        credentials_supported.retain(|id, configuration| {
            let accepted = self
                .config
                .vc_format_preferences
                .contains(&configuration.format);
            if !accepted {
                debug!(configuration_id = %id, format = %configuration.format, "offered format not accepted");
            }
            accepted
        });
        if credentials_supported.is_empty() {
            bail!("the wallet accepts none of the offered credential formats")
        }
        let credential_branding = credential_branding(credentials_supported.values());

        Ok(ServiceOutput::Initiated {
            client_state: client.export_state()?,
            server_metadata,
            credential_branding,
            authorization_code_url: client.authorization_url().cloned(),
            credentials_supported,
        })
    }

    fn create_credential_selection(&self, context: &MachineContext) -> Vec<CredentialTypeSelection> {
        let locale = context
            .locale
            .as_deref()
            .or(self.config.default_locale.as_deref());

        context
            .offered_configurations()
            .into_iter()
            .map(|(id, configuration)| {
                let types = configuration.types();
                let credential_type = primary_credential_type(&types).unwrap_or(id).to_owned();
                let alias = context
                    .credential_branding
                    .get(&credential_type)
                    .and_then(|branding| select_locale(branding, locale, |b| b.locale.as_deref()))
                    .and_then(|branding| branding.alias.clone())
                    .unwrap_or_else(|| to_human_readable_string(&credential_type));
                CredentialTypeSelection::new(id, credential_type, alias)
            })
            .collect()
    }

    async fn get_contact(&self, context: &MachineContext) -> Result<Option<Party>> {
        let correlation_id = issuer_host(client_state(context)?.issuer())?;
        let contacts = self
            .contact_store
            .get_contacts(&ContactFilter::by_correlation_id(&correlation_id))
            .await
            .context("unable to look up contacts")?;
        debug!(%correlation_id, found = contacts.len(), "looked up issuer contact");
        Ok(contacts.into_iter().next())
    }

    /// Returns whether branding for the issuer is in the store afterwards.
    async fn add_issuer_branding(&self, context: &MachineContext) -> Result<bool> {
        let issuer_correlation_id = issuer_host(client_state(context)?.issuer())?;
        if self
            .branding_store
            .issuer_branding(&issuer_correlation_id)
            .await?
            .is_some()
        {
            debug!(%issuer_correlation_id, "issuer branding already stored");
            return Ok(true);
        }

        let locale_branding: Vec<_> = context
            .server_metadata
            .as_ref()
            .and_then(|metadata| metadata.credential_issuer_metadata.as_ref())
            .map(|metadata| metadata.display.iter().map(issuer_locale_branding_from).collect())
            .unwrap_or_default();
        if locale_branding.is_empty() {
            return Ok(false);
        }

        self.branding_store
            .add_issuer_branding(IssuerBranding {
                issuer_correlation_id,
                locale_branding,
            })
            .await
            .context("unable to store issuer branding")?;
        Ok(true)
    }

    async fn start_first_party_application_flow(
        &self,
        context: &MachineContext,
    ) -> Result<FirstPartyCompletion, ErrorDetails> {
        let (Some(presentation_signer), Some(selector)) =
            (&self.presentation_signer, &self.credential_selector)
        else {
            return Err(ErrorDetails::new(
                FIRST_PARTY_FAILED,
                "a presentation signer and a credential selector are required",
            ));
        };
        let Some(client_state) = context.protocol_client_state.clone() else {
            return Err(ErrorDetails::new(
                FIRST_PARTY_FAILED,
                "missing protocol client state",
            ));
        };

        let services = FirstPartyServices {
            client_factory: self.client_factory.clone(),
            identifier_provider: self.identifier_provider.clone(),
            presentation_signer: presentation_signer.clone(),
            http_client: self.http_client.clone(),
        };
        FirstPartyMachine::new(
            services,
            FirstPartyContext::new(client_state, context.contact.clone()),
        )
        .run(selector.as_ref())
        .await
    }

    async fn get_credentials(&self, context: &MachineContext) -> Result<ServiceOutput> {
        let mut client = self.client_factory.from_state(client_state(context)?).await?;
        if !client.has_access_token() {
            client
                .acquire_access_token(AccessTokenRequest {
                    pin: context.verification_code.clone(),
                    code: context.authorization_code_response.clone(),
                    redirect_uri: self.config.redirect_uri.clone(),
                })
                .await
                .context("unable to acquire an access token")?;
        }

        let selected = context
            .selected_configurations()
            .map(|(id, configuration)| {
                configuration
                    .map(|configuration| (id, configuration))
                    .with_context(|| format!("credential configuration `{id}` was not offered"))
            })
            .collect::<Result<Vec<_>>>()?;
        if selected.is_empty() {
            bail!("no credentials selected")
        }
        let opts = resolve_issuance_opts(selected, &self.config, client.is_ebsi())?;

        let mut credentials = Vec::with_capacity(opts.len());
        for mut opt in opts {
            let identifier = self
                .identifier_provider
                .issuance_identifier(&opt)
                .await
                .context("unable to get a key to bind the credential to")?;
            opt.identifier = Some(identifier);
            let credential_response = client
                .acquire_credential(&opt)
                .await
                .with_context(|| format!("unable to acquire credential `{}`", opt.configuration_id))?;
            let credential_to_accept = CredentialToAccept {
                id: Some(Uuid::new_v4().to_string()),
                issuance_opt: opt,
                credential_response,
            };
            credentials.push(map_credential_to_accept(
                credential_to_accept,
                self.hasher.as_deref(),
            )?);
        }

        Ok(ServiceOutput::CredentialsToAccept {
            client_state: client.export_state()?,
            credentials,
        })
    }

    async fn verify_credentials(&self, context: &MachineContext) -> Result<()> {
        let verification = CredentialVerification {
            verifier: self.verifier.as_ref(),
            http_client: self.http_client.as_ref(),
            hasher: self.hasher.as_deref(),
            config: &self.config,
        };
        for mapped in &context.credentials_to_accept {
            let (_, outcome) = verification
                .verify_credential_to_accept(&mapped.credential_to_accept)
                .await?;
            if let VerificationOutcome::Rejected { message } = outcome {
                bail!(message)
            }
        }
        Ok(())
    }

    async fn add_contact_identity(&self, context: &MachineContext) -> Result<Identity> {
        let contact = context.contact.as_ref().context("missing contact")?;
        let credential = context
            .credentials_to_accept
            .first()
            .context("no credentials to accept")?;

        let identity = Identity {
            id: None,
            alias: credential.correlation_id.clone(),
            origin: IdentityOrigin::External,
            roles: vec![CredentialRole::Issuer],
            identifier: CorrelationIdentifier::for_correlation_id(&credential.correlation_id),
        };
        let identity = self
            .contact_store
            .add_identity(&contact.id, identity)
            .await
            .context("unable to add the identity to the contact")?;

        self.emitter.emit(HolderEvent::ContactIdentityCreated {
            contact_id: contact.id.clone(),
            identity: identity.clone(),
        });
        Ok(identity)
    }

    async fn store_credential_branding(&self, context: &MachineContext) -> Result<()> {
        for mapped in &context.credentials_to_accept {
            let offered_types = &mapped.credential_to_accept.issuance_opt.types;
            let locale_branding = [offered_types, &mapped.types]
                .into_iter()
                .filter_map(|types| primary_credential_type(types))
                .find_map(|credential_type| context.credential_branding.get(credential_type))
                .filter(|branding| !branding.is_empty());
            let Some(locale_branding) = locale_branding else {
                debug!(issuer = %mapped.correlation_id, "no branding for credential");
                continue;
            };

            self.branding_store
                .add_credential_branding(CredentialBranding {
                    vc_hash: mapped.content_hash(),
                    issuer_correlation_id: mapped.correlation_id.clone(),
                    locale_branding: locale_branding.clone(),
                })
                .await
                .context("unable to store credential branding")?;
        }
        Ok(())
    }

    async fn store_credentials(&self, context: &MachineContext) -> Result<()> {
        for mapped in &context.credentials_to_accept {
            let identifier = mapped.credential_to_accept.issuance_opt.identifier.as_ref();
            let credential = DigitalCredential {
                id: mapped
                    .credential_to_accept
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                hash: mapped.content_hash(),
                raw_document: mapped.raw_document(),
                credential_role: CredentialRole::Holder,
                issuer_correlation_type: CorrelationIdentifier::for_correlation_id(
                    &mapped.correlation_id,
                )
                .kind,
                issuer_correlation_id: mapped.correlation_id.clone(),
                subject_correlation_id: mapped
                    .uniform_credential
                    .subject_id()
                    .map(ToOwned::to_owned)
                    .or_else(|| identifier.map(|identifier| identifier.subject().to_owned())),
                kms_key_ref: identifier.map(|identifier| identifier.kid.clone()),
                identifier_method: identifier.map(|identifier| identifier.method.to_string()),
            };

            let credential = self
                .credential_store
                .save(credential)
                .await
                .context("unable to store the credential")?;
            self.emitter.emit(HolderEvent::CredentialStored {
                vc_hash: credential.hash.clone(),
                credential,
            });
        }
        Ok(())
    }
}

fn client_state(context: &MachineContext) -> Result<&ClientState> {
    context
        .protocol_client_state
        .as_ref()
        .context("missing protocol client state")
}
