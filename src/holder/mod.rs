use std::sync::Arc;

use anyhow::{bail, Result};

use crate::{
    config::HolderConfig,
    core::{
        client_state::ClientState,
        offer::RequestData,
        util::{AsyncHttpClient, ReqwestClient},
    },
    credential::sd_jwt::{Hasher, Sha256Hasher},
    events::{EventEmitter, TracingEmitter},
    machine::{IssuanceMachine, IssuanceServices, MachineContext},
    provider::{
        client::IssuanceClientFactory,
        identifier::IdentifierProvider,
        presentation::{CredentialSelector, PresentationSigner},
        store::{BrandingStore, ContactStore, CredentialStore},
        verifier::CredentialVerifier,
    },
};

/// A wallet's entry point into credential issuance.
#[derive(Debug, Clone)]
pub struct Holder {
    services: IssuanceServices,
}

impl Holder {
    /// Build a new holder.
    pub fn builder() -> HolderBuilder {
        HolderBuilder::default()
    }

    pub fn config(&self) -> &HolderConfig {
        &self.services.config
    }

    /// Start an issuance flow for an offer or authorization callback.
    ///
    /// The returned machine has not run yet, see [IssuanceMachine::start].
    pub fn issuance(&self, request_data: RequestData, locale: Option<String>) -> IssuanceMachine {
        let locale = locale.or_else(|| self.services.config.default_locale.clone());
        IssuanceMachine::new(
            self.services.clone(),
            MachineContext::new(request_data, locale),
        )
    }

    /// Parse `uri` and start an issuance flow for it.
    ///
    /// `existing_client_state` is the checkpoint of the flow an authorization
    /// callback belongs to.
    pub fn issuance_from_uri(
        &self,
        uri: &str,
        existing_client_state: Option<ClientState>,
        locale: Option<String>,
    ) -> Result<IssuanceMachine> {
        let request_data = RequestData::parse(uri, existing_client_state)?;
        Ok(self.issuance(request_data, locale))
    }
}

/// Builder struct for [Holder].
#[derive(Debug, Clone, Default)]
pub struct HolderBuilder {
    config: HolderConfig,
    client_factory: Option<Arc<dyn IssuanceClientFactory>>,
    identifier_provider: Option<Arc<dyn IdentifierProvider>>,
    contact_store: Option<Arc<dyn ContactStore>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    branding_store: Option<Arc<dyn BrandingStore>>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    http_client: Option<Arc<dyn AsyncHttpClient>>,
    hasher: Option<Arc<dyn Hasher>>,
    emitter: Option<Arc<dyn EventEmitter>>,
    presentation_signer: Option<Arc<dyn PresentationSigner>>,
    credential_selector: Option<Arc<dyn CredentialSelector>>,
}

impl HolderBuilder {
    /// Build the holder.
    ///
    /// The HTTP client defaults to [ReqwestClient],
    /// the hasher to [Sha256Hasher] and the event emitter to [TracingEmitter].
    pub fn build(self) -> Result<Holder> {
        let Self {
            config,
            client_factory,
            identifier_provider,
            contact_store,
            credential_store,
            branding_store,
            verifier,
            http_client,
            hasher,
            emitter,
            presentation_signer,
            credential_selector,
        } = self;

        let Some(client_factory) = client_factory else {
            bail!("client factory is required, see `with_client_factory`")
        };
        let Some(identifier_provider) = identifier_provider else {
            bail!("identifier provider is required, see `with_identifier_provider`")
        };
        let Some(contact_store) = contact_store else {
            bail!("contact store is required, see `with_contact_store`")
        };
        let Some(credential_store) = credential_store else {
            bail!("credential store is required, see `with_credential_store`")
        };
        let Some(branding_store) = branding_store else {
            bail!("branding store is required, see `with_branding_store`")
        };
        let Some(verifier) = verifier else {
            bail!("credential verifier is required, see `with_verifier`")
        };
        let http_client: Arc<dyn AsyncHttpClient> = match http_client {
            Some(http_client) => http_client,
            None => Arc::new(ReqwestClient::new()?),
        };

        Ok(Holder {
            services: IssuanceServices {
                config,
                client_factory,
                identifier_provider,
                contact_store,
                credential_store,
                branding_store,
                verifier,
                http_client,
                hasher: Some(hasher.unwrap_or_else(|| Arc::new(Sha256Hasher))),
                emitter: emitter.unwrap_or_else(|| Arc::new(TracingEmitter)),
                presentation_signer,
                credential_selector,
            },
        })
    }

    pub fn with_config(mut self, config: HolderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the factory of the OID4VCI protocol clients.
    pub fn with_client_factory(mut self, client_factory: Arc<dyn IssuanceClientFactory>) -> Self {
        self.client_factory = Some(client_factory);
        self
    }

    pub fn with_identifier_provider(
        mut self,
        identifier_provider: Arc<dyn IdentifierProvider>,
    ) -> Self {
        self.identifier_provider = Some(identifier_provider);
        self
    }

    pub fn with_contact_store(mut self, contact_store: Arc<dyn ContactStore>) -> Self {
        self.contact_store = Some(contact_store);
        self
    }

    pub fn with_credential_store(mut self, credential_store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(credential_store);
        self
    }

    pub fn with_branding_store(mut self, branding_store: Arc<dyn BrandingStore>) -> Self {
        self.branding_store = Some(branding_store);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn AsyncHttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Enable first-party authorization: the signer answers the issuer's
    /// presentation request with the credentials `selector` picks.
    pub fn with_first_party(
        mut self,
        presentation_signer: Arc<dyn PresentationSigner>,
        selector: Arc<dyn CredentialSelector>,
    ) -> Self {
        self.presentation_signer = Some(presentation_signer);
        self.credential_selector = Some(selector);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_collaborators_are_named() {
        let error = Holder::builder().build().unwrap_err();
        assert_eq!(
            error.to_string(),
            "client factory is required, see `with_client_factory`"
        );
    }
}
