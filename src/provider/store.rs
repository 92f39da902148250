use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    branding::{CredentialBranding, IssuerBranding},
    contact::{ContactFilter, CorrelationIdentifierType, CredentialRole, Identity, Party},
};

/// A credential as persisted by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalCredential {
    pub id: String,
    /// Content hash of `raw_document`.
    pub hash: String,
    pub raw_document: String,
    pub credential_role: CredentialRole,
    pub issuer_correlation_type: CorrelationIdentifierType,
    pub issuer_correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_method: Option<String>,
}

#[async_trait]
pub trait ContactStore: Debug + Send + Sync {
    async fn get_contacts(&self, filter: &ContactFilter) -> Result<Vec<Party>>;

    async fn add_contact(&self, party: Party) -> Result<Party>;

    /// Link an identity to an existing contact, returning it with its assigned id.
    async fn add_identity(&self, contact_id: &str, identity: Identity) -> Result<Identity>;
}

#[async_trait]
pub trait CredentialStore: Debug + Send + Sync {
    async fn save(&self, credential: DigitalCredential) -> Result<DigitalCredential>;

    async fn get_by_hash(&self, hash: &str) -> Result<Option<DigitalCredential>>;
}

#[async_trait]
pub trait BrandingStore: Debug + Send + Sync {
    async fn add_credential_branding(&self, branding: CredentialBranding) -> Result<()>;

    async fn issuer_branding(&self, issuer_correlation_id: &str) -> Result<Option<IssuerBranding>>;

    async fn add_issuer_branding(&self, branding: IssuerBranding) -> Result<()>;
}

/// A local in-memory contact store. Not for production use!
///
/// # Warning
/// This in-memory store should only be used for test purposes.
#[derive(Debug, Clone, Default)]
pub struct MemoryContactStore {
    store: Arc<Mutex<BTreeMap<String, Party>>>,
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn get_contacts(&self, filter: &ContactFilter) -> Result<Vec<Party>> {
        Ok(self
            .store
            .try_lock()?
            .values()
            .filter(|party| filter.matches(party))
            .cloned()
            .collect())
    }

    async fn add_contact(&self, party: Party) -> Result<Party> {
        self.store
            .try_lock()?
            .insert(party.id.clone(), party.clone());
        Ok(party)
    }

    async fn add_identity(&self, contact_id: &str, mut identity: Identity) -> Result<Identity> {
        let mut store = self.store.try_lock()?;
        let Some(party) = store.get_mut(contact_id) else {
            bail!("contact not found")
        };
        if identity.id.is_none() {
            identity.id = Some(Uuid::new_v4().to_string());
        }
        party.identities.push(identity.clone());
        Ok(identity)
    }
}

/// A local in-memory credential store, keyed by content hash. Not for production use!
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    store: Arc<Mutex<BTreeMap<String, DigitalCredential>>>,
}

impl MemoryCredentialStore {
    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, credential: DigitalCredential) -> Result<DigitalCredential> {
        self.store
            .try_lock()?
            .insert(credential.hash.clone(), credential.clone());
        Ok(credential)
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Option<DigitalCredential>> {
        Ok(self.store.try_lock()?.get(hash).cloned())
    }
}

/// A local in-memory branding store. Not for production use!
#[derive(Debug, Clone, Default)]
pub struct MemoryBrandingStore {
    credentials: Arc<Mutex<BTreeMap<String, CredentialBranding>>>,
    issuers: Arc<Mutex<BTreeMap<String, IssuerBranding>>>,
}

impl MemoryBrandingStore {
    pub async fn credential_branding(&self, vc_hash: &str) -> Option<CredentialBranding> {
        self.credentials.lock().await.get(vc_hash).cloned()
    }
}

#[async_trait]
impl BrandingStore for MemoryBrandingStore {
    async fn add_credential_branding(&self, branding: CredentialBranding) -> Result<()> {
        self.credentials
            .try_lock()?
            .insert(branding.vc_hash.clone(), branding);
        Ok(())
    }

    async fn issuer_branding(&self, issuer_correlation_id: &str) -> Result<Option<IssuerBranding>> {
        Ok(self.issuers.try_lock()?.get(issuer_correlation_id).cloned())
    }

    async fn add_issuer_branding(&self, branding: IssuerBranding) -> Result<()> {
        if self
            .issuers
            .try_lock()?
            .insert(branding.issuer_correlation_id.clone(), branding)
            .is_some()
        {
            bail!("issuer branding already exists")
        }
        Ok(())
    }
}
