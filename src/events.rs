use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{contact::Identity, provider::store::DigitalCredential};

/// Notifications emitted while an issuance flow persists data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HolderEvent {
    ContactIdentityCreated {
        contact_id: String,
        identity: Identity,
    },
    CredentialStored {
        vc_hash: String,
        credential: DigitalCredential,
    },
}

pub trait EventEmitter: Debug + Send + Sync {
    fn emit(&self, event: HolderEvent);
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: HolderEvent) {
        match &event {
            HolderEvent::ContactIdentityCreated {
                contact_id,
                identity,
            } => info!(
                %contact_id,
                correlation_id = identity.correlation_id(),
                "contact identity created"
            ),
            HolderEvent::CredentialStored { vc_hash, .. } => {
                info!(%vc_hash, "credential stored")
            }
        }
    }
}
