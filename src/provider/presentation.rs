use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{
    provider::{identifier::ManagedIdentifier, store::DigitalCredential},
    siop::AuthorizationRequestData,
    utils::NonEmptyVec,
};

/// Authorization response parameters, ready to be posted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vp_token: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Builds and signs the presentation answering a first-party authorization request.
#[async_trait]
pub trait PresentationSigner: Debug + Send + Sync {
    async fn sign_response(
        &self,
        request: &AuthorizationRequestData,
        credentials: &[DigitalCredential],
        identifier: &ManagedIdentifier,
    ) -> Result<SignedResponse>;
}

/// The user's answer when asked which credentials to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(NonEmptyVec<DigitalCredential>),
    /// Go back without presenting.
    Previous,
    Decline,
}

/// Interactive input of the first-party flow.
#[async_trait]
pub trait CredentialSelector: Debug + Send + Sync {
    async fn select(&self, request: &AuthorizationRequestData) -> Result<Selection>;
}
