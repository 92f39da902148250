use std::fmt;

use serde::{Deserialize, Serialize};

/// A failure normalized for storage in machine context.
///
/// Every invoked service that fails is reduced to one of these before the
/// machine moves to its error handling state, so that a UI can render it
/// without knowing which collaborator failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetails {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Capture an [anyhow::Error], keeping the full context chain.
    pub fn from_error(title: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            title: title.into(),
            message: format!("{error:#}"),
            stack: Some(format!("{error:?}")),
        }
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl std::error::Error for ErrorDetails {}

/// Errors raised while reading an issuance entry URI, before any flow exists.
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("cannot start an issuance flow without a uri")]
    MissingUri,
    #[error("invalid uri: {0}")]
    InvalidUri(#[from] url::ParseError),
    #[error("unsupported uri scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("no credential offer found in `{0}`")]
    MissingOffer(String),
    #[error("malformed credential offer: {0}")]
    MalformedOffer(#[from] serde_json::Error),
    #[error("an authorization callback can only resume a flow with an existing client state")]
    MissingClientState,
}

/// Errors raised while decoding an issued credential.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("credential response does not contain a credential")]
    MissingCredential,
    #[error("received an SD-JWT credential but no hasher is configured")]
    MissingHasher,
    #[error("unsupported digest algorithm `{0}`")]
    UnsupportedDigestAlgorithm(String),
    #[error("malformed JWT: {0}")]
    MalformedJwt(String),
    #[error("malformed SD-JWT: {0}")]
    MalformedSdJwt(String),
    #[error("malformed mdoc: {0}")]
    MalformedMdoc(String),
    #[error("unable to derive the issuer of the credential")]
    MissingIssuer,
}

/// Outcome of an authorization challenge request that did not yield a code.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationChallengeError {
    /// The issuer wants a presentation before it grants a code.
    #[error("insufficient_authorization")]
    InsufficientAuthorization {
        auth_session: Option<String>,
        presentation: Option<String>,
    },
    #[error("authorization challenge failed: {0:#}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IssuanceOptError {
    #[error("credential format `{0}` is not supported")]
    UnsupportedFormat(String),
    #[error("no signing suite preference configured for credential format `{0}`")]
    NoSuitePreference(String),
    #[error("no binding method preference configured")]
    NoBindingPreference,
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;

    #[test]
    fn details_keep_context_chain() {
        let error = Err::<(), _>(anyhow!("connection refused"))
            .context("unable to retrieve server metadata")
            .unwrap_err();
        let details = ErrorDetails::from_error("Initiating issuance failed", &error);

        assert_eq!(
            details.message,
            "unable to retrieve server metadata: connection refused"
        );
        assert!(details.stack.is_some());
        assert_eq!(
            details.to_string(),
            "Initiating issuance failed: unable to retrieve server metadata: connection refused"
        );
    }
}
