use anyhow::{anyhow, Context, Result};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{HolderConfig, SchemaValidation},
    core::util::{get_json, AsyncHttpClient},
    error::MappingError,
    provider::verifier::{CredentialVerifier, VerificationPolicies, VerificationResult},
};

use super::{
    map_credential_to_accept, sd_jwt::Hasher, CredentialToAccept, MappedCredentialToAccept,
    UniformCredential,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    Rejected { message: String },
}

impl VerificationOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Everything needed to check a freshly issued credential.
#[derive(Debug, Clone, Copy)]
pub struct CredentialVerification<'a> {
    pub verifier: &'a dyn CredentialVerifier,
    pub http_client: &'a dyn AsyncHttpClient,
    pub hasher: Option<&'a dyn Hasher>,
    pub config: &'a HolderConfig,
}

impl CredentialVerification<'_> {
    /// Decode and verify one received credential.
    ///
    /// A response without a credential, or one that cannot be decoded, is an
    /// error. A credential that does not verify is a [VerificationOutcome::Rejected].
    /// Status, expiration and issuance dates are not checked.
    pub async fn verify_credential_to_accept(
        &self,
        credential_to_accept: &CredentialToAccept,
    ) -> Result<(MappedCredentialToAccept, VerificationOutcome)> {
        if credential_to_accept
            .credential_response
            .first_credential()
            .is_none()
        {
            return Err(MappingError::MissingCredential.into());
        }
        let mapped = map_credential_to_accept(credential_to_accept.clone(), self.hasher)
            .context("unable to decode the received credential")?;

        let outcome = if self.is_conformance_credential(&mapped) {
            debug!(
                issuer = %mapped.correlation_id,
                "skipping issuer verification of a conformance test credential"
            );
            VerificationOutcome::Verified
        } else {
            let result = self.verify_proof(&mapped).await?;
            if result.verified {
                VerificationOutcome::Verified
            } else {
                let reason = result.error.unwrap_or_else(|| "unknown reason".into());
                warn!(issuer = %mapped.correlation_id, %reason, "credential did not verify");
                VerificationOutcome::rejected(format!(
                    "The credential could not be verified: {reason}"
                ))
            }
        };
        if outcome != VerificationOutcome::Verified {
            return Ok((mapped, outcome));
        }

        let outcome = self.validate_schemas(&mapped).await?;
        Ok((mapped, outcome))
    }

    fn is_conformance_credential(&self, mapped: &MappedCredentialToAccept) -> bool {
        self.config.is_ledgerless_issuer(&mapped.correlation_id)
            && mapped
                .raw_document()
                .contains(self.config.conformance_marker.as_str())
    }

    async fn verify_proof(&self, mapped: &MappedCredentialToAccept) -> Result<VerificationResult> {
        match &mapped.uniform_credential {
            UniformCredential::SdJwt(sd_jwt) => {
                self.verifier.verify_sd_jwt(&sd_jwt.compact_sd_jwt).await
            }
            UniformCredential::MsoMdoc(_) => {
                let Json::String(encoded) = &mapped.raw_credential else {
                    return Ok(VerificationResult::failed(
                        "decoded mdocs carry no issuer signature to verify",
                    ));
                };
                self.verifier.verify_mdoc_issuer_signature(encoded).await
            }
            UniformCredential::W3c(_) => {
                self.verifier
                    .verify_credential(&mapped.raw_credential, &VerificationPolicies::issuance())
                    .await
            }
        }
    }

    async fn validate_schemas(&self, mapped: &MappedCredentialToAccept) -> Result<VerificationOutcome> {
        let UniformCredential::W3c(vc) = &mapped.uniform_credential else {
            return Ok(VerificationOutcome::Verified);
        };
        if self.config.schema_validation == SchemaValidation::Never {
            return Ok(VerificationOutcome::Verified);
        }

        let schemas = credential_schemas(vc);
        if schemas.is_empty() {
            if self.config.schema_validation == SchemaValidation::Always {
                return Ok(VerificationOutcome::rejected(
                    "The credential does not declare a credential schema",
                ));
            }
            return Ok(VerificationOutcome::Verified);
        }

        for schema_url in schemas {
            let schema = get_json(self.http_client, &schema_url)
                .await
                .context("unable to retrieve credential schema")?;
            let errors = validate_against(&schema, vc)
                .with_context(|| format!("invalid credential schema at {schema_url}"))?;
            if !errors.is_empty() {
                return Ok(VerificationOutcome::rejected(format!(
                    "The credential does not match its schema {schema_url}: {}",
                    errors.join("; ")
                )));
            }
        }
        Ok(VerificationOutcome::Verified)
    }
}

/// `credentialSchema` ids, whether given as one object or a list.
fn credential_schemas(vc: &Json) -> Vec<Url> {
    let schemas = match vc.get("credentialSchema") {
        Some(Json::Array(schemas)) => schemas.iter().collect(),
        Some(schema) => vec![schema],
        None => vec![],
    };
    schemas
        .into_iter()
        .filter_map(|schema| schema.get("id")?.as_str()?.parse().ok())
        .collect()
}

fn validate_against(schema: &Json, instance: &Json) -> Result<Vec<String>> {
    let compiled = JSONSchema::compile(schema).map_err(|e| anyhow!("{e}"))?;
    let errors = match compiled.validate(instance) {
        Ok(()) => vec![],
        Err(errors) => errors.map(|error| error.to_string()).collect(),
    };
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http::{Request, Response};
    use serde_json::json;

    use super::*;
    use crate::credential::tests::to_accept;

    #[derive(Debug, Default)]
    struct Engine {
        reject: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl CredentialVerifier for Engine {
        async fn verify_credential(
            &self,
            _credential: &Json,
            policies: &VerificationPolicies,
        ) -> Result<VerificationResult> {
            assert_eq!(*policies, VerificationPolicies::default());
            self.calls.lock().unwrap().push("credential");
            Ok(if self.reject {
                VerificationResult::failed("invalid signature")
            } else {
                VerificationResult::verified()
            })
        }

        async fn verify_sd_jwt(&self, _credential: &str) -> Result<VerificationResult> {
            self.calls.lock().unwrap().push("sd_jwt");
            Ok(VerificationResult::verified())
        }

        async fn verify_mdoc_issuer_signature(&self, _credential: &str) -> Result<VerificationResult> {
            self.calls.lock().unwrap().push("mdoc");
            Ok(VerificationResult::verified())
        }
    }

    #[derive(Debug)]
    struct SchemaHost(Json);

    #[async_trait]
    impl AsyncHttpClient for SchemaHost {
        async fn execute(&self, _request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
            Ok(Response::builder()
                .status(200)
                .body(self.0.to_string().into_bytes())?)
        }
    }

    fn degree(name: Json) -> Json {
        json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "issuer": "did:web:university.example.edu",
            "credentialSchema": {
                "id": "https://university.example.edu/schemas/degree.json",
                "type": "JsonSchema"
            },
            "credentialSubject": { "name": name }
        })
    }

    fn schema() -> SchemaHost {
        SchemaHost(json!({
            "type": "object",
            "properties": {
                "credentialSubject": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }
            }
        }))
    }

    #[tokio::test]
    async fn verified_and_schema_checked() {
        let engine = Engine::default();
        let http = schema();
        let config = HolderConfig::default();
        let verification = CredentialVerification {
            verifier: &engine,
            http_client: &http,
            hasher: None,
            config: &config,
        };

        let (_, outcome) = verification
            .verify_credential_to_accept(&to_accept("ldp_vc", degree(json!("Alice"))))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationOutcome::Verified);

        let (_, outcome) = verification
            .verify_credential_to_accept(&to_accept("ldp_vc", degree(json!(42))))
            .await
            .unwrap();
        assert!(matches!(outcome, VerificationOutcome::Rejected { message } if message.contains("schema")));
        assert_eq!(*engine.calls.lock().unwrap(), vec!["credential", "credential"]);
    }

    #[tokio::test]
    async fn rejected_by_engine() {
        let engine = Engine {
            reject: true,
            ..Default::default()
        };
        let http = schema();
        let config = HolderConfig::default();
        let verification = CredentialVerification {
            verifier: &engine,
            http_client: &http,
            hasher: None,
            config: &config,
        };

        let (_, outcome) = verification
            .verify_credential_to_accept(&to_accept("ldp_vc", degree(json!("Alice"))))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected {
                message: "The credential could not be verified: invalid signature".into()
            }
        );
    }

    #[tokio::test]
    async fn conformance_credentials_skip_the_engine() {
        let engine = Engine {
            reject: true,
            ..Default::default()
        };
        let http = schema();
        let config = HolderConfig::default();
        let verification = CredentialVerification {
            verifier: &engine,
            http_client: &http,
            hasher: None,
            config: &config,
        };
        let mut vc = degree(json!("Alice"));
        vc["issuer"] = json!("did:ebsi:zz7XsC9ixAXuZecoD9sZEM1");
        vc["termsOfUse"] = json!({ "id": "vc:ebsi:conformance#terms" });

        let (_, outcome) = verification
            .verify_credential_to_accept(&to_accept("ldp_vc", vc))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationOutcome::Verified);
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_an_error() {
        let engine = Engine::default();
        let http = schema();
        let config = HolderConfig::default();
        let verification = CredentialVerification {
            verifier: &engine,
            http_client: &http,
            hasher: None,
            config: &config,
        };
        let mut to_accept = to_accept("ldp_vc", json!({}));
        to_accept.credential_response.credential = None;

        assert!(verification
            .verify_credential_to_accept(&to_accept)
            .await
            .is_err());
    }
}
