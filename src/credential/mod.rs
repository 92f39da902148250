//! Decoding issued credentials into one uniform shape.
//!
//! Issuers answer with JWT-VCs, JSON-LD documents, SD-JWTs or mdocs. The
//! holder reads each of them into a [UniformCredential] before it verifies,
//! brands, links or stores it.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use crate::{
    core::response::CredentialResponse, error::MappingError, issuance_opts::IssuanceOpt,
};

use self::{
    mdoc::MdocDecodedCredential,
    sd_jwt::{Hasher, SdJwtDecodedCredential},
};

pub mod jwt;
pub mod mdoc;
pub mod sd_jwt;
pub mod verify;

const MSO_MDOC_FORMAT: &str = "mso_mdoc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "credential", rename_all = "snake_case")]
pub enum UniformCredential {
    /// A W3C data model document, also for credentials issued as JWTs.
    W3c(Json),
    SdJwt(SdJwtDecodedCredential),
    MsoMdoc(MdocDecodedCredential),
}

impl UniformCredential {
    /// The issuer a credential is correlated with: a string `issuer`, an
    /// SD-JWT `iss`, or the `id` of a structured `issuer`, in that order.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            UniformCredential::W3c(vc) => match vc.get("issuer")? {
                Json::String(issuer) => Some(issuer.as_str()),
                issuer => issuer.get("id")?.as_str(),
            },
            UniformCredential::SdJwt(sd_jwt) => sd_jwt.issuer(),
            UniformCredential::MsoMdoc(mdoc) => mdoc.issuer.as_deref(),
        }
    }

    pub fn types(&self) -> Vec<String> {
        match self {
            UniformCredential::W3c(vc) => match vc.get("type") {
                Some(Json::String(t)) => vec![t.clone()],
                Some(Json::Array(types)) => types
                    .iter()
                    .filter_map(Json::as_str)
                    .map(ToOwned::to_owned)
                    .collect(),
                _ => vec![],
            },
            UniformCredential::SdJwt(sd_jwt) => sd_jwt.vct().map(ToOwned::to_owned).into_iter().collect(),
            UniformCredential::MsoMdoc(mdoc) => vec![mdoc.doc_type.clone()],
        }
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            UniformCredential::W3c(vc) => match vc.get("credentialSubject")? {
                Json::Array(subjects) => subjects.first()?.get("id")?.as_str(),
                subject => subject.get("id")?.as_str(),
            },
            UniformCredential::SdJwt(sd_jwt) => sd_jwt.decoded_payload.get("sub")?.as_str(),
            UniformCredential::MsoMdoc(_) => None,
        }
    }
}

/// A credential as received, together with what was asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialToAccept {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub issuance_opt: IssuanceOpt,
    pub credential_response: CredentialResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedCredentialToAccept {
    pub correlation_id: String,
    pub credential_to_accept: CredentialToAccept,
    pub types: Vec<String>,
    pub raw_credential: Json,
    pub uniform_credential: UniformCredential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_issuance_hint: Option<Json>,
}

impl MappedCredentialToAccept {
    /// The credential as it is stored.
    pub fn raw_document(&self) -> String {
        raw_document(&self.raw_credential)
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.raw_document())
    }
}

pub fn raw_document(raw: &Json) -> String {
    match raw {
        Json::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Lowercase hex SHA-256 of a stored credential.
pub fn content_hash(raw_document: &str) -> String {
    hex::encode(Sha256::digest(raw_document.as_bytes()))
}

/// Decode the credential in a provider response.
///
/// Tried in order: an already decoded SD-JWT, a compact SD-JWT (which needs
/// `hasher`), a decoded or encoded mdoc, then a W3C credential as JWT or JSON-LD.
pub fn map_credential_to_accept(
    credential_to_accept: CredentialToAccept,
    hasher: Option<&dyn Hasher>,
) -> Result<MappedCredentialToAccept, MappingError> {
    let response = &credential_to_accept.credential_response;
    let raw = response
        .first_credential()
        .cloned()
        .ok_or(MappingError::MissingCredential)?;
    let format = response
        .format
        .as_deref()
        .unwrap_or(&credential_to_accept.issuance_opt.format);

    let uniform_credential = match &raw {
        Json::Object(object) if object.contains_key("compactSdJwt") => {
            UniformCredential::SdJwt(
                serde_json::from_value(raw.clone())
                    .map_err(|e| MappingError::MalformedSdJwt(e.to_string()))?,
            )
        }
        Json::String(compact) if sd_jwt::is_sd_jwt(compact) => {
            let hasher = hasher.ok_or(MappingError::MissingHasher)?;
            UniformCredential::SdJwt(sd_jwt::decode(compact, hasher)?)
        }
        Json::Object(object) if object.contains_key("docType") => UniformCredential::MsoMdoc(
            serde_json::from_value(raw.clone())
                .map_err(|e| MappingError::MalformedMdoc(e.to_string()))?,
        ),
        Json::String(encoded) if format == MSO_MDOC_FORMAT => {
            UniformCredential::MsoMdoc(mdoc::decode_issuer_signed(encoded)?)
        }
        Json::String(token) => UniformCredential::W3c(jwt::jwt_vc_to_uniform(token)?),
        Json::Object(_) => UniformCredential::W3c(raw.clone()),
        _ => {
            return Err(MappingError::MalformedJwt(
                "credential is neither a string nor an object".into(),
            ))
        }
    };

    let correlation_id = uniform_credential
        .correlation_id()
        .ok_or(MappingError::MissingIssuer)?
        .to_owned();
    let types = uniform_credential.types();
    let subject_issuance_hint = response.credential_subject_issuance.clone();

    Ok(MappedCredentialToAccept {
        correlation_id,
        types,
        raw_credential: raw,
        uniform_credential,
        subject_issuance_hint,
        credential_to_accept,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        credential::{jwt::tests::unsigned_jwt, mdoc::tests::sample_issuer_signed, sd_jwt::tests::sample_sd_jwt},
        issuance_opts::{BindingMethod, CredentialFormat},
    };

    pub(crate) fn to_accept(format: &str, credential: Json) -> CredentialToAccept {
        CredentialToAccept {
            id: None,
            issuance_opt: IssuanceOpt {
                configuration_id: "test".into(),
                format: format.into(),
                format_kind: CredentialFormat::classify(format).unwrap(),
                types: vec![],
                crypto_suite: "ES256".into(),
                binding: BindingMethod::Jwk,
                identifier: None,
            },
            credential_response: CredentialResponse {
                credential: Some(credential),
                ..Default::default()
            },
        }
    }

    #[test]
    fn jwt_vc() {
        let jwt = unsigned_jwt(&json!({
            "iss": "did:web:university.example.edu",
            "vc": {
                "type": ["VerifiableCredential", "UniversityDegreeCredential"],
                "credentialSubject": {}
            }
        }));
        let mapped = map_credential_to_accept(to_accept("jwt_vc_json", json!(jwt)), None).unwrap();

        assert_eq!(mapped.correlation_id, "did:web:university.example.edu");
        assert_eq!(mapped.types, vec!["VerifiableCredential", "UniversityDegreeCredential"]);
        assert_eq!(mapped.raw_document(), jwt);
        assert_eq!(mapped.content_hash(), content_hash(&jwt));
    }

    #[test]
    fn structured_issuer() {
        let vc = json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential"],
            "issuer": { "id": "did:web:issuer.example.com", "name": "Example" },
            "credentialSubject": { "id": "did:example:holder" }
        });
        let mapped = map_credential_to_accept(to_accept("ldp_vc", vc), None).unwrap();
        assert_eq!(mapped.correlation_id, "did:web:issuer.example.com");
        assert_eq!(mapped.uniform_credential.subject_id(), Some("did:example:holder"));
    }

    #[test]
    fn sd_jwt_needs_a_hasher() {
        let compact = json!(sample_sd_jwt());
        assert!(matches!(
            map_credential_to_accept(to_accept("dc+sd-jwt", compact.clone()), None),
            Err(MappingError::MissingHasher)
        ));

        let mapped =
            map_credential_to_accept(to_accept("dc+sd-jwt", compact), Some(&sd_jwt::Sha256Hasher))
                .unwrap();
        assert_eq!(mapped.correlation_id, "https://pid-issuer.example.com");
        assert_eq!(mapped.types, vec!["urn:eudi:pid:1"]);

        let decoded = serde_json::to_value(match &mapped.uniform_credential {
            UniformCredential::SdJwt(decoded) => decoded,
            _ => panic!("expected an SD-JWT"),
        })
        .unwrap();
        let again = map_credential_to_accept(to_accept("dc+sd-jwt", decoded), None).unwrap();
        assert_eq!(again.uniform_credential, mapped.uniform_credential);
    }

    #[test]
    fn mdoc() {
        let mapped =
            map_credential_to_accept(to_accept("mso_mdoc", json!(sample_issuer_signed())), None)
                .unwrap();
        assert_eq!(mapped.correlation_id, "Utopia DMV");
        assert_eq!(mapped.types, vec!["org.iso.18013.5.1.mDL"]);
    }

    #[test]
    fn mapping_is_pure() {
        let to_accept = to_accept(
            "ldp_vc",
            json!({ "type": "VerifiableCredential", "issuer": "https://issuer.example.com" }),
        );
        let first = map_credential_to_accept(to_accept.clone(), None).unwrap();
        let second = map_credential_to_accept(to_accept, None).unwrap();
        assert_eq!(first.correlation_id, second.correlation_id);
        assert_eq!(first.uniform_credential, second.uniform_credential);
    }

    #[test]
    fn missing_credential() {
        let mut to_accept = to_accept("ldp_vc", json!({}));
        to_accept.credential_response.credential = None;
        assert!(matches!(
            map_credential_to_accept(to_accept, None),
            Err(MappingError::MissingCredential)
        ));
    }
}
