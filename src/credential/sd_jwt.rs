//! Selective disclosure JWT decoding.

use std::{collections::BTreeMap, fmt::Debug};

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use sha2::{Digest, Sha256};

use crate::error::MappingError;

use super::jwt;

const DEFAULT_SD_ALG: &str = "sha-256";

/// Digest function used to match disclosures to `_sd` entries.
pub trait Hasher: Debug + Send + Sync {
    fn digest(&self, alg: &str, data: &[u8]) -> Result<Vec<u8>, MappingError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn digest(&self, alg: &str, data: &[u8]) -> Result<Vec<u8>, MappingError> {
        match alg {
            DEFAULT_SD_ALG => Ok(Sha256::digest(data).to_vec()),
            other => Err(MappingError::UnsupportedDigestAlgorithm(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disclosure {
    pub encoded: String,
    pub digest: String,
    pub salt: String,
    /// Absent for array element disclosures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: Json,
}

/// An SD-JWT with all of its disclosures applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdJwtDecodedCredential {
    pub compact_sd_jwt: String,
    pub header: Json,
    pub signed_payload: Json,
    pub decoded_payload: Json,
    #[serde(default)]
    pub disclosures: Vec<Disclosure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_binding_jwt: Option<String>,
}

impl SdJwtDecodedCredential {
    pub fn issuer(&self) -> Option<&str> {
        self.decoded_payload.get("iss")?.as_str()
    }

    pub fn vct(&self) -> Option<&str> {
        self.decoded_payload.get("vct")?.as_str()
    }
}

pub fn is_sd_jwt(value: &str) -> bool {
    value.contains('~')
}

fn decode_disclosure(
    encoded: &str,
    alg: &str,
    hasher: &dyn Hasher,
) -> Result<Disclosure, MappingError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| MappingError::MalformedSdJwt("disclosure was not valid base64url".into()))?;
    let Ok(Json::Array(mut parts)) = serde_json::from_slice::<Json>(&bytes) else {
        return Err(MappingError::MalformedSdJwt(
            "disclosure is not a JSON array".into(),
        ));
    };
    let (salt, key, value) = match parts.len() {
        2 => {
            let value = parts.remove(1);
            (parts.remove(0), None, value)
        }
        3 => {
            let value = parts.remove(2);
            let Json::String(key) = parts.remove(1) else {
                return Err(MappingError::MalformedSdJwt("disclosure key is not a string".into()));
            };
            (parts.remove(0), Some(key), value)
        }
        n => {
            return Err(MappingError::MalformedSdJwt(format!(
                "disclosure has {n} elements"
            )))
        }
    };
    let Json::String(salt) = salt else {
        return Err(MappingError::MalformedSdJwt("disclosure salt is not a string".into()));
    };
    let digest = BASE64_URL_SAFE_NO_PAD.encode(hasher.digest(alg, encoded.as_bytes())?);

    Ok(Disclosure {
        encoded: encoded.to_owned(),
        digest,
        salt,
        key,
        value,
    })
}

/// Decode a compact `<issuer-jwt>~<disclosure>~...~[<kb-jwt>]` SD-JWT.
pub fn decode(compact: &str, hasher: &dyn Hasher) -> Result<SdJwtDecodedCredential, MappingError> {
    let mut parts = compact.split('~');
    let issuer_jwt = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    let header = jwt::decode_header(issuer_jwt)?;
    let signed_payload = jwt::decode_payload(issuer_jwt)?;
    let alg = signed_payload
        .get("_sd_alg")
        .and_then(Json::as_str)
        .unwrap_or(DEFAULT_SD_ALG);

    let (encoded_disclosures, key_binding_jwt) = match rest.split_last() {
        Some((last, disclosures)) if last.contains('.') => (disclosures, Some(last.to_string())),
        _ => (rest.as_slice(), None),
    };
    let disclosures = encoded_disclosures
        .iter()
        .filter(|encoded| !encoded.is_empty())
        .map(|encoded| decode_disclosure(encoded, alg, hasher))
        .collect::<Result<Vec<_>, _>>()?;

    let by_digest: BTreeMap<&str, &Disclosure> = disclosures
        .iter()
        .map(|disclosure| (disclosure.digest.as_str(), disclosure))
        .collect();
    let mut decoded_payload = resolve(&signed_payload, &by_digest);
    if let Json::Object(object) = &mut decoded_payload {
        object.remove("_sd_alg");
    }

    Ok(SdJwtDecodedCredential {
        compact_sd_jwt: compact.to_owned(),
        header,
        signed_payload,
        decoded_payload,
        disclosures,
        key_binding_jwt,
    })
}

fn resolve(value: &Json, disclosures: &BTreeMap<&str, &Disclosure>) -> Json {
    match value {
        Json::Object(object) => {
            let mut resolved = Map::new();
            for (key, value) in object {
                if key == "_sd" {
                    continue;
                }
                resolved.insert(key.clone(), resolve(value, disclosures));
            }
            let digests = object.get("_sd").and_then(Json::as_array);
            for digest in digests.into_iter().flatten().filter_map(Json::as_str) {
                if let Some(Disclosure {
                    key: Some(key),
                    value,
                    ..
                }) = disclosures.get(digest).copied()
                {
                    resolved.insert(key.clone(), resolve(value, disclosures));
                }
            }
            Json::Object(resolved)
        }
        Json::Array(elements) => Json::Array(
            elements
                .iter()
                .filter_map(|element| match array_digest(element) {
                    Some(digest) => match disclosures.get(digest).copied() {
                        Some(Disclosure {
                            key: None, value, ..
                        }) => Some(resolve(value, disclosures)),
                        _ => None,
                    },
                    None => Some(resolve(element, disclosures)),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// The digest of an `{"...": "<digest>"}` array element placeholder.
fn array_digest(element: &Json) -> Option<&str> {
    let object = element.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get("...")?.as_str()
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::credential::jwt::tests::unsigned_jwt;

    pub(crate) fn disclosure(value: &Json) -> (String, String) {
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(value.to_string());
        let digest = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(encoded.as_bytes()));
        (encoded, digest)
    }

    pub(crate) fn sample_sd_jwt() -> String {
        let (given_name, given_name_digest) =
            disclosure(&json!(["2GLC42sKQveCfGfryNRN9w", "given_name", "Erika"]));
        let (nationality, nationality_digest) = disclosure(&json!(["lklxF5jMYlGTPUovMNIvCA", "DE"]));
        let issuer_jwt = unsigned_jwt(&json!({
            "iss": "https://pid-issuer.example.com",
            "vct": "urn:eudi:pid:1",
            "_sd_alg": "sha-256",
            "_sd": [given_name_digest],
            "family_name": "Mustermann",
            "nationalities": [{ "...": nationality_digest }, { "...": "unknown" }]
        }));
        format!("{issuer_jwt}~{given_name}~{nationality}~")
    }

    #[test]
    fn disclosures_are_applied() {
        let decoded = decode(&sample_sd_jwt(), &Sha256Hasher).unwrap();

        assert_eq!(decoded.issuer(), Some("https://pid-issuer.example.com"));
        assert_eq!(decoded.vct(), Some("urn:eudi:pid:1"));
        assert_eq!(decoded.disclosures.len(), 2);
        assert!(decoded.key_binding_jwt.is_none());
        assert_eq!(
            decoded.decoded_payload,
            json!({
                "iss": "https://pid-issuer.example.com",
                "vct": "urn:eudi:pid:1",
                "family_name": "Mustermann",
                "given_name": "Erika",
                "nationalities": ["DE"]
            })
        );
    }

    #[test]
    fn key_binding_jwt_is_kept() {
        let kb = unsigned_jwt(&json!({ "nonce": "1234", "aud": "https://verifier.example.com" }));
        let compact = format!("{}{kb}", sample_sd_jwt());
        let decoded = decode(&compact, &Sha256Hasher).unwrap();
        assert_eq!(decoded.key_binding_jwt, Some(kb));
        assert_eq!(decoded.disclosures.len(), 2);
    }

    #[test]
    fn unsupported_digest() {
        assert!(matches!(
            Sha256Hasher.digest("sha-512", b""),
            Err(MappingError::UnsupportedDigestAlgorithm(alg)) if alg == "sha-512"
        ));
    }
}
