//! ISO 18013-5 `IssuerSigned` decoding.
//!
//! Only what the holder needs to display and correlate an mdoc is read: the
//! namespaced data elements, the MSO's `docType` and validity, and the
//! issuer as named by the document signer certificate.

use base64::prelude::*;
use ciborium::Value as Cbor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use x509_cert::{der::Decode, Certificate};

use crate::error::MappingError;

/// COSE header label of the `x5chain` parameter.
const X5CHAIN: i128 = 33;
/// CBOR tag for embedded CBOR data items.
const ENCODED_CBOR: u64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MdocDecodedCredential {
    pub doc_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Namespace to element identifier to value.
    #[serde(default)]
    pub namespaces: Map<String, Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
}

fn malformed(message: &str) -> MappingError {
    MappingError::MalformedMdoc(message.to_owned())
}

fn map_get<'a>(map: &'a Cbor, key: &str) -> Option<&'a Cbor> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

fn map_get_label(map: &Cbor, label: i128) -> Option<&Cbor> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_integer().map(i128::from) == Some(label))
        .map(|(_, v)| v)
}

/// Unwrap `#6.24(bstr .cbor T)`, tolerating an untagged byte string.
fn embedded(value: &Cbor) -> Result<Cbor, MappingError> {
    let bytes = match value {
        Cbor::Tag(ENCODED_CBOR, inner) => inner
            .as_bytes()
            .ok_or_else(|| malformed("tag 24 does not wrap a byte string"))?,
        Cbor::Bytes(bytes) => bytes,
        _ => return Err(malformed("expected an embedded CBOR data item")),
    };
    ciborium::from_reader(bytes.as_slice()).map_err(|e| MappingError::MalformedMdoc(e.to_string()))
}

pub fn cbor_to_json(value: &Cbor) -> Json {
    match value {
        Cbor::Null => Json::Null,
        Cbor::Bool(b) => Json::Bool(*b),
        Cbor::Integer(i) => {
            let i = i128::from(*i);
            i64::try_from(i)
                .map(Json::from)
                .unwrap_or_else(|_| Json::String(i.to_string()))
        }
        Cbor::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Cbor::Text(s) => Json::String(s.clone()),
        Cbor::Bytes(bytes) => Json::String(BASE64_URL_SAFE_NO_PAD.encode(bytes)),
        // Dates (0, 1004), full-date and the like keep their content.
        Cbor::Tag(ENCODED_CBOR, inner) => embedded(value)
            .map(|decoded| cbor_to_json(&decoded))
            .unwrap_or_else(|_| cbor_to_json(inner)),
        Cbor::Tag(_, inner) => cbor_to_json(inner),
        Cbor::Array(items) => Json::Array(items.iter().map(cbor_to_json).collect()),
        Cbor::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Cbor::Text(s) => s.clone(),
                        other => cbor_to_json(other).to_string(),
                    };
                    (key, cbor_to_json(v))
                })
                .collect(),
        ),
        _ => Json::Null,
    }
}

fn certificate_subject(header: &Cbor) -> Option<String> {
    let x5chain = map_get_label(header, X5CHAIN)?;
    let der = match x5chain {
        Cbor::Bytes(der) => der,
        Cbor::Array(chain) => chain.first()?.as_bytes()?,
        _ => return None,
    };
    let certificate = Certificate::from_der(der).ok()?;
    Some(certificate.tbs_certificate.subject.to_string())
}

/// Decode a base64url encoded `IssuerSigned` structure.
pub fn decode_issuer_signed(encoded: &str) -> Result<MdocDecodedCredential, MappingError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|_| malformed("IssuerSigned was not valid base64url"))?;
    let issuer_signed: Cbor = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| MappingError::MalformedMdoc(e.to_string()))?;

    let mut namespaces = Map::new();
    if let Some(entries) = map_get(&issuer_signed, "nameSpaces").and_then(Cbor::as_map) {
        for (namespace, items) in entries {
            let Some(namespace) = namespace.as_text() else {
                continue;
            };
            let mut elements = Map::new();
            for item in items.as_array().into_iter().flatten() {
                let item = embedded(item)?;
                let Some(identifier) = map_get(&item, "elementIdentifier").and_then(Cbor::as_text)
                else {
                    return Err(malformed("IssuerSignedItem without elementIdentifier"));
                };
                let value = map_get(&item, "elementValue")
                    .map(cbor_to_json)
                    .unwrap_or(Json::Null);
                elements.insert(identifier.to_owned(), value);
            }
            namespaces.insert(namespace.to_owned(), Json::Object(elements));
        }
    }

    let issuer_auth = map_get(&issuer_signed, "issuerAuth")
        .and_then(Cbor::as_array)
        .ok_or_else(|| malformed("IssuerSigned did not contain issuerAuth"))?;
    let [protected, unprotected, payload, _signature] = issuer_auth.as_slice() else {
        return Err(malformed("issuerAuth is not a COSE_Sign1 structure"));
    };

    let payload = payload
        .as_bytes()
        .ok_or_else(|| malformed("issuerAuth payload is missing"))?;
    let mso: Cbor = ciborium::from_reader(payload.as_slice())
        .map_err(|e| MappingError::MalformedMdoc(e.to_string()))?;
    let mso = if matches!(mso, Cbor::Tag(ENCODED_CBOR, _)) {
        embedded(&mso)?
    } else {
        mso
    };
    let doc_type = map_get(&mso, "docType")
        .and_then(Cbor::as_text)
        .ok_or_else(|| malformed("MSO did not contain docType"))?
        .to_owned();
    let validity = map_get(&mso, "validityInfo");
    let validity_date = |key: &str| {
        validity
            .and_then(|v| map_get(v, key))
            .map(cbor_to_json)
            .and_then(|date| date.as_str().map(ToOwned::to_owned))
    };

    let protected: Option<Cbor> = match protected {
        Cbor::Bytes(bytes) if !bytes.is_empty() => ciborium::from_reader(bytes.as_slice()).ok(),
        _ => None,
    };
    let issuer = certificate_subject(unprotected)
        .or_else(|| protected.as_ref().and_then(certificate_subject))
        .or_else(|| {
            namespaces
                .values()
                .find_map(|elements| elements.get("issuing_authority")?.as_str())
                .map(ToOwned::to_owned)
        });

    Ok(MdocDecodedCredential {
        doc_type,
        issuer,
        valid_from: validity_date("validFrom"),
        valid_until: validity_date("validUntil"),
        namespaces,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn encoded(value: &Cbor) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes).unwrap();
        bytes
    }

    fn text(s: &str) -> Cbor {
        Cbor::Text(s.to_owned())
    }

    pub(crate) fn sample_issuer_signed() -> String {
        let item = |digest: i64, identifier: &str, value: Cbor| {
            Cbor::Tag(
                ENCODED_CBOR,
                Box::new(Cbor::Bytes(encoded(&Cbor::Map(vec![
                    (text("digestID"), Cbor::Integer(digest.into())),
                    (text("random"), Cbor::Bytes(vec![1, 2, 3])),
                    (text("elementIdentifier"), text(identifier)),
                    (text("elementValue"), value),
                ])))),
            )
        };
        let mso = Cbor::Map(vec![
            (text("version"), text("1.0")),
            (text("docType"), text("org.iso.18013.5.1.mDL")),
            (
                text("validityInfo"),
                Cbor::Map(vec![
                    (text("validFrom"), Cbor::Tag(0, Box::new(text("2024-01-01T00:00:00Z")))),
                    (text("validUntil"), Cbor::Tag(0, Box::new(text("2029-01-01T00:00:00Z")))),
                ]),
            ),
        ]);
        let payload = encoded(&Cbor::Tag(ENCODED_CBOR, Box::new(Cbor::Bytes(encoded(&mso)))));
        let issuer_signed = Cbor::Map(vec![
            (
                text("nameSpaces"),
                Cbor::Map(vec![(
                    text("org.iso.18013.5.1"),
                    Cbor::Array(vec![
                        item(0, "family_name", text("Mustermann")),
                        item(1, "age_over_18", Cbor::Bool(true)),
                        item(2, "issuing_authority", text("Utopia DMV")),
                    ]),
                )]),
            ),
            (
                text("issuerAuth"),
                Cbor::Array(vec![
                    Cbor::Bytes(vec![]),
                    Cbor::Map(vec![]),
                    Cbor::Bytes(payload),
                    Cbor::Bytes(vec![0; 64]),
                ]),
            ),
        ]);
        BASE64_URL_SAFE_NO_PAD.encode(encoded(&issuer_signed))
    }

    #[test]
    fn issuer_signed_is_flattened() {
        let mdoc = decode_issuer_signed(&sample_issuer_signed()).unwrap();

        assert_eq!(mdoc.doc_type, "org.iso.18013.5.1.mDL");
        assert_eq!(mdoc.issuer.as_deref(), Some("Utopia DMV"));
        assert_eq!(mdoc.valid_until.as_deref(), Some("2029-01-01T00:00:00Z"));
        assert_eq!(
            mdoc.namespaces["org.iso.18013.5.1"]["family_name"],
            "Mustermann"
        );
        assert_eq!(mdoc.namespaces["org.iso.18013.5.1"]["age_over_18"], true);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_issuer_signed("not base64!"),
            Err(MappingError::MalformedMdoc(_))
        ));
    }
}
