use base64::prelude::*;
use serde_json::{Map, Value as Json};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::MappingError;

fn decode_segment(segment: &str, name: &str) -> Result<Json, MappingError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| MappingError::MalformedJwt(format!("jwt {name} was not valid base64url")))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| MappingError::MalformedJwt(format!("jwt {name} was not valid json")))
}

fn segments(jwt: &str) -> Result<(&str, &str), MappingError> {
    let mut parts = jwt.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(_)) => Ok((header, payload)),
        _ => Err(MappingError::MalformedJwt(
            "expected three dot-separated segments".into(),
        )),
    }
}

pub fn decode_header(jwt: &str) -> Result<Json, MappingError> {
    let (header, _) = segments(jwt)?;
    decode_segment(header, "header")
}

/// Decode a JWT payload. The signature is not checked.
pub fn decode_payload(jwt: &str) -> Result<Json, MappingError> {
    let (_, payload) = segments(jwt)?;
    decode_segment(payload, "payload")
}

pub fn is_jwt(value: &str) -> bool {
    value.split('.').count() == 3 && !value.contains('~')
}

fn numeric_date(value: Option<&Json>) -> Option<String> {
    let seconds = value?.as_i64()?;
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

/// Project a JWT-VC onto the W3C data model.
///
/// Registered claims fill in the credential properties they stand for when
/// the `vc` claim leaves them out. A VCDM 2.0 JWT (no `vc` claim, but an
/// `@context`) is its own credential.
pub fn jwt_vc_to_uniform(jwt: &str) -> Result<Json, MappingError> {
    let Json::Object(mut payload) = decode_payload(jwt)? else {
        return Err(MappingError::MalformedJwt("payload is not an object".into()));
    };

    let mut vc: Map<String, Json> = match payload.remove("vc") {
        Some(Json::Object(vc)) => vc,
        Some(_) => return Err(MappingError::MalformedJwt("`vc` claim is not an object".into())),
        None if payload.contains_key("@context") => payload.clone(),
        None => return Err(MappingError::MalformedJwt("no `vc` claim".into())),
    };

    if let Some(iss) = payload.get("iss").filter(|iss| iss.is_string()) {
        if !vc.contains_key("issuer") {
            vc.insert("issuer".into(), iss.clone());
        }
    }
    if let Some(jti) = payload.get("jti") {
        vc.entry("id").or_insert_with(|| jti.clone());
    }
    if !vc.contains_key("issuanceDate") && !vc.contains_key("validFrom") {
        if let Some(date) = numeric_date(payload.get("nbf")).or_else(|| numeric_date(payload.get("iat"))) {
            vc.insert("issuanceDate".into(), date.into());
        }
    }
    if !vc.contains_key("expirationDate") && !vc.contains_key("validUntil") {
        if let Some(date) = numeric_date(payload.get("exp")) {
            vc.insert("expirationDate".into(), date.into());
        }
    }
    if let Some(Json::String(sub)) = payload.get("sub") {
        if let Some(Json::Object(subject)) = vc.get_mut("credentialSubject") {
            subject
                .entry("id")
                .or_insert_with(|| Json::String(sub.clone()));
        }
    }

    Ok(Json::Object(vc))
}
