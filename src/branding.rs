//! Locale-keyed display branding for issuers and credential types.
//!
//! Issuer metadata carries `display` arrays for the issuer and for each
//! credential configuration. These are projected here into the records a
//! branding store persists and a UI renders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::metadata::{
    CredentialConfigurationSupported, CredentialDisplay, Image, IssuerDisplay,
};

const BASE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

impl From<&Image> for ImageAttributes {
    fn from(image: &Image) -> Self {
        Self {
            uri: image.uri.clone(),
            alt_text: image.alt_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttributes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Display name of a claim, keyed by its dotted path in the credential subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaimLabel {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialLocaleBranding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<ImageAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextAttributes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<CredentialClaimLabel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerLocaleBranding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<ImageAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextAttributes>,
}

/// Branding of a stored credential, linked by its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBranding {
    pub vc_hash: String,
    pub issuer_correlation_id: String,
    pub locale_branding: Vec<CredentialLocaleBranding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerBranding {
    pub issuer_correlation_id: String,
    pub locale_branding: Vec<IssuerLocaleBranding>,
}

/// Credential type to its branding in every advertised locale.
pub type CredentialBrandingMap = BTreeMap<String, Vec<CredentialLocaleBranding>>;

fn background(color: Option<&String>, image: Option<&Image>) -> Option<BackgroundAttributes> {
    if color.is_none() && image.is_none() {
        return None;
    }
    Some(BackgroundAttributes {
        color: color.cloned(),
        image: image.map(ImageAttributes::from),
    })
}

fn text(color: Option<&String>) -> Option<TextAttributes> {
    color.map(|color| TextAttributes {
        color: Some(color.clone()),
    })
}

pub fn credential_locale_branding_from(
    display: &CredentialDisplay,
    claims: Option<&Json>,
) -> CredentialLocaleBranding {
    CredentialLocaleBranding {
        alias: Some(display.name.clone()),
        locale: display.locale.clone(),
        logo: display.logo.as_ref().map(ImageAttributes::from),
        description: display.description.clone(),
        background: background(
            display.background_color.as_ref(),
            display.background_image.as_ref(),
        ),
        text: text(display.text_color.as_ref()),
        claims: claims
            .map(|claims| claim_labels(claims, display.locale.as_deref()))
            .unwrap_or_default(),
    }
}

pub fn issuer_locale_branding_from(display: &IssuerDisplay) -> IssuerLocaleBranding {
    IssuerLocaleBranding {
        alias: display.name.clone(),
        locale: display.locale.clone(),
        logo: display.logo.as_ref().map(ImageAttributes::from),
        description: display.description.clone(),
        background: background(display.background_color.as_ref(), None),
        text: text(display.text_color.as_ref()),
    }
}

/// Branding for every offered configuration, keyed by its primary credential type.
pub fn credential_branding<'a>(
    configurations: impl IntoIterator<Item = &'a CredentialConfigurationSupported>,
) -> CredentialBrandingMap {
    let mut map = CredentialBrandingMap::new();
    for configuration in configurations {
        let types = configuration.types();
        let Some(credential_type) = primary_credential_type(&types) else {
            continue;
        };
        let claims = configuration.claims_metadata();
        let branding = configuration
            .display
            .iter()
            .map(|display| credential_locale_branding_from(display, claims));
        map.entry(credential_type.to_owned())
            .or_default()
            .extend(branding);
    }
    map
}

/// The most specific credential type: the first one that is not the generic base type.
pub fn primary_credential_type(types: &[String]) -> Option<&str> {
    types
        .iter()
        .find(|t| t.as_str() != BASE_CREDENTIAL_TYPE)
        .or_else(|| types.first())
        .map(String::as_str)
}

/// Pick the entry for `locale`: exact match, then same language, then an
/// entry without locale, then whatever comes first.
pub fn select_locale<'a, T>(
    items: &'a [T],
    locale: Option<&str>,
    locale_of: impl Fn(&T) -> Option<&str>,
) -> Option<&'a T> {
    if let Some(locale) = locale {
        if let Some(exact) = items
            .iter()
            .find(|item| locale_of(*item).is_some_and(|l| l.eq_ignore_ascii_case(locale)))
        {
            return Some(exact);
        }
        let language = language_of(locale);
        if let Some(same_language) = items.iter().find(|item| {
            locale_of(*item).is_some_and(|l| language_of(l).eq_ignore_ascii_case(language))
        }) {
            return Some(same_language);
        }
    }
    items
        .iter()
        .find(|item| locale_of(*item).is_none())
        .or_else(|| items.first())
}

fn language_of(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or(locale)
}

/// Claim labels for `locale`, from claim metadata in either of its shapes:
///
/// * map form: `{"given_name": {"display": [{"name": "Given Name", "locale": "en-US"}]}}`,
///   where nested objects describe nested claims;
/// * array form: `[{"path": ["given_name"], "display": [...]}]`.
pub fn claim_labels(claims: &Json, locale: Option<&str>) -> Vec<CredentialClaimLabel> {
    let mut labels = Vec::new();
    match claims {
        Json::Array(entries) => {
            for entry in entries {
                let Some(path) = entry.get("path").and_then(Json::as_array) else {
                    continue;
                };
                let key = path
                    .iter()
                    .map(|segment| match segment {
                        Json::String(s) => s.clone(),
                        Json::Null => "*".into(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".");
                if let Some(name) = display_name(entry, locale) {
                    labels.push(CredentialClaimLabel { key, name });
                }
            }
        }
        Json::Object(_) => map_claim_labels(claims, None, locale, &mut labels),
        _ => {}
    }
    labels
}

fn map_claim_labels(
    claims: &Json,
    prefix: Option<&str>,
    locale: Option<&str>,
    labels: &mut Vec<CredentialClaimLabel>,
) {
    let Json::Object(entries) = claims else {
        return;
    };
    for (name, entry) in entries {
        if name == "display" || !entry.is_object() {
            continue;
        }
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.clone(),
        };
        if let Some(label) = display_name(entry, locale) {
            labels.push(CredentialClaimLabel {
                key: key.clone(),
                name: label,
            });
        }
        map_claim_labels(entry, Some(&key), locale, labels);
    }
}

fn display_name(entry: &Json, locale: Option<&str>) -> Option<String> {
    let displays = entry.get("display")?.as_array()?;
    select_locale(displays, locale, |display| {
        display.get("locale").and_then(Json::as_str)
    })?
    .get("name")?
    .as_str()
    .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn configuration() -> CredentialConfigurationSupported {
        serde_json::from_value(json!({
            "format": "jwt_vc_json",
            "credential_definition": {
                "type": ["VerifiableCredential", "UniversityDegreeCredential"],
                "credentialSubject": {
                    "given_name": {
                        "display": [
                            { "name": "Given Name", "locale": "en-US" },
                            { "name": "Voornaam", "locale": "nl-NL" }
                        ]
                    },
                    "degree": {
                        "type": {
                            "display": [{ "name": "Degree type" }]
                        }
                    }
                }
            },
            "display": [
                {
                    "name": "University Credential",
                    "locale": "en-US",
                    "logo": { "url": "https://university.example.edu/logo.png", "alt_text": "logo" },
                    "background_color": "#12107c",
                    "text_color": "#FFFFFF"
                },
                { "name": "Universiteitsdiploma", "locale": "nl-NL" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn branding_per_locale() {
        let configuration = configuration();
        let map = credential_branding([&configuration]);
        let branding = &map["UniversityDegreeCredential"];
        assert_eq!(branding.len(), 2);

        let english = &branding[0];
        assert_eq!(english.alias.as_deref(), Some("University Credential"));
        assert_eq!(
            english.logo.as_ref().and_then(|logo| logo.uri.as_deref()),
            Some("https://university.example.edu/logo.png")
        );
        assert_eq!(
            english.background.as_ref().and_then(|b| b.color.as_deref()),
            Some("#12107c")
        );
        assert!(english
            .claims
            .contains(&CredentialClaimLabel { key: "given_name".into(), name: "Given Name".into() }));
        assert!(english
            .claims
            .contains(&CredentialClaimLabel { key: "degree.type".into(), name: "Degree type".into() }));

        let dutch = &branding[1];
        assert!(dutch.background.is_none());
        assert!(dutch
            .claims
            .contains(&CredentialClaimLabel { key: "given_name".into(), name: "Voornaam".into() }));
    }

    #[test]
    fn claim_labels_from_paths() {
        let claims = json!([
            { "path": ["address", "street_address"], "display": [{ "name": "Street", "locale": "en" }] },
            { "path": ["nationalities", null] }
        ]);
        assert_eq!(
            claim_labels(&claims, Some("en-GB")),
            vec![CredentialClaimLabel { key: "address.street_address".into(), name: "Street".into() }]
        );
    }

    #[test]
    fn locale_fallbacks() {
        let items = vec![Some("de-DE"), None, Some("en-US")];
        let pick = |locale| select_locale(&items, locale, |item| *item).copied();

        assert_eq!(pick(Some("en-US")), Some(Some("en-US")));
        assert_eq!(pick(Some("en-GB")), Some(Some("en-US")));
        assert_eq!(pick(Some("fr-FR")), Some(None));
        assert_eq!(pick(None), Some(None));
        assert_eq!(
            select_locale(&[Some("de-DE")], Some("fr"), |item: &Option<&str>| *item),
            Some(&Some("de-DE"))
        );
    }

    #[test]
    fn primary_type_skips_base_type() {
        let types = vec!["VerifiableCredential".to_owned(), "VerifiableId".to_owned()];
        assert_eq!(primary_credential_type(&types), Some("VerifiableId"));
        assert_eq!(
            primary_credential_type(&["VerifiableCredential".to_owned()]),
            Some("VerifiableCredential")
        );
    }
}
