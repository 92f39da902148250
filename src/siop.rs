//! The SIOP / OpenID4VP leg of a first-party authorization flow.
//!
//! An issuer answering an authorization challenge with
//! `insufficient_authorization` points the wallet to a `presentation` URI.
//! That URI carries an authorization request; the wallet answers it with a
//! `direct_post` to the request's `response_uri` and receives a
//! `presentation_during_issuance_session` to retry the challenge with.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::debug;
use url::Url;

use crate::{
    core::util::{get_text, post_form, AsyncHttpClient},
    credential::jwt,
    provider::{identifier::ManagedIdentifier, presentation::SignedResponse},
};

/// Session parameters for one presentation during issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidAuthConfig {
    pub identifier: ManagedIdentifier,
    pub presentation_uri: Url,
}

impl DidAuthConfig {
    pub fn new(identifier: ManagedIdentifier, presentation_uri: Url) -> Self {
        Self {
            identifier,
            presentation_uri,
        }
    }
}

/// A resolved authorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequestData {
    pub client_id: String,
    pub response_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dcql_query: Option<Json>,
    /// The request object, when the request was passed as a JWT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_jwt: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl AuthorizationRequestData {
    fn from_object(mut object: Map<String, Json>, request_jwt: Option<String>) -> Result<Self> {
        // `redirect_uri` is the pre-`direct_post` name of the response endpoint.
        if !object.contains_key("response_uri") {
            if let Some(redirect_uri) = object.remove("redirect_uri") {
                object.insert("response_uri".into(), redirect_uri);
            }
        }
        let mut request: Self = serde_json::from_value(Json::Object(object))
            .context("unable to parse authorization request")?;
        request.request_jwt = request_jwt;
        Ok(request)
    }
}

/// Resolve the authorization request carried by a `presentation` URI.
///
/// The request may be passed by value (`request`), by reference
/// (`request_uri`) or as plain query parameters. The request object's
/// signature is checked by the [PresentationSigner](crate::provider::presentation::PresentationSigner)
/// implementation, not here.
pub async fn fetch_request<C: AsyncHttpClient + ?Sized>(
    http_client: &C,
    presentation_uri: &Url,
) -> Result<AuthorizationRequestData> {
    let params: BTreeMap<String, String> = presentation_uri.query_pairs().into_owned().collect();

    let jwt = if let Some(request) = params.get("request") {
        Some(request.clone())
    } else if let Some(request_uri) = params.get("request_uri") {
        let request_uri: Url = request_uri
            .parse()
            .context("request_uri is not a valid URL")?;
        debug!(%request_uri, "fetching authorization request by reference");
        Some(
            get_text(http_client, &request_uri)
                .await
                .context("failed to retrieve authorization request")?
                .trim()
                .to_owned(),
        )
    } else {
        None
    };

    let Some(jwt) = jwt else {
        let object = params
            .into_iter()
            .map(|(key, value)| {
                let value = match key.as_str() {
                    "presentation_definition" | "dcql_query" | "client_metadata" => {
                        serde_json::from_str(&value).unwrap_or(Json::String(value))
                    }
                    _ => Json::String(value),
                };
                (key, value)
            })
            .collect();
        return AuthorizationRequestData::from_object(object, None);
    };

    let Json::Object(mut object) =
        jwt::decode_payload(&jwt).context("unable to decode request object")?
    else {
        bail!("request object payload is not a JSON object")
    };
    match (params.get("client_id"), object.get("client_id")) {
        (Some(outer), Some(Json::String(inner))) if outer != inner => bail!(
            "Authorization Request and Request Object have different client ids: '{outer}' vs. '{inner}'"
        ),
        (Some(outer), None) => {
            object.insert("client_id".into(), Json::String(outer.clone()));
        }
        _ => {}
    }
    AuthorizationRequestData::from_object(object, Some(jwt))
}

#[derive(Deserialize)]
struct PresentationSessionResponse {
    presentation_during_issuance_session: String,
}

/// Post a signed response with `direct_post` and return the issuer's presentation session.
pub async fn submit_response<C: AsyncHttpClient + ?Sized>(
    http_client: &C,
    request: &AuthorizationRequestData,
    response: &SignedResponse,
) -> Result<String> {
    let mut form: Vec<(&str, String)> = Vec::new();
    if let Some(vp_token) = &response.vp_token {
        form.push((
            "vp_token",
            match vp_token {
                Json::String(token) => token.clone(),
                other => serde_json::to_string(other)?,
            },
        ));
    }
    if let Some(submission) = &response.presentation_submission {
        form.push(("presentation_submission", serde_json::to_string(submission)?));
    }
    if let Some(id_token) = &response.id_token {
        form.push(("id_token", id_token.clone()));
    }
    if let Some(state) = &request.state {
        form.push(("state", state.clone()));
    }
    let form = serde_urlencoded::to_string(form).context("unable to encode authorization response")?;

    let (status, body) = post_form(http_client, &request.response_uri, form)
        .await
        .context("failed to make authorization response request")?;
    if !status.is_success() {
        bail!("authorization response request was unsuccessful (status: {status}): {body}")
    }

    serde_json::from_str::<PresentationSessionResponse>(&body)
        .map(|session| session.presentation_during_issuance_session)
        .context("authorization response did not yield a presentation_during_issuance_session")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use base64::prelude::*;
    use http::{Request, Response};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        requests: Mutex<Vec<(String, String)>>,
        reply: String,
    }

    #[async_trait]
    impl AsyncHttpClient for Recorder {
        async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
            self.requests.lock().unwrap().push((
                request.uri().to_string(),
                String::from_utf8(request.into_body())?,
            ));
            Ok(Response::builder()
                .status(200)
                .body(self.reply.clone().into_bytes())?)
        }
    }

    fn unsigned_jwt(payload: Json) -> String {
        format!(
            "{}.{}.",
            BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            BASE64_URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    #[tokio::test]
    async fn request_by_reference() {
        let client = Recorder {
            reply: unsigned_jwt(json!({
                "client_id": "https://issuer.example.com",
                "response_uri": "https://issuer.example.com/presentation/response",
                "response_mode": "direct_post",
                "nonce": "n-0S6_WzA2Mj",
                "state": "af0ifjsldkj"
            })),
            ..Default::default()
        };
        let uri: Url = "openid4vp://?client_id=https%3A%2F%2Fissuer.example.com&request_uri=https%3A%2F%2Fissuer.example.com%2Frequest%2F1"
            .parse()
            .unwrap();

        let request = fetch_request(&client, &uri).await.unwrap();
        assert_eq!(request.client_id, "https://issuer.example.com");
        assert_eq!(request.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert!(request.request_jwt.is_some());
        assert_eq!(
            client.requests.lock().unwrap()[0].0,
            "https://issuer.example.com/request/1"
        );
    }

    #[tokio::test]
    async fn client_ids_must_agree() {
        let jwt = unsigned_jwt(json!({
            "client_id": "https://other.example.com",
            "response_uri": "https://issuer.example.com/presentation/response"
        }));
        let uri = Url::parse_with_params(
            "openid4vp://",
            &[("client_id", "https://issuer.example.com"), ("request", &jwt)],
        )
        .unwrap();

        let err = fetch_request(&Recorder::default(), &uri).await.unwrap_err();
        assert!(err.to_string().contains("different client ids"));
    }

    #[tokio::test]
    async fn plain_parameters_and_submission() {
        let uri = Url::parse_with_params(
            "openid4vp://",
            &[
                ("client_id", "https://issuer.example.com"),
                ("redirect_uri", "https://issuer.example.com/presentation/response"),
                ("state", "s1"),
                ("presentation_definition", r#"{"id":"pd","input_descriptors":[]}"#),
            ],
        )
        .unwrap();
        let client = Recorder {
            reply: json!({ "presentation_during_issuance_session": "pdis-1" }).to_string(),
            ..Default::default()
        };

        let request = fetch_request(&client, &uri).await.unwrap();
        assert_eq!(
            request.response_uri.as_str(),
            "https://issuer.example.com/presentation/response"
        );
        assert_eq!(request.presentation_definition.as_ref().unwrap()["id"], "pd");

        let session = submit_response(
            &client,
            &request,
            &SignedResponse {
                vp_token: Some(json!("eyJ.vp.token")),
                presentation_submission: Some(json!({ "id": "ps" })),
                id_token: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(session, "pdis-1");

        let (_, body) = client.requests.lock().unwrap()[0].clone();
        assert!(body.contains("vp_token=eyJ.vp.token"));
        assert!(body.contains("state=s1"));
    }
}
