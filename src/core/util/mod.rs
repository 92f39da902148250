use std::fmt::Debug;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use http::{
    header::{ACCEPT, CONTENT_TYPE},
    Request, Response,
};
use serde_json::Value as Json;
use url::Url;

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient: Debug + Send + Sync {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header(ACCEPT, "application/json")
}

/// GET a document as text, failing on non-success statuses.
pub(crate) async fn get_text<C: AsyncHttpClient + ?Sized>(client: &C, url: &Url) -> Result<String> {
    let request = base_request()
        .method("GET")
        .uri(url.as_str())
        .body(vec![])
        .context("failed to build request")?;
    let response = client
        .execute(request)
        .await
        .context(format!("request to {url} failed"))?;

    let status = response.status();
    let Ok(body) = String::from_utf8(response.into_body()) else {
        bail!("failed to parse response from {url} as UTF-8 (status: {status})")
    };
    if !status.is_success() {
        bail!("request to {url} was unsuccessful (status: {status}): {body}")
    }
    Ok(body)
}

pub(crate) async fn get_json<C: AsyncHttpClient + ?Sized>(client: &C, url: &Url) -> Result<Json> {
    let body = get_text(client, url).await?;
    serde_json::from_str(&body).context(format!("response from {url} is not JSON"))
}

/// POST `application/x-www-form-urlencoded` data and return status and body.
pub(crate) async fn post_form<C: AsyncHttpClient + ?Sized>(
    client: &C,
    url: &Url,
    form: String,
) -> Result<(http::StatusCode, String)> {
    let request = base_request()
        .method("POST")
        .uri(url.as_str())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form.into_bytes())
        .context("failed to build request")?;
    let response = client
        .execute(request)
        .await
        .context(format!("request to {url} failed"))?;

    let status = response.status();
    let Ok(body) = String::from_utf8(response.into_body()) else {
        bail!("failed to parse response from {url} as UTF-8 (status: {status})")
    };
    Ok((status, body))
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct Fixed(u16, &'static str);

    #[async_trait]
    impl AsyncHttpClient for Fixed {
        async fn execute(&self, _request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
            Ok(Response::builder()
                .status(self.0)
                .body(self.1.as_bytes().to_vec())?)
        }
    }

    #[tokio::test]
    async fn get_json_reports_status() {
        let url: Url = "https://issuer.example.com/schema.json".parse().unwrap();

        let ok = get_json(&Fixed(200, r#"{"type":"object"}"#), &url)
            .await
            .unwrap();
        assert_eq!(ok["type"], "object");

        let err = get_json(&Fixed(404, "not found"), &url).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
