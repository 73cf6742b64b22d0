use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE},
    redirect::Policy,
};
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Turns any non-2xx response into [`Error::UnexpectedStatusCode`],
    /// keeping the body as the provider's error payload.
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(Error::UnexpectedStatusCode {
            status: self.status,
            body: self.body,
        })
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Minimal HTTP client needed by the OAuth 2.0 flows.
#[cfg_attr(any(test, feature = "mock"), mock::client)]
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a form-encoded `POST` request.
    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, Error>;

    /// Sends a `GET` request expecting a JSON document.
    async fn get(&self, url: &str) -> Result<HttpResponse, Error>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, Error> {
        (**self).post_form(url, form).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, Error> {
        (**self).get(url).await
    }
}

/// [`HttpClient`] backed by [`reqwest`].
///
/// Redirects are never followed and every request is bounded by the
/// configured timeout.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new [`ReqwestHttpClient`] with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|_| Error::BuildHttpClient)?;

        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse, Error> {
        let status = response.status();
        let body = response.text().await.map_err(send_error)?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, Error> {
        let body = serde_urlencoded::to_string(form)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header(CONTENT_LENGTH, body.len().to_string())
            .body(body)
            .send()
            .await
            .map_err(send_error)?;

        Self::read(response).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, Error> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(send_error)?;

        Self::read(response).await
    }
}

fn send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::SendRequest(err)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde::Deserialize;

    use super::*;

    #[rstest]
    #[case::ok(StatusCode::OK, true)]
    #[case::created(StatusCode::CREATED, true)]
    #[case::bad_request(StatusCode::BAD_REQUEST, false)]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, false)]
    fn test_error_for_status(#[case] status: StatusCode, #[case] want_ok: bool) {
        // given
        let response = HttpResponse::new(status, r#"{"error":"invalid_grant"}"#);

        // when
        let got = response.error_for_status();

        // then
        match got {
            Ok(got) => {
                assert!(want_ok, "expected error for {status}");
                assert_eq!(got.status, status);
            }
            Err(Error::UnexpectedStatusCode { status: got, body }) => {
                assert!(!want_ok, "expected success for {status}");
                assert_eq!(got, status);
                assert_eq!(body, r#"{"error":"invalid_grant"}"#);
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn test_json_malformed_body() {
        #[derive(Debug, Deserialize)]
        struct Body {
            #[allow(dead_code)]
            keys: Vec<String>,
        }

        let response = HttpResponse::new(StatusCode::OK, "<html>");

        let got = response.json::<Body>();

        assert!(matches!(got, Err(Error::DecodeResponse(_))));
    }

    #[tokio::test]
    async fn test_mock_http_client_through_arc() {
        // given
        let http = Arc::new(MockHttpClient::default());
        http.push_get(Ok(HttpResponse::new(StatusCode::OK, "{}")));

        // when
        let got = http.get("https://example.com/keys").await;

        // then
        assert_eq!(got.unwrap().body, "{}");
        assert_eq!(http.get_calls(), 1);
        assert_eq!(http.post_form_calls(), 0);
    }
}
