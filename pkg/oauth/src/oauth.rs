use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::{
    error::Error,
    http::HttpClient,
    models::OAuth2Token,
    random::{RandomSource, SecureRandom},
};

/// Query parameters of an OAuth 2.0 authorization redirect.
///
/// Parameters keep their insertion order; setting an existing
/// parameter again replaces its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRequest {
    endpoint: String,
    params: Vec<(String, String)>,
    scopes: Vec<String>,
    scope_separator: &'static str,
}

impl RedirectRequest {
    /// Creates a redirect request carrying the parameters every
    /// authorization-code flow needs.
    pub fn new(endpoint: &str, client_id: &str, redirect_uri: &str) -> Self {
        let mut request = Self {
            endpoint: endpoint.to_string(),
            params: Vec::new(),
            scopes: Vec::new(),
            scope_separator: " ",
        };
        request
            .param("client_id", client_id)
            .param("redirect_uri", redirect_uri);
        request
    }

    /// Sets a query parameter.
    pub fn param(&mut self, key: &str, value: &str) -> &mut Self {
        upsert(&mut self.params, key, value);
        self
    }

    /// Replaces the requested scopes.
    pub fn scopes<I, S>(&mut self, scopes: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the value of a query parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.params, key)
    }

    /// Returns the requested scopes.
    #[must_use]
    pub fn requested_scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the authorization endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns all query parameters, with the scopes joined into `scope`.
    #[must_use]
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = self.params.clone();
        if !self.scopes.is_empty() {
            upsert(
                &mut params,
                "scope",
                &self.scopes.join(self.scope_separator),
            );
        }
        params
    }

    /// Constructs the OAuth 2.0 authorization URL.
    pub fn url(&self) -> Result<String, Error> {
        let url = Url::parse_with_params(&self.endpoint, &self.params())?;
        Ok(url.into())
    }
}

/// Form fields of an OAuth 2.0 token request.
///
/// Setting an existing field again replaces its value, which lets
/// provider drivers and callers override the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    fields: Vec<(String, String)>,
}

impl TokenRequest {
    /// Creates an `authorization_code` grant request.
    pub fn authorization_code(client_id: &str, redirect_uri: &str, code: &str) -> Self {
        let mut request = Self::default();
        request
            .field("grant_type", "authorization_code")
            .field("redirect_uri", redirect_uri)
            .field("client_id", client_id)
            .field("code", code);
        request
    }

    /// Sets a form field.
    pub fn field(&mut self, key: &str, value: &str) -> &mut Self {
        upsert(&mut self.fields, key, value);
        self
    }

    /// Returns the value of a form field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.fields, key)
    }

    /// Returns all form fields.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Redirect-building and code-exchange primitives shared by all
/// OAuth 2.0 provider drivers.
#[async_trait]
pub trait Oauth2Exchange: Send + Sync {
    /// Builds the URL the user agent is redirected to.
    fn redirect_url(&self, request: &RedirectRequest) -> Result<String, Error> {
        request.url()
    }

    /// Exchanges an authorization code for a token response.
    ///
    /// # Errors
    /// - transport failures and timeouts
    /// - non-2xx responses, carrying the provider's payload
    /// - undecodable response bodies
    async fn exchange_code(
        &self,
        token_endpoint: &str,
        request: &TokenRequest,
    ) -> Result<OAuth2Token, Error>;
}

/// Generic OAuth 2.0 helper on top of an [`HttpClient`].
#[derive(Debug, Default, Clone)]
pub struct OAuth<H, R = SecureRandom> {
    http: H,
    _phantom: PhantomData<R>,
}

impl<H: HttpClient, R: RandomSource> OAuth<H, R> {
    /// Creates a new `OAuth` helper sending requests through `http`.
    #[inline]
    pub fn new(http: H) -> Self {
        Self {
            http,
            _phantom: PhantomData,
        }
    }

    /// Generates the OAuth `state` (CSRF protection token).
    #[must_use]
    pub fn generate_state() -> String {
        R::base64_url(32)
    }
}

#[async_trait]
impl<H: HttpClient, R: RandomSource> Oauth2Exchange for OAuth<H, R> {
    async fn exchange_code(
        &self,
        token_endpoint: &str,
        request: &TokenRequest,
    ) -> Result<OAuth2Token, Error> {
        let response = self
            .http
            .post_form(token_endpoint, request.fields())
            .await?
            .error_for_status()?;

        debug!(status = %response.status, "token endpoint responded");

        response.json()
    }
}

/// Compares two byte slices for equality in constant time to prevent timing attacks.
#[must_use]
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut c = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        c |= x ^ y;
    }
    c == 0
}

fn upsert(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
