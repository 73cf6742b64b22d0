#![cfg(test)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oauth::{HttpClient, HttpResponse, StatusCode};
use serde_json::{Value, json};

use crate::{config::AppleConfig, driver::StateStore};

/// ES256 key used to sign client secrets.
pub(crate) const CLIENT_SECRET_KEY: &str = include_str!("../testdata/client_secret_key.p8");
pub(crate) const CLIENT_SECRET_PUBLIC_KEY: &str =
    include_str!("../testdata/client_secret_key.pub.pem");

/// RS256 key published in [`fixture_jwks`] under [`SIGNING_KEY_ID`].
const ID_TOKEN_SIGNING_KEY: &str = include_str!("../testdata/id_token_signing_key.pem");
/// RS256 key that is not published anywhere.
const FOREIGN_SIGNING_KEY: &str = include_str!("../testdata/foreign_signing_key.pem");

pub(crate) const SIGNING_KEY_ID: &str = "W6WcOKB";
const SIGNING_KEY_MODULUS: &str = "qr83ug5V2GtkMWrOmHP4jUn8yGLFU28bb__dB74k0jNSti0fksH1Oz7Cld2pJF-iwOCuiYAKWMvUcGH_zaZHvhaRdgiVFfvV3Rl-lCN7rO-9GeEWvGIEgEFA0Knr6W0PGym9T4L7rXiknFYsUVWRGLvc2mxA5L_94ckFkceYiXUYeI3pvzZZvuuF2Kt9FvaePiqyXcDAV-8_ZLAdS_w-FPnwEie4l5UVLc1KP-3qPSU2XgyWjWqHtYMz1hnGx6cj3LFo_5E-0FRvc-m5u-CyYTgQRs6NdoFOVz9VoEinlOfALhn_hGFQgE8QlAeRSsGgNFcAUSD8pAp7Vh8teYu9qw";

pub(crate) fn fixture_config<F>(mut func: F) -> AppleConfig
where
    F: FnMut(AppleConfig) -> AppleConfig,
{
    let config = AppleConfig::new(
        "com.example.app",
        "TEAMID1234",
        "KEYID12345",
        CLIENT_SECRET_KEY,
        "https://app.example.com/auth/apple/callback",
    )
    .unwrap();
    func(config)
}

/// Key set publishing [`SIGNING_KEY_ID`] and an unrelated EC key.
pub(crate) fn fixture_jwks() -> String {
    json!({
        "keys": [
            {
                "kty": "RSA",
                "kid": SIGNING_KEY_ID,
                "use": "sig",
                "alg": "RS256",
                "n": SIGNING_KEY_MODULUS,
                "e": "AQAB",
            },
            {
                "kty": "EC",
                "kid": "ec-key",
                "use": "sig",
                "alg": "ES256",
                "crv": "P-256",
                "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0",
            },
        ]
    })
    .to_string()
}

/// Claims of a valid identity token for user `u1`.
pub(crate) fn fixture_claims<F>(mut func: F) -> Value
where
    F: FnMut(&mut Value),
{
    let now = Utc::now();
    let mut claims = json!({
        "iss": "https://appleid.apple.com",
        "aud": "com.example.app",
        "exp": (now + TimeDelta::hours(1)).timestamp(),
        "iat": now.timestamp(),
        "sub": "u1",
        "email": "a@b.com",
        "email_verified": "true",
        "is_private_email": "false",
        "auth_time": now.timestamp(),
        "nonce_supported": true,
        "user": {"name": {"firstName": "A", "lastName": "B"}},
    });
    func(&mut claims);
    claims
}

/// Signs `claims` with the published key.
pub(crate) fn fixture_id_token(claims: &Value) -> String {
    sign_id_token(SIGNING_KEY_ID, ID_TOKEN_SIGNING_KEY, claims)
}

/// Signs `claims` with a key that is not published under `kid`.
pub(crate) fn fixture_forged_id_token(kid: &str, claims: &Value) -> String {
    sign_id_token(kid, FOREIGN_SIGNING_KEY, claims)
}

fn sign_id_token(kid: &str, pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Token endpoint response for an authorization code.
pub(crate) fn fixture_token_response(id_token: &str) -> String {
    json!({
        "access_token": "access-token",
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-token",
        "id_token": id_token,
    })
    .to_string()
}

/// In-memory [`StateStore`] issuing a fixed token.
#[derive(Debug, Default)]
pub(crate) struct MemoryStateStore {
    stored: Option<String>,
}

impl MemoryStateStore {
    pub(crate) fn with_stored(state: &str) -> Self {
        Self {
            stored: Some(state.to_string()),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn issue_state(&mut self) -> String {
        let state = "issued-state".to_string();
        self.stored = Some(state.clone());
        state
    }

    fn take_state(&mut self) -> Option<String> {
        self.stored.take()
    }
}

/// [`HttpClient`] answering every request with the same body and
/// remembering the requested URLs.
pub(crate) struct RecordingHttpClient {
    body: String,
    urls: Mutex<Vec<String>>,
}

impl RecordingHttpClient {
    pub(crate) fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    fn respond(&self, url: &str) -> Result<HttpResponse, oauth::Error> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(HttpResponse::new(StatusCode::OK, self.body.clone()))
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn post_form(
        &self,
        url: &str,
        _form: &[(String, String)],
    ) -> Result<HttpResponse, oauth::Error> {
        self.respond(url)
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, oauth::Error> {
        self.respond(url)
    }
}
