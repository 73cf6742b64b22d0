use std::time::Duration;

use jsonwebtoken::EncodingKey;
use tracing::warn;

use crate::error::Error;

/// Issuer of Apple identity tokens and audience of client secrets.
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Sign in with Apple endpoints.
const APPLE_AUTH_ENDPOINT: &str = "https://appleid.apple.com/auth/authorize";
const APPLE_TOKEN_ENDPOINT: &str = "https://appleid.apple.com/auth/token";
const APPLE_JWKS_ENDPOINT: &str = "https://appleid.apple.com/auth/keys";

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &[&str] = &["email"];

/// Endpoints the driver talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub jwks_url: String,
}

impl Default for AppleEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: APPLE_AUTH_ENDPOINT.to_string(),
            token_url: APPLE_TOKEN_ENDPOINT.to_string(),
            jwks_url: APPLE_JWKS_ENDPOINT.to_string(),
        }
    }
}

/// Sign in with Apple configuration.
///
/// - `app_id`: the Services ID, sent as `client_id` and expected as the
///   identity token audience
/// - `team_id`: the Apple Developer team, issuer of the client secret
/// - `key_id`: id of the Sign in with Apple private key
/// - `private_key`: the `.p8` PKCS#8 PEM used to sign client secrets
#[derive(Clone)]
pub struct AppleConfig {
    app_id: String,
    team_id: String,
    key_id: String,
    private_key: String,
    callback_url: String,
    scopes: Option<Vec<String>>,
    strict_audience: bool,
    endpoints: AppleEndpoints,
}

impl std::fmt::Debug for AppleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleConfig")
            .field("app_id", &self.app_id)
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .field("private_key", &"<redacted>")
            .field("callback_url", &self.callback_url)
            .field("scopes", &self.scopes)
            .field("strict_audience", &self.strict_audience)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl AppleConfig {
    /// Creates a new [`AppleConfig`] with the default scopes and strict
    /// audience validation.
    ///
    /// # Errors
    /// - an identifier or the private key is empty
    /// - the private key is not an EC PKCS#8 PEM
    pub fn new(
        app_id: impl Into<String>,
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Result<Self, Error> {
        let config = Self {
            app_id: app_id.into(),
            team_id: team_id.into(),
            key_id: key_id.into(),
            private_key: private_key.into(),
            callback_url: callback_url.into(),
            scopes: None,
            strict_audience: true,
            endpoints: AppleEndpoints::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from the environment.
    ///
    /// Required: `APPLE_APP_ID`, `APPLE_TEAM_ID`, `APPLE_KEY_ID`,
    /// `APPLE_CALLBACK_URL` and either `APPLE_PRIVATE_KEY` (PEM contents)
    /// or `APPLE_PRIVATE_KEY_PATH`.
    /// Optional: `APPLE_SCOPES` (space separated), `APPLE_STRICT_AUDIENCE`.
    pub fn from_env() -> Result<Self, Error> {
        let private_key = match std::env::var("APPLE_PRIVATE_KEY") {
            Ok(key) => key,
            Err(_) => {
                let path = get_env("APPLE_PRIVATE_KEY_PATH")?;
                std::fs::read_to_string(&path).map_err(|e| {
                    Error::InvalidConfig(format!("failed to read private key {path}: {e}"))
                })?
            }
        };

        let mut config = Self::new(
            get_env("APPLE_APP_ID")?,
            get_env("APPLE_TEAM_ID")?,
            get_env("APPLE_KEY_ID")?,
            private_key,
            get_env("APPLE_CALLBACK_URL")?,
        )?;

        if let Ok(scopes) = std::env::var("APPLE_SCOPES") {
            config = config.with_scopes(scopes.split_whitespace());
        }

        if let Ok(strict) = std::env::var("APPLE_STRICT_AUDIENCE") {
            let strict = strict.parse::<bool>().map_err(|_| {
                Error::InvalidConfig(format!("APPLE_STRICT_AUDIENCE must be a bool, got {strict}"))
            })?;
            config = config.with_strict_audience(strict);
        }

        Ok(config)
    }

    /// Replaces the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Enables or disables validation of the identity token audience
    /// against [`AppleConfig::app_id`].
    #[must_use]
    pub fn with_strict_audience(mut self, strict: bool) -> Self {
        if !strict {
            warn!("identity token audience validation is disabled");
        }
        self.strict_audience = strict;
        self
    }

    /// Overrides the Apple endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: AppleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The Services ID. Sent as `client_id` and expected as the identity
    /// token audience.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// Id of the private key, used as the client secret `kid` only.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Default signing-key cache settings for the configured key-set endpoint.
    #[must_use]
    pub fn signing_key_cache_config(&self) -> SigningKeyCacheConfig {
        SigningKeyCacheConfig::new(&self.endpoints.jwks_url)
    }

    /// Returns the configured scopes, or [`DEFAULT_SCOPES`] when unset.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        match &self.scopes {
            Some(scopes) => scopes.clone(),
            None => DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn strict_audience(&self) -> bool {
        self.strict_audience
    }

    #[must_use]
    pub fn endpoints(&self) -> &AppleEndpoints {
        &self.endpoints
    }

    pub(crate) fn encoding_key(&self) -> Result<EncodingKey, Error> {
        EncodingKey::from_ec_pem(self.private_key.as_bytes())
            .map_err(|e| Error::InvalidConfig(format!("invalid private key: {e}")))
    }

    fn validate(&self) -> Result<(), Error> {
        let required = [
            ("app_id", &self.app_id),
            ("team_id", &self.team_id),
            ("key_id", &self.key_id),
            ("private_key", &self.private_key),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!("{name} must not be empty")));
        }
        self.encoding_key()?;
        Ok(())
    }
}

/// Settings of the signing-key cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyCacheConfig {
    pub jwks_url: String,
    /// Maximum number of cached keys.
    pub max_entries: usize,
    /// Lifetime of a cached key.
    pub ttl: Duration,
    /// Minimum time between two key-set refreshes.
    pub refresh_interval: Duration,
}

impl SigningKeyCacheConfig {
    /// Creates the default cache settings for the given key-set endpoint.
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            max_entries: 100,
            ttl: Duration::from_secs(24 * 60 * 60),
            refresh_interval: Duration::from_secs(6),
        }
    }
}

impl Default for SigningKeyCacheConfig {
    fn default() -> Self {
        Self::new(APPLE_JWKS_ENDPOINT)
    }
}

fn get_env(key: &str) -> Result<String, Error> {
    std::env::var(key).map_err(|_| Error::InvalidConfig(format!("{key} must be set")))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::fixture::{CLIENT_SECRET_KEY, fixture_config};

    #[test]
    fn test_default_scopes() {
        let config = fixture_config(|c| c);

        assert_eq!(config.scopes(), vec!["email".to_string()]);
        assert!(config.strict_audience());
        assert_eq!(config.endpoints(), &AppleEndpoints::default());
    }

    #[test]
    fn test_configured_scopes_are_preserved() {
        let config = fixture_config(|c| c).with_scopes(["name", "email"]);

        assert_eq!(config.scopes(), vec!["name".to_string(), "email".to_string()]);
    }

    #[rstest]
    #[case::empty_app_id("", "TEAMID", "KEYID", CLIENT_SECRET_KEY)]
    #[case::empty_team_id("com.example.app", "", "KEYID", CLIENT_SECRET_KEY)]
    #[case::empty_key_id("com.example.app", "TEAMID", " ", CLIENT_SECRET_KEY)]
    #[case::empty_private_key("com.example.app", "TEAMID", "KEYID", "")]
    #[case::invalid_private_key("com.example.app", "TEAMID", "KEYID", "not a pem")]
    fn test_new_invalid_config(
        #[case] app_id: &str,
        #[case] team_id: &str,
        #[case] key_id: &str,
        #[case] private_key: &str,
    ) {
        let got = AppleConfig::new(
            app_id,
            team_id,
            key_id,
            private_key,
            "https://app.example.com/callback",
        );

        assert!(matches!(got, Err(Error::InvalidConfig(_))), "{got:?}");
    }

    #[test]
    fn test_accessors() {
        let config = fixture_config(|c| c);

        assert_eq!(config.app_id(), "com.example.app");
        assert_eq!(config.team_id(), "TEAMID1234");
        assert_eq!(config.key_id(), "KEYID12345");
        assert_eq!(
            config.callback_url(),
            "https://app.example.com/auth/apple/callback"
        );
    }

    #[test]
    fn test_signing_key_cache_config_follows_endpoints() {
        let config = fixture_config(|c| {
            c.with_endpoints(AppleEndpoints {
                jwks_url: "https://proxy.test/auth/keys".to_string(),
                ..AppleEndpoints::default()
            })
        });

        let got = config.signing_key_cache_config();

        assert_eq!(got.jwks_url, "https://proxy.test/auth/keys");
        assert_eq!(got.max_entries, 100);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = fixture_config(|c| c);

        let got = format!("{config:?}");

        assert!(got.contains("<redacted>"));
        assert!(!got.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_signing_key_cache_defaults() {
        let config = SigningKeyCacheConfig::default();

        assert_eq!(config.jwks_url, "https://appleid.apple.com/auth/keys");
        assert_eq!(config.max_entries, 100);
        assert_eq!(config.ttl, Duration::from_secs(86400));
    }
}
