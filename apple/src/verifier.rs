use std::sync::Arc;

use common::{Now, SystemNow};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use oauth::HttpClient;
use tracing::{debug, instrument};

use crate::{
    config::{APPLE_ISSUER, AppleConfig},
    error::Error,
    jwks::SigningKeyCache,
    models::AppleIdTokenClaims,
};

/// Algorithms Apple may sign identity tokens with.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Verifies Apple identity tokens against the published signing keys.
pub struct IdentityTokenVerifier<H, N = SystemNow> {
    keys: Arc<SigningKeyCache<H, N>>,
    issuer: String,
    audience: Option<String>,
}

impl<H: HttpClient, N: Now> IdentityTokenVerifier<H, N> {
    /// Creates a verifier expecting [`AppleConfig::app_id`] as audience,
    /// unless strict audience validation is disabled.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] if `keys` fetches from another key-set
    ///   endpoint than `config`
    pub fn new(keys: Arc<SigningKeyCache<H, N>>, config: &AppleConfig) -> Result<Self, Error> {
        let jwks_url = config.endpoints().jwks_url.as_str();
        if keys.jwks_url() != jwks_url {
            return Err(Error::InvalidConfig(format!(
                "signing key cache fetches {} but the configured key-set endpoint is {jwks_url}",
                keys.jwks_url()
            )));
        }

        Ok(Self {
            keys,
            issuer: APPLE_ISSUER.to_string(),
            audience: config.strict_audience().then(|| config.app_id().to_string()),
        })
    }

    /// Verifies the signature and standard claims of `token`.
    ///
    /// # Errors
    /// - [`Error::MalformedToken`] if the token cannot be decoded or has no `kid`
    /// - [`Error::SignatureInvalid`] on a bad signature, or a disallowed
    ///   algorithm with a known key
    /// - [`Error::ClaimValidationFailed`] on expired tokens, wrong issuer or audience,
    ///   or missing claims
    /// - signing key lookup errors, unchanged
    #[instrument(skip_all, err)]
    pub async fn verify(&self, token: &str) -> Result<AppleIdTokenClaims, Error> {
        let header = decode_header(token).map_err(|e| Error::MalformedToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| Error::MalformedToken("missing kid".to_string()))?;

        let key = self.keys.get_signing_key(&kid).await?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            debug!(alg = ?header.alg, "identity token signed with disallowed algorithm");
            return Err(Error::SignatureInvalid);
        }

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        match &self.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
            }
            None => {
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "iss", "sub"]);
            }
        }

        // Validate before deserializing so missing claims surface as such.
        let data = decode::<serde_json::Value>(token, &key.decoding_key, &validation)?;
        let claims: AppleIdTokenClaims = serde_json::from_value(data.claims)
            .map_err(|e| Error::MalformedToken(e.to_string()))?;

        debug!(sub = %claims.sub, "verified identity token");
        Ok(claims)
    }
}
