use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{APPLE_ISSUER, AppleConfig},
    error::Error,
};

/// Lifetime of a client secret in seconds.
pub const CLIENT_SECRET_TTL: i64 = 60;

/// Claims of the client secret sent to the Apple token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecretClaims {
    /// Team id.
    pub iss: String,
    /// Services ID.
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl ClientSecretClaims {
    fn new(config: &AppleConfig, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            iss: config.team_id().to_string(),
            sub: config.app_id().to_string(),
            aud: APPLE_ISSUER.to_string(),
            iat,
            exp: iat + CLIENT_SECRET_TTL,
        }
    }
}

/// Signs a short-lived ES256 client secret with the configured private key.
///
/// Apple requires a fresh secret for every token request, so the result is
/// never cached.
pub fn generate_client_secret(config: &AppleConfig, now: DateTime<Utc>) -> Result<String, Error> {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(config.key_id().to_string());

    let key = config.encoding_key()?;
    encode(&header, &ClientSecretClaims::new(config, now), &key).map_err(Error::ClientSecret)
}

#[cfg(test)]
mod tests {
    use common::{Now, mock::MockNow};
    use jsonwebtoken::{DecodingKey, TokenData, Validation, decode, decode_header};

    use super::*;
    use crate::fixture::{CLIENT_SECRET_PUBLIC_KEY, fixture_config};

    fn decode_secret(secret: &str) -> TokenData<ClientSecretClaims> {
        let key = DecodingKey::from_ec_pem(CLIENT_SECRET_PUBLIC_KEY.as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&[APPLE_ISSUER]);
        validation.validate_exp = false;
        decode(secret, &key, &validation).unwrap()
    }

    #[test]
    fn test_generate_client_secret() {
        // given
        let config = fixture_config(|c| c);
        let now = MockNow::default_time().now();

        // when
        let secret = generate_client_secret(&config, now).unwrap();

        // then
        let got = decode_secret(&secret);
        assert_eq!(got.header.alg, Algorithm::ES256);
        assert_eq!(got.header.kid.as_deref(), Some("KEYID12345"));
        assert_eq!(
            got.claims,
            ClientSecretClaims {
                iss: "TEAMID1234".to_string(),
                sub: "com.example.app".to_string(),
                aud: "https://appleid.apple.com".to_string(),
                iat: 1577836800,
                exp: 1577836860,
            }
        );
    }

    #[test]
    fn test_generate_client_secret_is_stable_for_same_input() {
        // given
        let config = fixture_config(|c| c);
        let now = MockNow::default_time().now();

        // when
        let first = generate_client_secret(&config, now).unwrap();
        let second = generate_client_secret(&config, now).unwrap();

        // then
        assert_eq!(
            decode_header(&first).unwrap(),
            decode_header(&second).unwrap()
        );
        let first = decode_secret(&first).claims;
        let second = decode_secret(&second).claims;
        assert_eq!(first, second);
        assert_eq!(first.exp - first.iat, CLIENT_SECRET_TTL);
    }
}
