use serde::Deserialize;

/// Token endpoint response of an OAuth 2.0 authorization-code exchange.
///
/// Every field is optional on the wire; providers decide which ones
/// are mandatory for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OAuth2Token {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
}
