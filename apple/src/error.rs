use jsonwebtoken::errors::ErrorKind;
use oauth::StatusCode;

/// Errors of the Sign in with Apple flow.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("driver is not initialized")]
    NotInitialized,

    #[error("missing authorization code")]
    MissingAuthorizationCode,

    #[error("state mismatch")]
    StateMismatch,

    #[error("token exchange failed: {payload}")]
    TokenExchangeFailed {
        status: Option<StatusCode>,
        payload: String,
    },

    #[error("failed to sign client secret: {0}")]
    ClientSecret(#[source] jsonwebtoken::errors::Error),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("invalid token signature")]
    SignatureInvalid,

    #[error("claim validation failed: {0}")]
    ClaimValidationFailed(#[from] ClaimError),

    #[error("unknown signing key: {0}")]
    UnknownSigningKey(String),

    #[error("key source unavailable: {0}")]
    KeySourceUnavailable(String),
}

/// Reason an otherwise well-signed identity token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ClaimError {
    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("missing claim: {0}")]
    MissingClaim(String),
}

impl Error {
    /// Maps a transport error of the token endpoint.
    pub(crate) fn token_exchange(err: oauth::Error) -> Self {
        match err {
            oauth::Error::UnexpectedStatusCode { status, body } => Self::TokenExchangeFailed {
                status: Some(status),
                payload: body,
            },
            err => Self::TokenExchangeFailed {
                status: None,
                payload: err.to_string(),
            },
        }
    }

    /// Maps a transport error of the key-set endpoint.
    pub(crate) fn key_source(err: oauth::Error) -> Self {
        Self::KeySourceUnavailable(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat => Self::SignatureInvalid,
            ErrorKind::ExpiredSignature => ClaimError::Expired.into(),
            ErrorKind::ImmatureSignature => ClaimError::NotYetValid.into(),
            ErrorKind::InvalidIssuer => ClaimError::IssuerMismatch.into(),
            ErrorKind::InvalidAudience => ClaimError::AudienceMismatch.into(),
            ErrorKind::MissingRequiredClaim(claim) => ClaimError::MissingClaim(claim.clone()).into(),
            _ => Self::MalformedToken(err.to_string()),
        }
    }
}
