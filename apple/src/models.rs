use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens returned by Apple for an authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppleAccessToken {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Minimal token reference for users resolved from a bare identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BearerToken {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailVerificationState {
    Verified,
    Unverified,
    Unsupported,
}

/// Normalized user returned by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleUser<T> {
    pub id: String,
    pub nick_name: String,
    pub name: String,
    pub email: Option<String>,
    pub email_verification_state: EmailVerificationState,
    /// Apple never shares an avatar.
    pub avatar_url: Option<String>,
    pub token: T,
}

/// Boolean claim that Apple sends either as JSON bool or as `"true"`/`"false"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimFlag {
    Bool(bool),
    Text(String),
}

impl ClaimFlag {
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(value) => value == "true",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleName {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User details Apple only includes on the first authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleUserClaim {
    pub email: Option<String>,
    pub name: Option<AppleName>,
}

/// Verified claims of an Apple identity token.
///
/// <https://developer.apple.com/documentation/sign_in_with_apple/authenticating-users-with-sign-in-with-apple>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleIdTokenClaims {
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    /// Stable user identifier, unique per developer team.
    pub sub: String,
    pub at_hash: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<ClaimFlag>,
    pub is_private_email: Option<ClaimFlag>,
    pub auth_time: Option<i64>,
    pub nonce: Option<String>,
    pub nonce_supported: Option<bool>,
    pub user: Option<AppleUserClaim>,
}

impl AppleIdTokenClaims {
    /// First and last name joined by a space, empty when Apple sent no name.
    #[must_use]
    pub fn display_name(&self) -> String {
        let Some(name) = self.user.as_ref().and_then(|user| user.name.as_ref()) else {
            return String::new();
        };
        [name.first_name.as_deref(), name.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[must_use]
    pub fn email_verification_state(&self) -> EmailVerificationState {
        match &self.email_verified {
            Some(flag) if flag.is_true() => EmailVerificationState::Verified,
            _ => EmailVerificationState::Unverified,
        }
    }

    /// Converts the claims into an [`AppleUser`] carrying `token`.
    pub fn into_user<T>(self, token: T) -> AppleUser<T> {
        let name = self.display_name();
        let email_verification_state = self.email_verification_state();
        let email = self
            .email
            .or_else(|| self.user.and_then(|user| user.email));

        AppleUser {
            id: self.sub.clone(),
            nick_name: self.sub,
            name,
            email,
            email_verification_state,
            avatar_url: None,
            token,
        }
    }
}
