//! Sign in with Apple: authorization-code exchange and identity-token
//! verification.
mod client_secret;
mod config;
mod driver;
mod error;
#[cfg(test)]
mod fixture;
mod jwks;
mod models;
mod token;
mod verifier;
pub use client_secret::CLIENT_SECRET_TTL;
pub use client_secret::ClientSecretClaims;
pub use client_secret::generate_client_secret;
pub use config::APPLE_ISSUER;
pub use config::AppleConfig;
pub use config::AppleEndpoints;
pub use config::DEFAULT_SCOPES;
pub use config::SigningKeyCacheConfig;
pub use driver::ACCESS_DENIED_ERRORS;
pub use driver::AppleDriver;
pub use driver::CallbackParams;
pub use driver::DriverState;
pub use driver::StateStore;
pub use error::ClaimError;
pub use error::Error;
pub use jwks::SigningKey;
pub use jwks::SigningKeyCache;
pub use models::AppleAccessToken;
pub use models::AppleIdTokenClaims;
pub use models::AppleName;
pub use models::AppleUser;
pub use models::AppleUserClaim;
pub use models::BearerToken;
pub use models::ClaimFlag;
pub use models::EmailVerificationState;
pub use token::exchange_code;
pub use verifier::IdentityTokenVerifier;
