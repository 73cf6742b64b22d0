mod error;
mod http;
mod models;
mod oauth;
mod random;
pub use error::Error;
pub use http::HttpClient;
pub use http::HttpResponse;
pub use http::ReqwestHttpClient;
pub use models::OAuth2Token;
pub use oauth::OAuth;
pub use oauth::Oauth2Exchange;
pub use oauth::RedirectRequest;
pub use oauth::TokenRequest;
pub use oauth::constant_time_equal;
pub use random::RandomSource;
pub use random::SecureRandom;

#[cfg(feature = "mock")]
pub use http::MockHttpClient;
#[cfg(feature = "mock")]
pub use random::mock;

pub use reqwest::StatusCode;
