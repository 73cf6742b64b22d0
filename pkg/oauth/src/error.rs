use reqwest::StatusCode;

/// OAuth errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to build request body")]
    BuildRequestBody(#[from] serde_urlencoded::ser::Error),

    #[error("failed to build http client")]
    BuildHttpClient,

    #[error("failed to send request: {0}")]
    SendRequest(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status code {status}: {body}")]
    UnexpectedStatusCode { status: StatusCode, body: String },

    #[error("failed to decode response: {0}")]
    DecodeResponse(#[from] serde_json::Error),

    #[error("parse URL: {0}")]
    ParseURL(#[from] url::ParseError),
}
