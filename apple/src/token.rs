use chrono::{DateTime, TimeDelta, Utc};
use common::Now;
use oauth::{OAuth2Token, Oauth2Exchange, TokenRequest};
use tracing::{info, instrument};

use crate::{config::AppleConfig, error::Error, models::AppleAccessToken};

/// Builds the authorization-code grant sent to the Apple token endpoint.
pub(crate) fn token_request(config: &AppleConfig, code: &str, client_secret: &str) -> TokenRequest {
    let mut request = TokenRequest::authorization_code(config.app_id(), config.callback_url(), code);
    request.field("client_secret", client_secret);
    request
}

/// Exchanges an authorization code at the Apple token endpoint.
///
/// `hook` runs after the default fields are set and may add or override
/// any of them.
///
/// # Errors
/// - [`Error::TokenExchangeFailed`] on transport errors, timeouts, non-2xx
///   responses and responses missing a required field
#[instrument(skip_all, fields(client_id = %config.app_id()), err)]
pub async fn exchange_code<E, N, F>(
    exchange: &E,
    now: &N,
    config: &AppleConfig,
    code: &str,
    client_secret: &str,
    hook: F,
) -> Result<AppleAccessToken, Error>
where
    E: Oauth2Exchange + ?Sized,
    N: Now,
    F: FnOnce(&mut TokenRequest),
{
    let mut request = token_request(config, code, client_secret);
    hook(&mut request);

    let token = exchange
        .exchange_code(&config.endpoints().token_url, &request)
        .await
        .map_err(Error::token_exchange)?;

    let token = access_token(token, now.now())?;
    info!(expires_at = %token.expires_at, "exchanged authorization code");
    Ok(token)
}

fn access_token(token: OAuth2Token, received_at: DateTime<Utc>) -> Result<AppleAccessToken, Error> {
    let access_token = required(token.access_token, "access_token")?;
    let id_token = required(token.id_token, "id_token")?;
    let expires_in = required(token.expires_in, "expires_in")?;

    let expires_at = i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| received_at.checked_add_signed(lifetime))
        .ok_or_else(|| missing_field("valid expires_in"))?;

    Ok(AppleAccessToken {
        token: access_token,
        token_type: token.token_type.unwrap_or_else(|| "bearer".to_string()),
        id_token,
        refresh_token: token.refresh_token,
        expires_in,
        expires_at,
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, Error> {
    value.ok_or_else(|| missing_field(field))
}

fn missing_field(field: &str) -> Error {
    Error::TokenExchangeFailed {
        status: None,
        payload: format!("token response has no {field}"),
    }
}
