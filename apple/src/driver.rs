use std::{collections::HashMap, sync::Arc};

use common::{Now, SystemNow};
use oauth::{HttpClient, Oauth2Exchange, RedirectRequest, TokenRequest, constant_time_equal};
use tracing::{debug, instrument};

use crate::{
    client_secret::generate_client_secret,
    config::AppleConfig,
    error::Error,
    jwks::SigningKeyCache,
    models::{AppleAccessToken, AppleUser, BearerToken},
    token,
    verifier::IdentityTokenVerifier,
};

/// Error values Apple sends when the user declines the authorization.
pub const ACCESS_DENIED_ERRORS: &[&str] = &["user_denied", "user_cancelled_authorize"];

/// Read access to the parameters of an incoming request.
pub trait CallbackParams {
    fn input(&self, name: &str) -> Option<String>;
}

impl CallbackParams for HashMap<String, String> {
    fn input(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Session-backed storage of the OAuth `state` token.
pub trait StateStore: Send {
    /// Issues a new state token and remembers it.
    fn issue_state(&mut self) -> String;

    /// Returns the remembered state token and forgets it.
    fn take_state(&mut self) -> Option<String>;
}

/// Where the driver is in the authorization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Idle,
    RedirectBuilt,
    ErrorReceived,
    CodeReceived,
    Exchanged,
    Verified,
}

#[derive(Debug, Default)]
struct Callback {
    code: Option<String>,
    error: Option<String>,
    state: Option<String>,
}

/// Sign in with Apple driver for a single request.
///
/// A driver is created per request and [`initialized`](Self::initialize)
/// with it. The [`SigningKeyCache`] is shared between drivers.
pub struct AppleDriver<E, H, S, N = SystemNow> {
    config: AppleConfig,
    exchange: E,
    verifier: IdentityTokenVerifier<H, N>,
    state_store: S,
    now: N,
    phase: DriverState,
    callback: Option<Callback>,
    expected_state: Option<String>,
}

impl<E, H, S, N> AppleDriver<E, H, S, N>
where
    E: Oauth2Exchange,
    H: HttpClient,
    S: StateStore,
    N: Now,
{
    /// Creates an uninitialized driver.
    ///
    /// `keys` must fetch from the key-set endpoint of `config`, see
    /// [`AppleConfig::signing_key_cache_config`].
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] if `keys` fetches from another endpoint
    pub fn new(
        config: AppleConfig,
        exchange: E,
        keys: Arc<SigningKeyCache<H, N>>,
        state_store: S,
        now: N,
    ) -> Result<Self, Error> {
        let verifier = IdentityTokenVerifier::new(keys, &config)?;
        Ok(Self {
            config,
            exchange,
            verifier,
            state_store,
            now,
            phase: DriverState::Uninitialized,
            callback: None,
            expected_state: None,
        })
    }

    /// Loads the stored state and captures `code`, `error` and `state`
    /// from the request.
    pub fn initialize(&mut self, request: &impl CallbackParams) {
        self.expected_state = self.state_store.take_state();
        let callback = Callback {
            code: request.input("code"),
            error: request.input("error"),
            state: request.input("state"),
        };

        self.phase = if callback.error.is_some() {
            DriverState::ErrorReceived
        } else if callback.code.is_some() {
            DriverState::CodeReceived
        } else {
            DriverState::Idle
        };
        debug!(state = ?self.phase, "initialized apple driver");
        self.callback = Some(callback);
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.phase
    }

    /// Builds the authorization redirect and issues a fresh state token.
    pub fn build_redirect_parameters(&mut self) -> Result<RedirectRequest, Error> {
        self.ensure_initialized()?;

        let mut request = RedirectRequest::new(
            &self.config.endpoints().authorize_url,
            self.config.app_id(),
            self.config.callback_url(),
        );
        request
            .scopes(self.config.scopes())
            .param("response_type", "code")
            .param("response_mode", "form_post")
            .param("grant_type", "authorization_code")
            .param("state", &self.state_store.issue_state());

        self.phase = DriverState::RedirectBuilt;
        Ok(request)
    }

    /// Returns the authorization URL the user agent is redirected to.
    pub fn redirect_url(&mut self) -> Result<String, Error> {
        let request = self.build_redirect_parameters()?;
        self.exchange
            .redirect_url(&request)
            .map_err(|e| Error::InvalidConfig(format!("invalid authorize url: {e}")))
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.callback.as_ref()?.code.as_deref()
    }

    #[must_use]
    pub fn has_code(&self) -> bool {
        self.code().is_some()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.callback.as_ref()?.error.as_deref()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// Whether the user declined the authorization.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        self.error()
            .is_some_and(|error| ACCESS_DENIED_ERRORS.contains(&error))
    }

    /// Whether the echoed state is missing or differs from the issued one.
    #[must_use]
    pub fn state_mismatch(&self) -> bool {
        let echoed = self.callback.as_ref().and_then(|c| c.state.as_deref());
        match (self.expected_state.as_deref(), echoed) {
            (Some(expected), Some(echoed)) => {
                !constant_time_equal(expected.as_bytes(), echoed.as_bytes())
            }
            _ => true,
        }
    }

    /// Exchanges the received authorization code for tokens.
    ///
    /// `hook` may add or override token request fields.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`initialize`](Self::initialize)
    /// - [`Error::MissingAuthorizationCode`] if the request carried an error
    ///   or no code
    /// - [`Error::StateMismatch`] if the echoed state is not the issued one
    /// - [`Error::TokenExchangeFailed`] if Apple rejected the exchange
    pub async fn access_token<F>(&mut self, hook: F) -> Result<AppleAccessToken, Error>
    where
        F: FnOnce(&mut TokenRequest),
    {
        let callback = self.callback.as_ref().ok_or(Error::NotInitialized)?;
        if let Some(error) = &callback.error {
            debug!(%error, "authorization callback carried an error");
            return Err(Error::MissingAuthorizationCode);
        }
        let code = callback
            .code
            .clone()
            .ok_or(Error::MissingAuthorizationCode)?;
        if self.state_mismatch() {
            return Err(Error::StateMismatch);
        }

        let client_secret = generate_client_secret(&self.config, self.now.now())?;
        let token = token::exchange_code(
            &self.exchange,
            &self.now,
            &self.config,
            &code,
            &client_secret,
            hook,
        )
        .await?;

        self.phase = DriverState::Exchanged;
        Ok(token)
    }

    /// Exchanges the authorization code and verifies the returned identity
    /// token.
    #[instrument(skip_all, err)]
    pub async fn user<F>(&mut self, hook: F) -> Result<AppleUser<AppleAccessToken>, Error>
    where
        F: FnOnce(&mut TokenRequest),
    {
        let token = self.access_token(hook).await?;
        let claims = self.verifier.verify(&token.id_token).await?;

        self.phase = DriverState::Verified;
        Ok(claims.into_user(token))
    }

    /// Verifies an identity token the client already holds.
    #[instrument(skip_all, err)]
    pub async fn user_from_token(&self, token: &str) -> Result<AppleUser<BearerToken>, Error> {
        let claims = self.verifier.verify(token).await?;
        Ok(claims.into_user(BearerToken::new(token)))
    }

    fn ensure_initialized(&self) -> Result<(), Error> {
        match self.phase {
            DriverState::Uninitialized => Err(Error::NotInitialized),
            _ => Ok(()),
        }
    }
}
