use std::{collections::HashMap, error::Error, sync::Arc};

use apple::{AppleConfig, AppleDriver, SigningKeyCache, StateStore};
use common::SystemNow;
use dotenv::dotenv;
use oauth::{OAuth, ReqwestHttpClient};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Holds the state of a single redirect for the lifetime of the process.
#[derive(Default)]
struct OneShotStateStore {
    state: Option<String>,
}

impl StateStore for OneShotStateStore {
    fn issue_state(&mut self) -> String {
        let state = <OAuth<ReqwestHttpClient>>::generate_state();
        self.state = Some(state.clone());
        state
    }

    fn take_state(&mut self) -> Option<String> {
        self.state.take()
    }
}

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    init_tracing();

    let config = AppleConfig::from_env()?;

    let http = ReqwestHttpClient::new(ReqwestHttpClient::DEFAULT_TIMEOUT)?;
    let keys = Arc::new(SigningKeyCache::new(
        http.clone(),
        config.signing_key_cache_config(),
    ));
    let exchange: OAuth<ReqwestHttpClient> = OAuth::new(http);
    let mut driver = AppleDriver::new(
        config,
        exchange,
        keys,
        OneShotStateStore::default(),
        SystemNow,
    )?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {
            driver.initialize(&HashMap::<String, String>::new());
            println!("{}", driver.redirect_url()?);
        }
        [command, token] if command == "verify" => {
            let user = driver.user_from_token(token).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        _ => return Err("usage: apple [verify <identity-token>]".into()),
    }

    Ok(())
}
