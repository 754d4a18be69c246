//! Subscribes to one market's ticker and prints every update.
//!
//! ```text
//! HUBFEED_URL=https://hub.example.com/c2 HUBFEED_MARKET=BTC-USD cargo run -p ticker-feed
//! ```
//!
//! Set `HUBFEED_API_KEY` and `HUBFEED_API_SECRET` to authenticate first.
//! `RUST_LOG=hubfeed=debug` shows reconnects and subscription replays.

use std::env;

use hubfeed::prelude::*;
use serde_json::Value;
use tracing::{error, info};

const DEFAULT_URL: &str = "ws://127.0.0.1:8080/hub";
const DEFAULT_MARKET: &str = "BTC-USD";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

struct Settings {
    url: String,
    market: String,
    credentials: Option<(String, String)>,
}

impl Settings {
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let credentials = match (lookup("HUBFEED_API_KEY"), lookup("HUBFEED_API_SECRET")) {
            (Some(key), Some(secret)) => Some((key, secret)),
            _ => None,
        };
        Self {
            url: lookup("HUBFEED_URL").unwrap_or_else(|| DEFAULT_URL.to_string()),
            market: lookup("HUBFEED_MARKET").unwrap_or_else(|| DEFAULT_MARKET.to_string()),
            credentials,
        }
    }
}

/// Logical subscription name for a market's ticker.
fn ticker_name(market: &str) -> String {
    format!("ticker_{market}")
}

fn print_update(market: &str, text: &str) {
    match serde_json::from_str::<Value>(text) {
        Ok(update) => println!("{market}: {update}"),
        Err(_) => println!("{market}: {text}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let settings = Settings::from_env();
    info!(url = %settings.url, market = %settings.market, "starting ticker feed");

    let manager = HubManagerBuilder::new()
        .map_function(&ticker_name(&settings.market), "SubscribeTicker")
        .websocket(settings.url.as_str());

    if let Some((key, secret)) = &settings.credentials {
        if !manager.authenticate_with_secret(key, secret).await? {
            error!("hub refused the credentials");
            return Ok(());
        }
    }

    let market = settings.market.clone();
    let handle = manager
        .open(
            &ticker_name(&settings.market),
            move |text| print_update(&market, text),
            vec![Value::from(settings.market.as_str())],
        )
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    manager.close(handle).await;
    manager.dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_settings_defaults() {
        let s = settings(&[]);
        assert_eq!(s.url, DEFAULT_URL);
        assert_eq!(s.market, DEFAULT_MARKET);
        assert!(s.credentials.is_none());
    }

    #[test]
    fn test_settings_credentials_need_key_and_secret() {
        assert!(settings(&[("HUBFEED_API_KEY", "k")]).credentials.is_none());
        let s = settings(&[("HUBFEED_API_KEY", "k"), ("HUBFEED_API_SECRET", "s")]);
        assert_eq!(s.credentials, Some(("k".to_string(), "s".to_string())));
    }

    #[test]
    fn test_ticker_name_uses_market() {
        assert_eq!(ticker_name("ETH-USD"), "ticker_ETH-USD");
    }
}
