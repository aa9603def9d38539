use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use super::datasource::PositionSource;
use crate::{
    error::{Result, TrackerError},
    position::{decimal_from_json, Position},
    settings::Settings,
    signing::hmac_sha256_hex,
};

pub const BINANCE_API_URL: &str = "https://api.binance.com";
const PLATFORM: &str = "Binance";
const STABLECOINS: &[&str] = &["USDT", "USDC"];

pub struct BinancePositionSource {
    client: Arc<Client>,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BinancePositionSource {
    pub fn new(client: Arc<Client>, api_key: String, api_secret: String) -> BinancePositionSource {
        BinancePositionSource {
            client,
            api_key,
            api_secret,
            base_url: BINANCE_API_URL.to_owned(),
        }
    }

    pub fn from_settings(client: Arc<Client>, settings: &Settings) -> Result<BinancePositionSource> {
        Ok(BinancePositionSource::new(
            client,
            Settings::require(&settings.binance_api_key, "BINANCE_API_KEY")?.to_owned(),
            Settings::require(&settings.binance_api_secret, "BINANCE_API_SECRET")?.to_owned(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> BinancePositionSource {
        self.base_url = base_url.into();
        self
    }

    async fn query_account(&self) -> Result<JsonValue> {
        let query = format!("timestamp={}", Utc::now().timestamp_millis());
        let signature = hmac_sha256_hex(&self.api_secret, &query)?;
        let resp_payload = self
            .client
            .get(&format!(
                "{}/api/v3/account?{}&signature={}",
                self.base_url, query, signature
            ))
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        info!("Binance account response code: {}", resp_payload.status());
        let response: JsonValue = resp_payload.json().await?;
        check_error(&response)?;
        Ok(response)
    }

    async fn query_prices(&self) -> Result<HashMap<String, Decimal>> {
        let response: JsonValue = self
            .client
            .get(&format!("{}/api/v3/ticker/price", self.base_url))
            .send()
            .await?
            .json()
            .await?;
        check_error(&response)?;
        let tickers = response
            .as_array()
            .ok_or_else(|| TrackerError::Parse("Binance prices: result is not array".to_owned()))?;
        Ok(tickers
            .iter()
            .filter_map(|t| Some((t["symbol"].as_str()?.to_owned(), decimal_from_json(&t["price"])?)))
            .collect())
    }
}

fn check_error(response: &JsonValue) -> Result<()> {
    if response["msg"] != JsonValue::Null {
        return Err(TrackerError::Exchange {
            code: response["code"].as_i64().unwrap_or_default(),
            message: format!("Binance: {}", response["msg"]),
        });
    }
    Ok(())
}

/// Simple Earn balances are reported as `LD<asset>`.
fn clean_asset_name(asset: &str) -> &str {
    asset.strip_prefix("LD").filter(|rest| !rest.is_empty()).unwrap_or(asset)
}

fn value_balances(account: &JsonValue, prices: &HashMap<String, Decimal>) -> Result<Vec<Position>> {
    let balances = account["balances"]
        .as_array()
        .ok_or_else(|| TrackerError::Parse("Binance account: missing balances".to_owned()))?;
    let mut positions = vec![];
    for balance in balances {
        let asset = balance["asset"].as_str().unwrap_or_default();
        let free = decimal_from_json(&balance["free"]).unwrap_or_default();
        let locked = decimal_from_json(&balance["locked"]).unwrap_or_default();
        let amount = free + locked;
        if asset.is_empty() || amount <= Decimal::ZERO {
            continue;
        }
        let name = clean_asset_name(asset);
        let worth = if STABLECOINS.contains(&name) {
            amount
        } else if let Some(price) = prices.get(&format!("{}USDT", name)) {
            amount * price
        } else {
            warn!("Binance: no USDT price for {}, skipping", asset);
            continue;
        };
        let position = Position::new(name, worth, PLATFORM);
        if !position.is_dust() {
            positions.push(position);
        }
    }
    Ok(positions)
}

#[async_trait]
impl PositionSource for BinancePositionSource {
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let account = self.query_account().await?;
        let prices = self.query_prices().await?;
        value_balances(&account, &prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn earn_prefix_is_stripped() {
        assert_eq!(clean_asset_name("LDBTC"), "BTC");
        assert_eq!(clean_asset_name("ETH"), "ETH");
        assert_eq!(clean_asset_name("LD"), "LD");
    }

    #[tokio::test]
    async fn values_balances_against_usdt_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .and(header("X-MBX-APIKEY", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balances": [
                    {"asset": "BTC", "free": "0.5", "locked": "0.25"},
                    {"asset": "LDETH", "free": "2", "locked": "0"},
                    {"asset": "USDT", "free": "100.10", "locked": "0"},
                    {"asset": "USDC", "free": "4", "locked": "1"},
                    {"asset": "DOGE", "free": "10", "locked": "0"},
                    {"asset": "NOPRICE", "free": "10", "locked": "0"},
                    {"asset": "BNB", "free": "0", "locked": "0"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "price": "60000.00"},
                {"symbol": "ETHUSDT", "price": "3000.5"},
                {"symbol": "DOGEUSDT", "price": "0.1"}
            ])))
            .mount(&server)
            .await;

        let source = BinancePositionSource::new(Arc::new(Client::new()), "key".into(), "secret".into())
            .with_base_url(server.uri());
        let positions = source.fetch_positions().await.unwrap();
        let summary: Vec<_> = positions
            .iter()
            .map(|p| (p.name.as_str(), p.worth, p.platform.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("BTC", dec!(45000.00), "Binance"),
                ("ETH", dec!(6001.0), "Binance"),
                ("USDT", dec!(100.10), "Binance"),
                ("USDC", dec!(5), "Binance"),
            ]
        );
    }

    #[tokio::test]
    async fn api_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": -2014,
                "msg": "API-key format invalid."
            })))
            .mount(&server)
            .await;

        let source = BinancePositionSource::new(Arc::new(Client::new()), "key".into(), "secret".into())
            .with_base_url(server.uri());
        match source.fetch_positions().await {
            Err(TrackerError::Exchange { code, message }) => {
                assert_eq!(code, -2014);
                assert!(message.contains("API-key format invalid"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
