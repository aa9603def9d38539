use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::Value as JsonValue;

use super::datasource::PositionSource;
use crate::{
    error::{Result, TrackerError},
    position::{decimal_from_json, Position},
    settings::Settings,
};

const PLATFORM: &str = "Trading212";

pub struct Trading212PositionSource {
    client: Arc<Client>,
    api_url: String,
    api_token: String,
}

impl Trading212PositionSource {
    pub fn new(client: Arc<Client>, api_url: String, api_token: String) -> Trading212PositionSource {
        Trading212PositionSource {
            client,
            api_url,
            api_token,
        }
    }

    pub fn from_settings(client: Arc<Client>, settings: &Settings) -> Result<Trading212PositionSource> {
        Ok(Trading212PositionSource::new(
            client,
            settings.trading212_api_url.clone(),
            Settings::require(&settings.trading212_api_token, "TRADING212_API_TOKEN")?.to_owned(),
        ))
    }

    async fn query_portfolio(&self) -> Result<JsonValue> {
        let resp_payload = self
            .client
            .get(&self.api_url)
            .header("Authorization", &self.api_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp_payload.json().await?)
    }
}

#[async_trait]
impl PositionSource for Trading212PositionSource {
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let response = self.query_portfolio().await?;
        let holdings = response
            .as_array()
            .ok_or_else(|| TrackerError::Parse("Trading212: result is not array".to_owned()))?;
        info!("Trading212: {} holdings", holdings.len());
        holdings
            .iter()
            .map(|holding| {
                let ticker = holding["ticker"]
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| TrackerError::Parse("Trading212: holding without ticker".to_owned()))?;
                let price = decimal_from_json(&holding["currentPrice"]).unwrap_or_default();
                let quantity = decimal_from_json(&holding["quantity"]).unwrap_or_default();
                Ok(Position::new(ticker, price * quantity, PLATFORM))
            })
            .collect()
    }
}
