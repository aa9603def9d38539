use async_trait::async_trait;
use log::info;

use super::{
    cryptocom_socket::{Credentials, ExchangeSocketClient, SocketTimings},
    datasource::PositionSource,
};
use crate::{error::Result, position::Position, settings::Settings};

/// Balances from the Crypto.com Exchange, read over a fresh WebSocket session per fetch.
pub struct CryptoComPositionSource {
    url: String,
    credentials: Credentials,
    timings: SocketTimings,
}

impl CryptoComPositionSource {
    pub fn new(url: String, credentials: Credentials) -> CryptoComPositionSource {
        CryptoComPositionSource {
            url,
            credentials,
            timings: SocketTimings::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<CryptoComPositionSource> {
        let credentials = Credentials {
            api_key: Settings::require(&settings.cryptocom_api_key, "CRYPTOCOM_API_KEY")?.to_owned(),
            api_secret: Settings::require(&settings.cryptocom_api_secret, "CRYPTOCOM_API_SECRET")?
                .to_owned(),
        };
        Ok(CryptoComPositionSource::new(
            settings.cryptocom_ws_url.clone(),
            credentials,
        ))
    }

    pub fn with_timings(mut self, timings: SocketTimings) -> CryptoComPositionSource {
        self.timings = timings;
        self
    }
}

#[async_trait]
impl PositionSource for CryptoComPositionSource {
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let mut client = ExchangeSocketClient::new(self.url.clone(), self.credentials.clone(), self.timings);
        let positions = client.fetch_balances().await?;
        info!("Crypto.com: {} currencies with a balance", positions.len());
        Ok(positions)
    }
}
