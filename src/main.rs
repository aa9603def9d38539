use std::{sync::Arc, time::Duration};

use anyhow::Result;
use folio::{
    api::{create_router, AppState},
    datasources::{
        BinancePositionSource, CryptoComPositionSource, DebankPositionSource, PositionSource,
        Trading212PositionSource, UnconfiguredSource,
    },
    schedule::ScheduleStore,
    scheduler::Scheduler,
    settings::Settings,
    sinks::NotionSink,
    tracker::PortfolioTracker,
    TrackerError,
};
use log::{info, warn};
use reqwest::Client;

fn register(
    tracker: PortfolioTracker,
    name: &str,
    source: folio::Result<impl PositionSource + 'static>,
) -> PortfolioTracker {
    match source {
        Ok(source) => {
            info!("Source {} enabled", name);
            tracker.register(name, Arc::new(source))
        }
        Err(e) => {
            let reason = match e {
                TrackerError::Config(reason) => reason,
                other => other.to_string(),
            };
            warn!("Source {} disabled: {}", name, reason);
            tracker.register(name, Arc::new(UnconfiguredSource::new(reason)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env()?;
    let client = Arc::new(
        Client::builder()
            .user_agent("folio 0.1.0")
            .timeout(Duration::from_secs(30))
            .build()?,
    );

    let sink = NotionSink::from_settings(client.clone(), &settings)?;
    let mut tracker = PortfolioTracker::new(Arc::new(sink));
    tracker = register(
        tracker,
        "Trading212",
        Trading212PositionSource::from_settings(client.clone(), &settings),
    );
    tracker = register(tracker, "Debank", DebankPositionSource::from_settings(&settings));
    tracker = register(tracker, "CryptoCom", CryptoComPositionSource::from_settings(&settings));
    tracker = register(
        tracker,
        "Binance",
        BinancePositionSource::from_settings(client.clone(), &settings),
    );
    let tracker = Arc::new(tracker);

    let store = Arc::new(ScheduleStore::new());
    let scheduler = Scheduler::new(tracker.clone(), store.clone(), settings.scheduler_tick);
    tokio::spawn(async move { scheduler.run().await });

    let app = create_router(Arc::new(AppState { tracker, store }));
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Listening on {}", settings.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
