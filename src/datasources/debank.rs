use async_trait::async_trait;

use super::{
    datasource::PositionSource,
    scraper::{BrowserLauncher, ScrapingAdapter, WebDriverLauncher},
};
use crate::{
    error::{Result, TrackerError},
    position::Position,
    settings::{ProfileTarget, Settings},
};

/// DeFi holdings scraped from DeBank profile pages, one profile after another.
pub struct DebankPositionSource<L> {
    adapter: ScrapingAdapter<L>,
    profiles: Vec<ProfileTarget>,
}

impl<L: BrowserLauncher> DebankPositionSource<L> {
    pub fn new(adapter: ScrapingAdapter<L>, profiles: Vec<ProfileTarget>) -> Result<DebankPositionSource<L>> {
        if profiles.is_empty() {
            return Err(TrackerError::Config("no DeBank profiles configured".to_owned()));
        }
        Ok(DebankPositionSource { adapter, profiles })
    }
}

impl DebankPositionSource<WebDriverLauncher> {
    pub fn from_settings(settings: &Settings) -> Result<DebankPositionSource<WebDriverLauncher>> {
        let launcher = WebDriverLauncher::new(settings.webdriver_url.clone());
        DebankPositionSource::new(ScrapingAdapter::new(launcher), settings.debank_profiles.clone())
    }
}

#[async_trait]
impl<L: BrowserLauncher> PositionSource for DebankPositionSource<L> {
    /// A profile that cannot be scraped contributes nothing; it does not fail the source.
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let mut positions = vec![];
        for profile in &self.profiles {
            positions.extend(self.adapter.scrape_profile(profile).await);
        }
        Ok(positions)
    }
}
