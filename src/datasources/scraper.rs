//! Headless-browser extraction of (name, worth) rows from a rendered portfolio page.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use fantoccini::{wd::Capabilities, Client, ClientBuilder, Locator};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::{sleep, Instant};

use crate::{
    error::Result,
    position::Position,
    settings::ProfileTarget,
};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// A live browser tab. Dropping it without `quit` may leak the browser process.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    /// Fails with `TrackerError::Timeout` when nothing matches `selector` within `limit`.
    async fn wait_for(&mut self, selector: &str, limit: Duration) -> Result<()>;
    async fn count(&mut self, selector: &str) -> Result<usize>;
    async fn texts(&mut self, selector: &str) -> Result<Vec<String>>;
    async fn quit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Starts headless Chrome sessions through a WebDriver endpoint such as chromedriver.
pub struct WebDriverLauncher {
    webdriver_url: String,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: String) -> WebDriverLauncher {
        WebDriverLauncher { webdriver_url }
    }

    fn capabilities() -> Capabilities {
        let mut caps = Capabilities::new();
        caps.insert(
            "goog:chromeOptions".to_owned(),
            json!({
                "args": [
                    "--headless",
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--disable-gpu",
                    format!("--window-size={},{}", WINDOW_SIZE.0, WINDOW_SIZE.1),
                    format!("--user-agent={}", USER_AGENT),
                ]
            }),
        );
        caps
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let client = ClientBuilder::native()
            .capabilities(WebDriverLauncher::capabilities())
            .connect(&self.webdriver_url)
            .await?;
        client.set_window_size(WINDOW_SIZE.0, WINDOW_SIZE.1).await?;
        debug!("WebDriver session started at {}", self.webdriver_url);
        Ok(Box::new(WebDriverSession { client }))
    }
}

struct WebDriverSession {
    client: Client,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        Ok(self.client.goto(url).await?)
    }

    async fn wait_for(&mut self, selector: &str, limit: Duration) -> Result<()> {
        self.client
            .wait()
            .at_most(limit)
            .for_element(Locator::Css(selector))
            .await?;
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        Ok(self.client.find_all(Locator::Css(selector)).await?.len())
    }

    async fn texts(&mut self, selector: &str) -> Result<Vec<String>> {
        let mut texts = vec![];
        for element in self.client.find_all(Locator::Css(selector)).await? {
            texts.push(element.text().await?);
        }
        Ok(texts)
    }

    async fn quit(self: Box<Self>) -> Result<()> {
        Ok(self.client.close().await?)
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeSelectors {
    pub name: String,
    pub worth: String,
}

impl Default for ScrapeSelectors {
    fn default() -> Self {
        ScrapeSelectors {
            name: ".ProjectCell_assetsItemNameText__l9fan".to_owned(),
            worth: ".ProjectCell_assetsItemWorth__EMwu2".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScrapeTimings {
    /// How long the first worth cell may take to appear.
    pub element_wait: Duration,
    /// Upper bound on waiting for late rows after the first one shows up.
    pub settle_window: Duration,
    pub poll_interval: Duration,
}

impl Default for ScrapeTimings {
    fn default() -> Self {
        ScrapeTimings {
            element_wait: Duration::from_secs(7),
            settle_window: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// `"$1,234.56"` -> `1234.56`. Anything unreadable is worth nothing.
pub fn parse_worth(text: &str) -> Decimal {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Pairs names and worths by position, keeping rows at or above the dust threshold.
pub fn pair_rows(names: &[String], worths: &[String], platform: &str) -> Vec<Position> {
    if names.len() != worths.len() {
        warn!(
            "{}: {} name cells but {} worth cells, pairing the first {}",
            platform,
            names.len(),
            worths.len(),
            names.len().min(worths.len())
        );
    }
    names
        .iter()
        .zip(worths)
        .filter_map(|(name, worth)| {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Position::new(name, parse_worth(worth), platform)).filter(|p| !p.is_dust())
        })
        .collect()
}

pub struct ScrapingAdapter<L> {
    launcher: L,
    selectors: ScrapeSelectors,
    timings: ScrapeTimings,
}

impl<L: BrowserLauncher> ScrapingAdapter<L> {
    pub fn new(launcher: L) -> ScrapingAdapter<L> {
        ScrapingAdapter {
            launcher,
            selectors: ScrapeSelectors::default(),
            timings: ScrapeTimings::default(),
        }
    }

    pub fn with_selectors(mut self, selectors: ScrapeSelectors) -> ScrapingAdapter<L> {
        self.selectors = selectors;
        self
    }

    pub fn with_timings(mut self, timings: ScrapeTimings) -> ScrapingAdapter<L> {
        self.timings = timings;
        self
    }

    /// Scrapes one profile. Failures are logged and yield no positions.
    pub async fn scrape_profile(&self, target: &ProfileTarget) -> Vec<Position> {
        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => {
                error!("{}: could not start browser: {}", target.platform, e);
                return vec![];
            }
        };
        let outcome = self.extract(session.as_mut(), target).await;
        if let Err(e) = session.quit().await {
            warn!("{}: browser did not shut down cleanly: {}", target.platform, e);
        }
        match outcome {
            Ok(positions) => {
                info!("{}: scraped {} positions", target.platform, positions.len());
                positions
            }
            Err(e) => {
                error!("{}: scraping {} failed: {}", target.platform, target.url, e);
                vec![]
            }
        }
    }

    async fn extract(&self, session: &mut dyn BrowserSession, target: &ProfileTarget) -> Result<Vec<Position>> {
        session.goto(&target.url).await?;
        session
            .wait_for(&self.selectors.worth, self.timings.element_wait)
            .await?;
        self.settle(session).await?;
        let worths = session.texts(&self.selectors.worth).await?;
        let names = session.texts(&self.selectors.name).await?;
        Ok(pair_rows(&names, &worths, &target.platform))
    }

    /// Waits for the worth row count to stop changing, bounded by the settle window.
    async fn settle(&self, session: &mut dyn BrowserSession) -> Result<()> {
        let deadline = Instant::now() + self.timings.settle_window;
        let mut last = session.count(&self.selectors.worth).await?;
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!("Row count still moving at end of settle window ({})", last);
                return Ok(());
            }
            sleep(self.timings.poll_interval.min(deadline - now)).await;
            let current = session.count(&self.selectors.worth).await?;
            if current == last && current > 0 {
                return Ok(());
            }
            last = current;
        }
    }
}
