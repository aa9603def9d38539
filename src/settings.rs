use std::{collections::HashMap, env, ffi::OsString, time::Duration};

use crate::error::{Result, TrackerError};

pub const DEFAULT_TRADING212_API_URL: &str = "https://live.trading212.com/api/v0/equity/portfolio";
pub const DEFAULT_CRYPTOCOM_WS_URL: &str = "wss://stream.crypto.com/exchange/v1/user";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

const DEFAULT_DEBANK_PROFILES: &[(&str, &str)] = &[
    (
        "https://debank.com/profile/0x6fc703151a658b58458917bd4099a0bd319d7681?chain=cro",
        "Cronos DeFi",
    ),
    (
        "https://debank.com/profile/0x5d1c953d6b07c7fbc6541139cc1293408d58854e?chain=bsc",
        "BNB DeFi",
    ),
];

/// A DeBank profile page and the platform label its holdings are reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTarget {
    pub url: String,
    pub platform: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub notion_token: Option<String>,
    pub notion_database_id: Option<String>,
    pub trading212_api_token: Option<String>,
    pub trading212_api_url: String,
    pub binance_api_key: Option<String>,
    pub binance_api_secret: Option<String>,
    pub cryptocom_api_key: Option<String>,
    pub cryptocom_api_secret: Option<String>,
    pub cryptocom_ws_url: String,
    pub debank_profiles: Vec<ProfileTarget>,
    pub webdriver_url: String,
    pub bind_addr: String,
    pub scheduler_tick: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        Settings::from_os_vars(env::vars_os())
    }

    /// Like `from_vars`, skipping entries whose key or value is not UTF-8.
    pub fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Result<Settings> {
        Settings::from_vars(
            vars.into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        )
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Settings> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let debank_profiles = match get("DEBANK_PROFILES") {
            Some(raw) => parse_profiles(&raw)?,
            None => DEFAULT_DEBANK_PROFILES
                .iter()
                .map(|(url, platform)| ProfileTarget {
                    url: (*url).to_owned(),
                    platform: (*platform).to_owned(),
                })
                .collect(),
        };
        let scheduler_tick = match get("SCHEDULER_TICK_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                TrackerError::Config(format!("SCHEDULER_TICK_SECS is not a number: {}", raw))
            })?),
            None => Duration::from_secs(30),
        };
        Ok(Settings {
            notion_token: get("NOTION_TOKEN"),
            notion_database_id: get("NOTION_DATABASE_ID"),
            trading212_api_token: get("TRADING212_API_TOKEN"),
            trading212_api_url: get("TRADING212_API_URL")
                .unwrap_or_else(|| DEFAULT_TRADING212_API_URL.to_owned()),
            binance_api_key: get("BINANCE_API_KEY"),
            binance_api_secret: get("BINANCE_API_SECRET"),
            cryptocom_api_key: get("CRYPTOCOM_API_KEY"),
            cryptocom_api_secret: get("CRYPTOCOM_API_SECRET"),
            cryptocom_ws_url: get("CRYPTOCOM_WS_URL")
                .unwrap_or_else(|| DEFAULT_CRYPTOCOM_WS_URL.to_owned()),
            debank_profiles,
            webdriver_url: get("WEBDRIVER_URL").unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_owned()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
            scheduler_tick,
        })
    }

    /// Unwraps an optional secret, naming the variable when it is absent.
    pub fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| TrackerError::Config(format!("{} is not set", name)))
    }
}

/// Parses `url|label;url|label`.
fn parse_profiles(raw: &str) -> Result<Vec<ProfileTarget>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('|') {
            Some((url, platform)) if !url.trim().is_empty() && !platform.trim().is_empty() => {
                Ok(ProfileTarget {
                    url: url.trim().to_owned(),
                    platform: platform.trim().to_owned(),
                })
            }
            _ => Err(TrackerError::Config(format!(
                "DEBANK_PROFILES entry must look like url|label: {}",
                entry
            ))),
        })
        .collect()
}
