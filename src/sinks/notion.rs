use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use log::{error, info};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::datasink::PositionSink;
use crate::{
    error::{Result, TrackerError},
    position::Position,
    settings::Settings,
};

pub const NOTION_API_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";

/// Body of a `POST /v1/pages` call creating one database row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotionPage {
    pub parent: Parent,
    pub properties: PageProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    pub database_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageProperties {
    #[serde(rename = "Date")]
    pub date: DateProperty,
    #[serde(rename = "Name")]
    pub name: TitleProperty,
    #[serde(rename = "Worth")]
    pub worth: NumberProperty,
    #[serde(rename = "Platform")]
    pub platform: SelectProperty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateProperty {
    pub date: DateValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleProperty {
    pub title: Vec<RichText>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    pub text: TextContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

/// Serialized as a JSON number carrying every decimal digit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberProperty {
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub number: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectProperty {
    pub select: SelectOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

impl NotionPage {
    pub fn new(database_id: &str, position: &Position, date: NaiveDate) -> NotionPage {
        NotionPage {
            parent: Parent {
                database_id: database_id.to_owned(),
            },
            properties: PageProperties {
                date: DateProperty {
                    date: DateValue { start: date },
                },
                name: TitleProperty {
                    title: vec![RichText {
                        text: TextContent {
                            content: position.name.clone(),
                        },
                    }],
                },
                worth: NumberProperty {
                    number: position.worth,
                },
                platform: SelectProperty {
                    select: SelectOption {
                        name: position.platform.clone(),
                    },
                },
            },
        }
    }

    pub fn name(&self) -> String {
        self.properties
            .name
            .title
            .iter()
            .map(|t| t.text.content.as_str())
            .collect()
    }
}

pub struct NotionSink {
    client: Arc<Client>,
    token: String,
    database_id: String,
    base_url: String,
}

impl NotionSink {
    pub fn new(client: Arc<Client>, token: String, database_id: String) -> NotionSink {
        NotionSink {
            client,
            token,
            database_id,
            base_url: NOTION_API_URL.to_owned(),
        }
    }

    pub fn from_settings(client: Arc<Client>, settings: &Settings) -> Result<NotionSink> {
        Ok(NotionSink::new(
            client,
            Settings::require(&settings.notion_token, "NOTION_TOKEN")?.to_owned(),
            Settings::require(&settings.notion_database_id, "NOTION_DATABASE_ID")?.to_owned(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> NotionSink {
        self.base_url = base_url.into();
        self
    }

    async fn create_page(&self, page: &NotionPage) -> Result<()> {
        let resp_payload = self
            .client
            .post(&format!("{}/v1/pages", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(page)
            .send()
            .await?;
        let status = resp_payload.status();
        if status.is_success() {
            return Ok(());
        }
        let response: JsonValue = resp_payload.json().await.unwrap_or(JsonValue::Null);
        Err(TrackerError::Transport(format!(
            "Notion {}: {}",
            status,
            response["message"].as_str().unwrap_or("no message")
        )))
    }
}

#[async_trait]
impl PositionSink for NotionSink {
    async fn save_positions(&self, positions: &[Position]) -> Result<()> {
        let today = Local::now().date_naive();
        let mut saved = 0;
        for position in positions {
            let page = NotionPage::new(&self.database_id, position, today);
            match self.create_page(&page).await {
                Ok(()) => {
                    saved += 1;
                    info!("Imported {} from {}", position.name, position.platform);
                }
                Err(e) => error!("Error importing {} from {}: {}", position.name, position.platform, e),
            }
        }
        info!("Notion: saved {} of {} positions", saved, positions.len());
        Ok(())
    }
}
