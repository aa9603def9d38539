use std::{collections::BTreeMap, sync::Arc, time::Instant};

use futures::future::join_all;
use log::{error, info, warn};
use pretty_duration::pretty_duration;
use serde::Serialize;

use crate::{datasources::PositionSource, position::Position, sinks::PositionSink};

/// Error map key under which a failed sink call is reported.
pub const SINK_ERROR_KEY: &str = "sink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub message: String,
    pub positions: usize,
    pub errors: Option<BTreeMap<String, String>>,
}

struct NamedSource {
    name: String,
    source: Arc<dyn PositionSource>,
}

/// Fetches from the selected sources and hands everything to one sink.
pub struct PortfolioTracker {
    sources: Vec<NamedSource>,
    active: Vec<String>,
    sink: Arc<dyn PositionSink>,
}

impl PortfolioTracker {
    pub fn new(sink: Arc<dyn PositionSink>) -> PortfolioTracker {
        PortfolioTracker {
            sources: vec![],
            active: vec![],
            sink,
        }
    }

    /// Adds a source to the registry and to the active selection.
    pub fn register(mut self, name: impl Into<String>, source: Arc<dyn PositionSource>) -> PortfolioTracker {
        let name = name.into();
        if let Some(existing) = self.sources.iter_mut().find(|s| s.name == name) {
            warn!("Source {} registered twice, keeping the last one", name);
            existing.source = source;
        } else {
            self.active.push(name.clone());
            self.sources.push(NamedSource { name, source });
        }
        self
    }

    pub fn available_sources(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn active_sources(&self) -> Vec<&str> {
        self.active.iter().map(String::as_str).collect()
    }

    /// Keeps the known names, in registration order, and logs the unknown ones.
    pub fn validate_sources<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        for name in names {
            if !self.sources.iter().any(|s| s.name == name.as_ref()) {
                warn!("Invalid source name: {}", name.as_ref());
            }
        }
        self.sources
            .iter()
            .filter(|s| names.iter().any(|n| n.as_ref() == s.name))
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn set_active_sources<S: AsRef<str>>(&mut self, names: &[S]) {
        self.active = self.validate_sources(names);
        info!("Active sources updated: {}", self.active.join(", "));
    }

    /// One pass over the active selection.
    pub async fn run(&self) -> RunReport {
        self.run_sources(&self.active).await
    }

    /// One pass over `names` without touching the stored selection.
    pub async fn run_selected<S: AsRef<str>>(&self, names: &[S]) -> RunReport {
        let selected = self.validate_sources(names);
        self.run_sources(&selected).await
    }

    async fn run_sources(&self, names: &[String]) -> RunReport {
        let selected: Vec<&NamedSource> = self
            .sources
            .iter()
            .filter(|s| names.contains(&s.name))
            .collect();
        if selected.is_empty() {
            warn!("No active sources configured");
            return RunReport {
                status: RunStatus::Warning,
                message: "No active sources configured".to_owned(),
                positions: 0,
                errors: None,
            };
        }

        let started = Instant::now();
        let results = join_all(selected.iter().map(|named| async move {
            info!("Fetching positions from {}", named.name);
            (named.name.as_str(), named.source.fetch_positions().await)
        }))
        .await;

        let mut all_positions: Vec<Position> = vec![];
        let mut errors = BTreeMap::new();
        for (name, result) in results {
            match result {
                Ok(positions) => {
                    info!("Fetched {} positions from {}", positions.len(), name);
                    all_positions.extend(positions);
                }
                Err(e) => {
                    let message = format!("Error fetching positions from {}: {}", name, e);
                    error!("{}", message);
                    errors.insert(name.to_owned(), message);
                }
            }
        }

        if !all_positions.is_empty() {
            info!("Saving {} positions", all_positions.len());
            if let Err(e) = self.sink.save_positions(&all_positions).await {
                let message = format!("Error saving positions: {}", e);
                error!("{}", message);
                errors.insert(SINK_ERROR_KEY.to_owned(), message);
            }
        }

        let status = if errors.is_empty() {
            RunStatus::Success
        } else if !all_positions.is_empty() {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Error
        };
        let mut message = "Portfolio tracking completed".to_owned();
        if !errors.is_empty() {
            message.push_str(&format!(" with {} errors", errors.len()));
        }
        info!("{} in {}", message, pretty_duration(&started.elapsed(), None));
        RunReport {
            status,
            message,
            positions: all_positions.len(),
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }
}
