//! Fakes shared by unit tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    datasources::PositionSource,
    error::{Result, TrackerError},
    position::Position,
    sinks::PositionSink,
};

pub struct StaticSource {
    positions: Vec<Position>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(platform: &str, holdings: &[(&str, Decimal)]) -> StaticSource {
        StaticSource {
            positions: holdings
                .iter()
                .map(|(name, worth)| Position::new(*name, *worth, platform))
                .collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> StaticSource {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PositionSource for StaticSource {
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.positions.clone())
    }
}

pub struct FailingSource(pub &'static str);

#[async_trait]
impl PositionSource for FailingSource {
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        Err(TrackerError::Transport(self.0.to_owned()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<Position>>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> RecordingSink {
        RecordingSink {
            fail: true,
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<Position>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PositionSink for RecordingSink {
    async fn save_positions(&self, positions: &[Position]) -> Result<()> {
        self.batches.lock().unwrap().push(positions.to_vec());
        if self.fail {
            return Err(TrackerError::Transport("database is read-only".to_owned()));
        }
        Ok(())
    }
}
