use async_trait::async_trait;

use crate::{
    error::{Result, TrackerError},
    position::Position,
};

#[async_trait]
pub trait PositionSource: Sync + Send {
    /// Either every position the source currently holds, or an error. Never a partial list.
    async fn fetch_positions(&self) -> Result<Vec<Position>>;
}

/// Takes the place of a source that could not be built, so runs naming it report why.
pub struct UnconfiguredSource {
    reason: String,
}

impl UnconfiguredSource {
    pub fn new(reason: impl Into<String>) -> UnconfiguredSource {
        UnconfiguredSource {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PositionSource for UnconfiguredSource {
    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        Err(TrackerError::Config(self.reason.clone()))
    }
}
