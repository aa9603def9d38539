use async_trait::async_trait;

use crate::{error::Result, position::Position};

#[async_trait]
pub trait PositionSink: Sync + Send {
    /// Records every position it can. One bad record must not stop the others.
    async fn save_positions(&self, positions: &[Position]) -> Result<()>;
}
