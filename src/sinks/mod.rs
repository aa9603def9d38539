mod datasink;
mod notion;

pub use datasink::PositionSink;
pub use notion::{NotionPage, NotionSink};
