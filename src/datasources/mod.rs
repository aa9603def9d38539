mod binance;
mod cryptocom;
pub mod cryptocom_socket;
mod datasource;
mod debank;
pub mod scraper;
mod trading212;

pub use binance::BinancePositionSource;
pub use cryptocom::CryptoComPositionSource;
pub use datasource::{PositionSource, UnconfiguredSource};
pub use debank::DebankPositionSource;
pub use trading212::Trading212PositionSource;
