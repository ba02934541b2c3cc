pub mod config;
pub mod db;
pub mod decoder;
pub mod gateway;
pub mod normalizer;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use db::{ClickhouseClient, Sink};
pub use gateway::{PortalClient, SolanaRpcClient};
pub use utils::WhitelistFilter;
pub use worker::Indexer;
