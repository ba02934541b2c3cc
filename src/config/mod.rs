#[allow(clippy::module_inception)]
mod config;

pub use config::{
    ClickHouseSettings, GatewaySettings, IndexerSettings, InsertFailurePolicy, RetrySettings,
    Settings,
};
