pub mod checkpoint;
pub mod clickhouse;
pub mod models;
pub mod sink;
#[cfg(test)]
pub mod testing;

pub use checkpoint::CheckpointManager;
pub use clickhouse::ClickhouseClient;
pub use sink::{Sink, SinkBackend};
