pub mod client;

pub use client::ClickhouseClient;
