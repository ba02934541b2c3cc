//! Streaming client for the SQD Portal API (`POST <dataset>/stream`).
//!
//! The gateway answers a POSTed query with newline-delimited JSON blocks,
//! starting at `fromBlock`, and closes the response whenever it decides the
//! chunk is large enough. The client keeps re-querying from the block after the
//! last one it received.

use std::time::Duration;

use anyhow::{bail, Context};
use futures::StreamExt;
use log::{debug, info};
use reqwest::StatusCode;
use serde_json::json;
use url::Url;

use crate::{
    config::{GatewaySettings, RetrySettings},
    gateway::{Block, BlockSource, StreamRequest},
    utils::{is_transient_error, with_retry},
};

pub struct PortalClient {
    http: reqwest::Client,
    stream_url: Url,
    batch_size: usize,
    head_poll_interval: Duration,
    retry: RetrySettings,
    request: Option<StreamRequest>,
    next_height: u64,
    finished: bool,
}

impl PortalClient {
    pub fn new(settings: &GatewaySettings, retry: RetrySettings) -> anyhow::Result<Self> {
        let base = Url::parse(&settings.url).context("Invalid gateway URL")?;
        let stream_url = join_path(&base, "stream")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .context("Failed to build gateway HTTP client")?;

        Ok(Self {
            http,
            stream_url,
            batch_size: settings.batch_size,
            head_poll_interval: Duration::from_millis(settings.head_poll_interval_ms),
            retry,
            request: None,
            next_height: 0,
            finished: false,
        })
    }

    /// Portal `/stream` endpoint of the configured dataset.
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    fn build_query(&self, request: &StreamRequest, from_height: u64) -> serde_json::Value {
        let mut query = json!({
            "type": "solana",
            "fromBlock": from_height,
            "fields": {
                "block": {"number": true, "height": true, "hash": true, "timestamp": true},
                "transaction": {
                    "transactionIndex": true,
                    "signatures": true,
                    "err": true,
                    "feePayer": true,
                    "accountKeys": true,
                },
                "instruction": {
                    "transactionIndex": true,
                    "instructionAddress": true,
                    "programId": true,
                    "accounts": true,
                    "data": true,
                },
                "log": {
                    "transactionIndex": true,
                    "logIndex": true,
                    "programId": true,
                    "kind": true,
                    "message": true,
                },
            },
            "instructions": [{
                "programId": request.program_ids,
                "isCommitted": true,
                "transaction": true,
                "innerInstructions": true,
                "logs": true,
            }],
        });

        if let Some(to_height) = request.to_height {
            query["toBlock"] = json!(to_height);
        }

        query
    }

    /// One gateway round trip, reading at most `batch_size` blocks.
    async fn fetch_chunk(&self, query: &serde_json::Value) -> anyhow::Result<Vec<Block>> {
        let response = self
            .http
            .post(self.stream_url.clone())
            .json(query)
            .send()
            .await
            .context("Gateway request failed")?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        let response = response
            .error_for_status()
            .context("Gateway returned an error status")?;

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut blocks: Vec<Block> = Vec::with_capacity(self.batch_size);

        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("Gateway stream error")?;
            lines.extend(&chunk);

            while let Some(line) = lines.next_line() {
                if let Some(block) = parse_block_line(line)? {
                    blocks.push(block);
                }
                if blocks.len() >= self.batch_size {
                    // Dropping the body closes the connection, the next query resumes after the last block
                    return Ok(blocks);
                }
            }
        }

        if let Some(block) = parse_block_line(lines.remainder())? {
            blocks.push(block);
        }

        Ok(blocks)
    }
}

/// Splits a chunked byte stream into newline-terminated lines.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
    /// Start of the first unconsumed line
    start: usize,
    /// No newline before this offset
    scanned: usize,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its newline.
    fn next_line(&mut self) -> Option<&[u8]> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                let line = &self.buf[self.start..end];
                self.start = end + 1;
                self.scanned = end + 1;
                Some(line)
            },
            None => {
                self.scanned = self.buf.len();
                None
            },
        }
    }

    /// Trailing bytes not terminated by a newline.
    fn remainder(&self) -> &[u8] {
        &self.buf[self.start..]
    }
}

impl BlockSource for PortalClient {
    async fn open(&mut self, request: StreamRequest) -> anyhow::Result<()> {
        info!(
            "Opening gateway stream at height {} for {} programs",
            request.from_height,
            request.program_ids.len()
        );
        self.next_height = request.from_height;
        self.finished = false;
        self.request = Some(request);
        Ok(())
    }

    async fn next_batch(&mut self) -> anyhow::Result<Option<Vec<Block>>> {
        let Some(request) = self.request.clone() else {
            bail!("Gateway stream used before open()");
        };

        loop {
            if self.finished {
                return Ok(None);
            }

            if let Some(to_height) = request.to_height {
                if self.next_height > to_height {
                    self.finished = true;
                    return Ok(None);
                }
            }

            let query = self.build_query(&request, self.next_height);
            let blocks = with_retry(&self.retry, "gateway stream", is_transient_error, || {
                self.fetch_chunk(&query)
            })
            .await?;

            let Some(last) = blocks.last() else {
                if request.to_height.is_some() {
                    // Nothing left in a bounded range
                    self.finished = true;
                    return Ok(None);
                }
                debug!(
                    "Gateway has no blocks after height {} yet, polling again in {:?}",
                    self.next_height, self.head_poll_interval
                );
                tokio::time::sleep(self.head_poll_interval).await;
                continue;
            };

            self.next_height = last.header.height + 1;
            return Ok(Some(blocks));
        }
    }
}

/// Parse one JSON line of the stream. Blank lines are skipped.
pub fn parse_block_line(line: &[u8]) -> anyhow::Result<Option<Block>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let block = serde_json::from_slice(trimmed).context("Failed to parse gateway block")?;
    Ok(Some(block))
}

fn join_path(base: &Url, segment: &str) -> anyhow::Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Gateway URL cannot be a base: {}", base))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PortalClient {
        let settings = GatewaySettings {
            url: "https://portal.sqd.dev/datasets/solana-mainnet/".to_string(),
            rpc_url: None,
            batch_size: 10,
            request_timeout_ms: 1_000,
            head_poll_interval_ms: 10,
        };
        PortalClient::new(&settings, RetrySettings::default()).unwrap()
    }

    #[test]
    fn test_line_buffer_across_chunks() {
        let mut lines = LineBuffer::default();

        lines.extend(b"{\"a\":");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.scanned, 5);

        lines.extend(b"1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(lines.next_line(), Some(&b"{\"a\":1}"[..]));
        assert_eq!(lines.next_line(), Some(&b"{\"b\":2}"[..]));
        assert!(lines.next_line().is_none());

        // Consumed lines are dropped on the next chunk
        lines.extend(b":3}");
        assert_eq!(lines.start, 0);
        assert!(lines.next_line().is_none());
        assert_eq!(lines.remainder(), &b"{\"c\":3}"[..]);
    }

    #[test]
    fn test_stream_url() {
        assert_eq!(
            client().stream_url.as_str(),
            "https://portal.sqd.dev/datasets/solana-mainnet/stream"
        );
    }

    #[test]
    fn test_query_carries_range_and_programs() {
        let request = StreamRequest {
            from_height: 100,
            to_height: Some(200),
            program_ids: vec!["Prog1".to_string(), "Prog2".to_string()],
        };
        let query = client().build_query(&request, 150);
        assert_eq!(query["fromBlock"], json!(150));
        assert_eq!(query["toBlock"], json!(200));
        assert_eq!(query["instructions"][0]["programId"], json!(["Prog1", "Prog2"]));
        assert_eq!(query["instructions"][0]["innerInstructions"], json!(true));

        let open_ended = StreamRequest {
            to_height: None,
            ..request
        };
        assert!(client().build_query(&open_ended, 150).get("toBlock").is_none());
    }

    #[test]
    fn test_parse_block_line() {
        assert!(parse_block_line(b"  \n").unwrap().is_none());
        let block = parse_block_line(br#"{"header": {"number": 5, "height": 3}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(block.header.slot, 5);
        assert_eq!(block.header.height, 3);
        assert!(parse_block_line(b"{not json").is_err());
    }

    #[tokio::test]
    async fn test_next_batch_requires_open() {
        let mut client = client();
        assert!(client.next_batch().await.is_err());
    }

    #[tokio::test]
    async fn test_exhausted_range_ends_stream() {
        let mut client = client();
        client
            .open(StreamRequest {
                from_height: 10,
                to_height: Some(9),
                program_ids: vec![],
            })
            .await
            .unwrap();
        assert!(client.next_batch().await.unwrap().is_none());
    }
}
