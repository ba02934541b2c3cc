//! Block stream data model and the [`BlockSource`] seam.
//!
//! Blocks arrive already filtered by program id, with their parent
//! transactions and all inner instructions attached. Instructions are ordered
//! by `(transaction_index, instruction_address)`, so every instruction is
//! immediately followed by the instructions it invoked.

pub mod portal;
pub mod rpc;

use std::future::Future;

use serde::Deserialize;

pub use portal::PortalClient;
pub use rpc::SolanaRpcClient;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Block height. The gateway's block ranges use this value.
    pub height: u64,
    /// Raw chain slot
    #[serde(alias = "number")]
    pub slot: u64,
    #[serde(default)]
    pub hash: String,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_index: u32,
    #[serde(default)]
    pub signatures: Vec<String>,
    /// Execution error, `None` for successful transactions
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub fee_payer: Option<String>,
    #[serde(default)]
    pub account_keys: Vec<String>,
}

impl Transaction {
    pub fn is_success(&self) -> bool {
        matches!(self.err, None | Some(serde_json::Value::Null))
    }

    pub fn signature(&self) -> Option<&str> {
        self.signatures.first().map(String::as_str)
    }

    /// First account key of the message, which is always the fee payer.
    pub fn fee_payer(&self) -> Option<&str> {
        self.account_keys
            .first()
            .or(self.fee_payer.as_ref())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub transaction_index: u32,
    /// `[i]` for the i-th top-level instruction, `[i, j, ...]` for its inner instructions
    pub instruction_address: Vec<u32>,
    pub program_id: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Base58 encoded instruction data
    #[serde(default)]
    pub data: String,
}

impl Instruction {
    pub fn is_top_level(&self) -> bool {
        self.instruction_address.len() == 1
    }

    /// Index of the top-level instruction this instruction belongs to.
    pub fn top_level_index(&self) -> Option<u32> {
        self.instruction_address.first().copied()
    }

    /// True if `descendant` runs, directly or through further CPIs, under `self`.
    pub fn is_ancestor_of(&self, descendant: &Instruction) -> bool {
        self.transaction_index == descendant.transaction_index
            && self.instruction_address.len() < descendant.instruction_address.len()
            && descendant
                .instruction_address
                .starts_with(&self.instruction_address)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub transaction_index: u32,
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub program_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub logs: Vec<LogMessage>,
}

impl Block {
    pub fn transaction(&self, transaction_index: u32) -> Option<&Transaction> {
        // Transactions are sorted by index, but may be sparse
        self.transactions
            .binary_search_by_key(&transaction_index, |tx| tx.transaction_index)
            .ok()
            .map(|i| &self.transactions[i])
    }
}

/// Parameters of a block subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// First block HEIGHT to deliver (inclusive)
    pub from_height: u64,
    /// Last block HEIGHT to deliver (inclusive), `None` to follow the chain head
    pub to_height: Option<u64>,
    /// Only instructions of these programs (plus their inner instructions) are returned
    pub program_ids: Vec<String>,
}

/// Latest chain slot, used to estimate how far the indexer is behind.
pub trait ChainHead {
    fn head_slot(&self) -> impl Future<Output = anyhow::Result<u64>>;
}

impl ChainHead for SolanaRpcClient {
    async fn head_slot(&self) -> anyhow::Result<u64> {
        self.get_slot().await
    }
}

/// Pull-based source of block batches.
pub trait BlockSource {
    /// Start (or restart) the stream at `request.from_height`.
    fn open(&mut self, request: StreamRequest) -> impl Future<Output = anyhow::Result<()>>;

    /// Next batch of blocks in height order. `None` once the requested range is exhausted.
    fn next_batch(&mut self) -> impl Future<Output = anyhow::Result<Option<Vec<Block>>>>;
}
