pub mod indexer;
pub mod parser;

pub use indexer::Indexer;
pub use parser::{parse_blocks, ParseResult, ProgramRegistry};
