//! Token whitelist used to drop trades that only involve uninteresting tokens.

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;

/// Whitelist of token addresses, loaded lazily from a newline-delimited file.
///
/// The set is loaded once on first use and never mutated afterwards.
/// An empty set (no file configured, file missing or unreadable) disables
/// filtering entirely. Base-pair tokens never count towards a match.
#[derive(Debug)]
pub struct WhitelistFilter {
    path: Option<PathBuf>,
    base_pairs: FxHashSet<String>,
    tokens: OnceCell<FxHashSet<String>>,
}

impl WhitelistFilter {
    pub fn new(path: Option<PathBuf>, base_pairs: impl IntoIterator<Item = String>) -> Self {
        Self {
            path,
            base_pairs: base_pairs.into_iter().collect(),
            tokens: OnceCell::new(),
        }
    }

    /// Build an already-loaded whitelist from an in-memory list.
    pub fn from_tokens(
        tokens: impl IntoIterator<Item = String>,
        base_pairs: impl IntoIterator<Item = String>,
    ) -> Self {
        let filter = Self::new(None, base_pairs);
        let _ = filter.tokens.set(tokens.into_iter().collect());
        filter
    }

    /// Load the set if it is not loaded yet and return it.
    pub fn load(&self) -> &FxHashSet<String> {
        self.tokens.get_or_init(|| match &self.path {
            Some(path) => read_whitelist_file(path),
            None => {
                info!("No whitelist configured, processing all tokens");
                FxHashSet::default()
            },
        })
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    /// True if at least one non-base-pair address is whitelisted,
    /// or unconditionally when the whitelist is disabled.
    pub fn has_whitelisted_token<S: AsRef<str>>(&self, addresses: &[S]) -> bool {
        let tokens = self.load();
        if tokens.is_empty() {
            return true;
        }

        addresses
            .iter()
            .map(AsRef::as_ref)
            .filter(|address| !self.base_pairs.contains(*address))
            .any(|address| tokens.contains(address))
    }

    /// Forget the loaded set so the next call reloads it from disk.
    ///
    /// Needs exclusive access, so it only applies before the filter is shared.
    /// A running indexer holds it behind an `Arc` and keeps the set it loaded
    /// at startup. Picking up an edited file takes a restart.
    pub fn reset(&mut self) {
        self.tokens.take();
    }
}

fn read_whitelist_file(path: &Path) -> FxHashSet<String> {
    if !path.exists() {
        warn!(
            "Whitelist file not found at {}. Processing all tokens.",
            path.display()
        );
        return FxHashSet::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => {
            let tokens: FxHashSet<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            info!(
                "Loaded whitelist with {} token addresses from {}",
                tokens.len(),
                path.display()
            );
            tokens
        },
        Err(e) => {
            error!("Error loading whitelist from {}: {}", path.display(), e);
            FxHashSet::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WSOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const TOKX: &str = "TokX1111111111111111111111111111111111111111";

    fn base_pairs() -> Vec<String> {
        vec![WSOL.to_string(), USDC.to_string()]
    }

    #[test]
    fn test_empty_whitelist_accepts_everything() {
        let filter = WhitelistFilter::from_tokens(Vec::<String>::new(), base_pairs());
        assert!(filter.has_whitelisted_token(&[WSOL, USDC]));
        assert!(filter.has_whitelisted_token(&[TOKX, "anything"]));
        assert!(filter.has_whitelisted_token::<&str>(&[]));
    }

    #[test]
    fn test_whitelisted_token_next_to_base_pair() {
        let filter = WhitelistFilter::from_tokens([TOKX.to_string()], base_pairs());
        assert!(filter.has_whitelisted_token(&[WSOL, TOKX]));
        assert!(!filter.has_whitelisted_token(&[WSOL, USDC]));
        assert!(!filter.has_whitelisted_token(&[WSOL, "SomeOtherMint"]));
    }

    #[test]
    fn test_base_pairs_never_match_even_if_listed() {
        let filter =
            WhitelistFilter::from_tokens([WSOL.to_string(), TOKX.to_string()], base_pairs());
        assert!(!filter.has_whitelisted_token(&[WSOL, USDC]));
    }

    #[test]
    fn test_missing_file_disables_filtering() {
        let filter = WhitelistFilter::new(
            Some(PathBuf::from("/nonexistent/solexer/whitelist.txt")),
            base_pairs(),
        );
        assert!(filter.is_empty());
        assert!(filter.has_whitelisted_token(&[WSOL, USDC]));
    }

    #[test]
    fn test_loads_file_and_reset_reloads() {
        let path = std::env::temp_dir().join(format!(
            "solexer-whitelist-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, format!("  {}\n\n{}\n", TOKX, "Mint222")).unwrap();

        let mut filter = WhitelistFilter::new(Some(path.clone()), base_pairs());
        assert_eq!(filter.len(), 2);
        assert!(filter.has_whitelisted_token(&[TOKX, WSOL]));

        std::fs::write(&path, "Mint333\n").unwrap();
        // Still the first load until reset
        assert_eq!(filter.len(), 2);

        filter.reset();
        assert_eq!(filter.len(), 1);
        assert!(!filter.has_whitelisted_token(&[TOKX, WSOL]));

        let _ = std::fs::remove_file(path);
    }
}
