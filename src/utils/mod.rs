//! Utility functions for the Solexer indexer.
//!
//! - [`retry`] - Bounded exponential-backoff retry loop and transient error classification
//! - [`whitelist`] - Lazily loaded token whitelist filter

pub mod retry;
#[cfg(test)]
pub mod testing;
pub mod whitelist;

use std::time::Duration;

// ============================================
// Common Constants
// ============================================

/// Value above which a stored "height" is assumed to actually be a slot.
/// Heights were below 360M when slots passed 370M.
pub const SLOT_HEIGHT_THRESHOLD: u64 = 365_000_000;

/// Approximate slot - height gap, used until the real offset has been measured.
pub const APPROXIMATE_SLOT_HEIGHT_OFFSET: u64 = 22_000_000;

// ============================================
// Re-exports
// ============================================

pub use retry::{backoff_delay, is_transient_error, with_retry};
pub use whitelist::WhitelistFilter;

// ============================================
// Formatting
// ============================================

/// Human readable duration for progress logs, e.g. `2d 3h 4m` or `5m 6s`.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h {}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Ratio of two raw amounts rendered as a string, `"0"` when the divisor is zero.
pub fn ratio_string(numerator: u64, denominator: u64) -> String {
    if denominator == 0 {
        return "0".to_string();
    }
    (numerator as f64 / denominator as f64).to_string()
}
