mod ban_substrings;
mod classifier;
mod heuristic;

use async_trait::async_trait;

use crate::types::ScanResult;

pub use ban_substrings::{BanSubstrings, BanSubstringsOptions, SubstringMatch};
pub use classifier::ClassifierInjectionScanner;
pub use heuristic::HeuristicInjectionScanner;

/// Risk score above which the injection check rejects a message.
pub const INJECTION_THRESHOLD: f64 = 0.8;

/// How much of the input an injection scanner classifies per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    /// The whole text in one call.
    #[default]
    Full,
    /// Each sentence separately; the highest score wins.
    Sentence,
}

/// A content scanner shared across concurrent requests. Implementations keep
/// no per-call mutable state.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    async fn scan(&self, text: &str) -> anyhow::Result<ScanResult>;
}

/// Splits text on sentence terminators, dropping empty fragments.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}
