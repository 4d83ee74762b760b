use async_trait::async_trait;
use regex::RegexSet;
use tracing::debug;

use crate::types::ScanResult;

use super::{MatchType, Scanner, split_sentences};

struct Rule {
    name: &'static str,
    weight: f64,
    pattern: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        name: "ignore_previous",
        weight: 0.95,
        pattern: r"(?i)\b(ignore|disregard|forget|override)\s+(all\s+|any\s+|the\s+)?(previous|prior|above|earlier|preceding)\s+(instructions?|directions?|rules|prompts?|context)",
    },
    Rule {
        name: "reveal_system_prompt",
        weight: 0.9,
        pattern: r"(?i)\b(reveal|print|show|repeat|output|leak|dump)\s+(me\s+)?(your|the)\s+(system\s+prompt|hidden\s+instructions|initial\s+instructions)",
    },
    Rule {
        name: "role_hijack",
        weight: 0.85,
        pattern: r"(?i)\b(you\s+are\s+now|from\s+now\s+on\s+you\s+are|act\s+as\s+if\s+you\s+have\s+no)\b",
    },
    Rule {
        name: "jailbreak_mode",
        weight: 0.9,
        pattern: r"(?i)\b((enable|enter|activate|switch\s+to|turn\s+on)\s+(the\s+)?(developer|DAN|jailbreak|unrestricted)\s+mode|do\s+anything\s+now)\b",
    },
    Rule {
        name: "delimiter_escape",
        weight: 0.85,
        pattern: r"(?i)(<\|im_start\|>|<\|im_end\|>|\[/?INST\]|<</?SYS>>|###\s*system\s*:)",
    },
    Rule {
        name: "new_instructions",
        weight: 0.6,
        pattern: r"(?i)\bnew\s+(system\s+)?instructions?\s*:",
    },
];

/// Regex rule set usable in place of the model classifier when explicitly
/// selected.
///
/// Risk is the heaviest matching rule's weight, so a single strong signal is
/// enough to cross the threshold.
pub struct HeuristicInjectionScanner {
    set: RegexSet,
    threshold: f64,
    match_type: MatchType,
}

impl HeuristicInjectionScanner {
    pub fn new(threshold: f64, match_type: MatchType) -> anyhow::Result<Self> {
        let set = RegexSet::new(RULES.iter().map(|rule| rule.pattern))?;
        Ok(Self {
            set,
            threshold,
            match_type,
        })
    }

    fn score(&self, text: &str) -> f64 {
        self.set
            .matches(text)
            .into_iter()
            .map(|index| {
                debug!(rule = RULES[index].name, "injection rule matched");
                RULES[index].weight
            })
            .fold(0.0, f64::max)
    }
}

#[async_trait]
impl Scanner for HeuristicInjectionScanner {
    fn name(&self) -> &str {
        "heuristic_prompt_injection"
    }

    async fn scan(&self, text: &str) -> anyhow::Result<ScanResult> {
        let risk_score = match self.match_type {
            MatchType::Full => self.score(text),
            MatchType::Sentence => split_sentences(text)
                .into_iter()
                .map(|sentence| self.score(sentence))
                .fold(0.0, f64::max),
        };

        if risk_score > self.threshold {
            Ok(ScanResult::invalid(text, risk_score))
        } else {
            Ok(ScanResult {
                sanitized: text.to_owned(),
                is_valid: true,
                risk_score,
            })
        }
    }
}
