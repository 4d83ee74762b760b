use async_trait::async_trait;
use tracing::debug;

use crate::types::ScanResult;

use super::Scanner;

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstringMatch {
    /// Anywhere in the text.
    #[default]
    Str,
    /// Only as a whole word.
    Word,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BanSubstringsOptions {
    pub match_type: SubstringMatch,
    pub case_sensitive: bool,
    pub redact: bool,
    /// Require every substring to be present before flagging.
    pub contains_all: bool,
}

/// Flags text containing any (or all) of a fixed list of substrings.
///
/// Case-insensitive matching compares `str::to_lowercase` forms, the same
/// folding the diagnostic search in [`crate::safety`] uses, so every flagged
/// text has a reportable match.
#[derive(Debug)]
pub struct BanSubstrings {
    /// Original substring and the form searched for.
    rules: Vec<(String, String)>,
    options: BanSubstringsOptions,
}

impl BanSubstrings {
    pub fn new<S: AsRef<str>>(
        substrings: &[S],
        options: BanSubstringsOptions,
    ) -> anyhow::Result<Self> {
        if substrings.is_empty() {
            anyhow::bail!("ban substrings scanner needs at least one substring");
        }

        let rules = substrings
            .iter()
            .map(|substring| {
                let substring = substring.as_ref();
                if substring.is_empty() {
                    anyhow::bail!("banned substrings must not be empty");
                }
                let needle = if options.case_sensitive {
                    substring.to_owned()
                } else {
                    substring.to_lowercase()
                };
                Ok((substring.to_owned(), needle))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { rules, options })
    }

    fn fold(&self, text: &str) -> String {
        if self.options.case_sensitive {
            text.to_owned()
        } else {
            text.to_lowercase()
        }
    }

    fn whole_word(&self) -> bool {
        self.options.match_type == SubstringMatch::Word
    }

    fn found_in(&self, haystack: &str, needle: &str) -> bool {
        haystack.match_indices(needle).any(|(start, _)| {
            !self.whole_word() || at_word_bounds(haystack, start, start + needle.len())
        })
    }

    /// Replaces each occurrence of `needle` in `text` with [`REDACTED`],
    /// comparing folded text so the replaced spans are exactly what matched.
    fn redact(&self, text: &str, needle: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut offset = 0;

        while offset < text.len() {
            let hit = self
                .folded_prefix_len(&text[offset..], needle)
                .filter(|len| !self.whole_word() || at_word_bounds(text, offset, offset + len));
            if let Some(len) = hit {
                out.push_str(REDACTED);
                offset += len;
                continue;
            }
            let Some(next) = text[offset..].chars().next() else {
                break;
            };
            out.push(next);
            offset += next.len_utf8();
        }

        out
    }

    /// Byte length of the shortest prefix of `text` whose folded form equals
    /// `needle`.
    fn folded_prefix_len(&self, text: &str, needle: &str) -> Option<usize> {
        if self.options.case_sensitive {
            return text.starts_with(needle).then_some(needle.len());
        }

        let mut folded = String::new();
        for (index, character) in text.char_indices() {
            folded.extend(character.to_lowercase());
            if folded.len() >= needle.len() {
                return (folded == needle).then_some(index + character.len_utf8());
            }
            if !needle.starts_with(folded.as_str()) {
                return None;
            }
        }
        None
    }
}

fn is_word_char(character: char) -> bool {
    character.is_alphanumeric() || character == '_'
}

fn at_word_bounds(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
    let after = text[end..].chars().next().is_none_or(|c| !is_word_char(c));
    before && after
}

#[async_trait]
impl Scanner for BanSubstrings {
    fn name(&self) -> &str {
        "ban_substrings"
    }

    async fn scan(&self, text: &str) -> anyhow::Result<ScanResult> {
        let haystack = self.fold(text);
        let matched = self
            .rules
            .iter()
            .filter(|(_, needle)| self.found_in(&haystack, needle))
            .collect::<Vec<_>>();

        let flagged = if self.options.contains_all {
            matched.len() == self.rules.len()
        } else {
            !matched.is_empty()
        };

        if !flagged {
            return Ok(ScanResult::valid(text));
        }

        debug!(
            matched = ?matched.iter().map(|(substring, _)| substring.as_str()).collect::<Vec<_>>(),
            "banned substrings found"
        );

        let sanitized = if self.options.redact {
            matched
                .iter()
                .fold(text.to_owned(), |acc, (_, needle)| self.redact(&acc, needle))
        } else {
            text.to_owned()
        };

        Ok(ScanResult::invalid(sanitized, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::{BanSubstrings, BanSubstringsOptions, SubstringMatch};
    use crate::scanner::Scanner;

    fn scanner(substrings: &[&str], options: BanSubstringsOptions) -> BanSubstrings {
        BanSubstrings::new(substrings, options).expect("scanner should build")
    }

    #[tokio::test]
    async fn flags_case_insensitive_substring() {
        let scanner = scanner(&["StartupNation Confidential"], BanSubstringsOptions::default());
        let result = scanner
            .scan("see the startupnation confidential memo")
            .await
            .expect("scan should succeed");
        assert!(!result.is_valid);
        assert_eq!(result.risk_score, 1.0);
        assert_eq!(result.sanitized, "see the startupnation confidential memo");
    }

    #[tokio::test]
    async fn clean_text_is_valid() {
        let scanner = scanner(&["secret"], BanSubstringsOptions::default());
        let result = scanner.scan("nothing here").await.expect("scan should succeed");
        assert!(result.is_valid);
        assert_eq!(result.risk_score, 0.0);
    }

    #[tokio::test]
    async fn case_sensitive_mode_ignores_other_casing() {
        let scanner = scanner(
            &["Secret"],
            BanSubstringsOptions {
                case_sensitive: true,
                ..Default::default()
            },
        );
        let result = scanner.scan("a SECRET plan").await.expect("scan should succeed");
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn word_mode_requires_boundaries() {
        let scanner = scanner(
            &["cat"],
            BanSubstringsOptions {
                match_type: SubstringMatch::Word,
                ..Default::default()
            },
        );
        assert!(scanner.scan("concatenate").await.expect("scan").is_valid);
        assert!(!scanner.scan("the cat sat").await.expect("scan").is_valid);
    }

    #[tokio::test]
    async fn contains_all_needs_every_substring() {
        let scanner = scanner(
            &["alpha", "beta"],
            BanSubstringsOptions {
                contains_all: true,
                ..Default::default()
            },
        );
        assert!(scanner.scan("alpha only").await.expect("scan").is_valid);
        assert!(!scanner.scan("alpha and beta").await.expect("scan").is_valid);
    }

    #[tokio::test]
    async fn redacts_when_enabled() {
        let scanner = scanner(
            &["token"],
            BanSubstringsOptions {
                redact: true,
                ..Default::default()
            },
        );
        let result = scanner.scan("my Token is here").await.expect("scan");
        assert!(!result.is_valid);
        assert_eq!(result.sanitized, "my [REDACTED] is here");
    }

    #[test]
    fn rejects_empty_list() {
        let empty: [&str; 0] = [];
        assert!(BanSubstrings::new(&empty, BanSubstringsOptions::default()).is_err());
    }

    #[tokio::test]
    async fn lowercase_folding_only() {
        let scanner = scanner(&["StartupNation Confidential"], BanSubstringsOptions::default());
        // U+017F folds to 's' under case folding but lowercases to itself
        let result = scanner
            .scan("\u{17f}tartupNation Confidential")
            .await
            .expect("scan");
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn redaction_respects_word_mode_and_casing() {
        let scanner = scanner(
            &["cat"],
            BanSubstringsOptions {
                match_type: SubstringMatch::Word,
                redact: true,
                ..Default::default()
            },
        );
        let result = scanner.scan("CAT concatenate Cat.").await.expect("scan");
        assert_eq!(result.sanitized, "[REDACTED] concatenate [REDACTED].");
    }

    #[test]
    fn rejects_empty_substring() {
        assert!(BanSubstrings::new(&[""], BanSubstringsOptions::default()).is_err());
    }
}
