use crate::error::ForbiddenMatch;

/// Substrings that must never reach the model, matched case-insensitively.
pub const FORBIDDEN_STRINGS: &[&str] = &["StartupNation Confidential"];

/// Characters of surrounding text kept on each side of a match.
pub const CONTEXT_CHARS: usize = 20;

/// Locates every forbidden string present in `content`.
///
/// Each string contributes at most one match, its first occurrence. The match
/// is found in the lowercased content and the context window is then cut from
/// the original text at the same character position, clipped to its bounds.
pub fn find_forbidden_matches<S: AsRef<str>>(content: &str, forbidden: &[S]) -> Vec<ForbiddenMatch> {
    let lowercase = content.to_lowercase();
    let original: Vec<char> = content.chars().collect();

    forbidden
        .iter()
        .filter_map(|term| {
            let term: &str = term.as_ref();
            let needle = term.to_lowercase();
            let byte_index = lowercase.find(&needle)?;
            let index = lowercase[..byte_index].chars().count();

            let end = (index + term.chars().count() + CONTEXT_CHARS).min(original.len());
            let start = index.saturating_sub(CONTEXT_CHARS).min(end);

            Some(ForbiddenMatch {
                forbidden: term.to_owned(),
                context: original[start..end].iter().collect(),
            })
        })
        .collect()
}
