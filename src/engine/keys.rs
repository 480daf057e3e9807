//! Cache-key pattern expansion.
//!
//! A pattern is a template string with `{name}` placeholders. The expanded
//! string is used verbatim as the output-cache key, so expansion must be a
//! pure function of the pattern and the resolver state.

use super::resolver::ResolverChain;

/// Expand every `{name}` placeholder in `pattern` through the chain.
///
/// Unmatched placeholders expand to the empty string. A `{` with no closing
/// brace is kept literally. No escape syntax: document authors who need a
/// literal brace pair put the text in a resolved variable instead.
pub fn expand_pattern(pattern: &str, chain: &ResolverChain) -> String {
    let mut resolved = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        match rest[open + 1..].find('}') {
            Some(close) => {
                let name = &rest[open + 1..open + 1 + close];
                resolved.push_str(&chain.resolve_or_empty(name));
                rest = &rest[open + close + 2..];
            }
            None => {
                resolved.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    resolved.push_str(rest);
    resolved
}
