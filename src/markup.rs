// Repair of streamed, possibly truncated custom tags

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^\s<>]+>").expect("tag pattern is valid"));

/// Close a trailing unterminated tag such as `<pass>` or `<think>`.
///
/// Only the last tag-like token is considered: if it opens a tag, a matching
/// closing tag is appended. Text without tags, or whose last tag is already a
/// closing tag, is returned as is.
pub fn fix_unclosed_tags(text: &str) -> String {
    let Some(last) = TAG_TOKEN.find_iter(text).last() else {
        return text.to_string();
    };

    let token = last.as_str();
    if token.starts_with("</") {
        return text.to_string();
    }

    let mut fixed = String::with_capacity(text.len() + token.len() + 1);
    fixed.push_str(text);
    fixed.push_str("</");
    fixed.push_str(&token[1..]);
    fixed
}
