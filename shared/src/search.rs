//! Accent- and markup-insensitive text search over documents.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

use crate::value::Value;

fn tag_pattern() -> Option<&'static Regex> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

/// Folds text for comparison: compatibility decomposition, combining marks
/// removed, lowercased, whitespace runs collapsed and trimmed.
pub fn normalize(input: &str) -> String {
    let folded: String = input
        .nfkd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replaces every markup tag with a space.
pub fn strip_html(html: &str) -> String {
    match tag_pattern() {
        Some(tag) => tag.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    }
}

/// Plain text of a scalar field. Missing values and objects read as empty.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(field_text).collect::<Vec<_>>().join(","),
        Value::Absent | Value::Null | Value::Object(_) => String::new(),
    }
}

/// Matches when every query token occurs in the combined text of `keys`.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    keys: Vec<String>,
}

impl KeyMatcher {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// `query` is expected to be normalized already.
    pub fn matches(&self, item: &Value, query: &str) -> bool {
        let tokens: Vec<&str> = query.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return true;
        }
        let Some(fields) = item.as_object() else {
            return false;
        };

        let parts: Vec<String> = self
            .keys
            .iter()
            .map(|k| match fields.get(k) {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|x| normalize(&strip_html(&field_text(x))))
                    .collect::<Vec<_>>()
                    .join(" "),
                Some(v) => normalize(&strip_html(&field_text(v))),
                None => String::new(),
            })
            .collect();
        let haystack = normalize(&parts.join(" "));

        tokens.iter().all(|t| haystack.contains(t))
    }
}

/// Items matching `query`; all of them when the query normalizes to empty.
pub fn filter<'a, T>(items: &'a [T], query: &str, matcher: impl Fn(&T, &str) -> bool) -> Vec<&'a T> {
    let q = normalize(query);
    if q.is_empty() {
        return items.iter().collect();
    }
    items.iter().filter(|&item| matcher(item, &q)).collect()
}
