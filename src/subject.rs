//! Default subjects derived from template names.
//!
//! A record without a subject gets one from its template path:
//! `users/password_reset` becomes `Users Password Reset`, which is then
//! looked up in a [`SubjectCatalog`] so applications can map it to a
//! translated or hand-written subject.

use std::collections::HashMap;

/// Turn a template path into words.
///
/// `/` and `_` separate words, as do lower-to-upper case boundaries. Each
/// word is capitalized.
///
/// ```
/// use outbox::subject::humanize;
///
/// assert_eq!(humanize("users/welcome"), "Users Welcome");
/// assert_eq!(humanize("orders/shippedNotice"), "Orders Shipped Notice");
/// ```
pub fn humanize(template: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in template.chars() {
        if c == '/' || c == '_' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| capitalize(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lookup table for default subjects.
pub trait SubjectCatalog: Send + Sync {
    /// The subject for `key`; the key itself when there is no entry.
    fn translate(&self, key: &str) -> String;
}

/// Catalog that returns every key unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCatalog;

impl SubjectCatalog for IdentityCatalog {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// In-memory subject table.
///
/// ```
/// use outbox::subject::{SubjectCatalog, SubjectTable};
///
/// let table = SubjectTable::new().entry("Users Welcome", "Welcome aboard!");
/// assert_eq!(table.translate("Users Welcome"), "Welcome aboard!");
/// assert_eq!(table.translate("Users Goodbye"), "Users Goodbye");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    entries: HashMap<String, String>,
}

impl SubjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, key: impl Into<String>, subject: impl Into<String>) -> Self {
        self.entries.insert(key.into(), subject.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, subject: impl Into<String>) {
        self.entries.insert(key.into(), subject.into());
    }
}

impl SubjectCatalog for SubjectTable {
    fn translate(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// Default subject for a template: humanized, then translated.
pub fn default_subject(template: &str, catalog: &dyn SubjectCatalog) -> String {
    catalog.translate(&humanize(template))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("welcome"), "Welcome");
        assert_eq!(humanize("users/password_reset"), "Users Password Reset");
        assert_eq!(humanize("Newsletters/WeeklyDigest"), "Newsletters Weekly Digest");
        assert_eq!(humanize("orders/order2Shipped"), "Orders Order2 Shipped");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn test_default_subject_uses_catalog() {
        let table = SubjectTable::new().entry("Users Welcome", "Welcome to the shop");
        assert_eq!(default_subject("users/welcome", &table), "Welcome to the shop");
        assert_eq!(default_subject("users/bye", &IdentityCatalog), "Users Bye");
    }
}
