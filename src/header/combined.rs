use std::borrow::Cow;

use super::{HeaderName, HeaderValue, Headers, IntoHeaderValue, Validation};
use crate::error::Result;

/// A header container that keeps at most one field per name, merging
/// repeated `add`s into a comma-separated value per RFC 7230 §3.2.2.
///
/// Values containing a comma or double quote are CSV-quoted on insertion so
/// they survive the merge; [`CombinedHeaders::get_all`] undoes the quoting.
#[derive(Clone, Debug, Default)]
pub struct CombinedHeaders {
    inner: Headers,
}

impl CombinedHeaders {
    /// Creates an empty, strict-validating combined container.
    pub fn new() -> CombinedHeaders {
        CombinedHeaders {
            inner: Headers::new(),
        }
    }

    /// Creates an empty combined container with the given policy.
    pub fn with_validation(validation: Validation) -> CombinedHeaders {
        CombinedHeaders {
            inner: Headers::with_validation(validation),
        }
    }

    /// Adds a value, merging into the existing field if the name is present.
    pub fn add<V: IntoHeaderValue>(&mut self, name: &str, value: V) -> Result<()> {
        let value = value.into_header_value();
        let escaped = escape_csv(&String::from_utf8_lossy(value.as_bytes())).into_owned();
        if let Some(current) = self.inner.get_value_mut(name) {
            let mut merged = String::with_capacity(current.len() + escaped.len() + 1);
            merged.push_str(&String::from_utf8_lossy(current.as_bytes()));
            merged.push(',');
            merged.push_str(&escaped);
            *current = merged.into_header_value();
            Ok(())
        } else {
            self.inner.add(name, escaped)
        }
    }

    /// Replaces the field with the single given value.
    pub fn set<V: IntoHeaderValue>(&mut self, name: &str, value: V) -> Result<()> {
        let value = value.into_header_value();
        let escaped = escape_csv(&String::from_utf8_lossy(value.as_bytes())).into_owned();
        self.inner.set(name, escaped)
    }

    /// The raw combined value, quoting intact.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.inner.get(name)
    }

    /// The individual values that were added under `name`, unescaped.
    pub fn get_all(&self, name: &str) -> Vec<String> {
        match self.get(name).and_then(HeaderValue::to_str) {
            Some(combined) => split_csv(combined)
                .into_iter()
                .map(|part| unescape_csv(part.trim()).into_owned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether any field is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    /// Removes the field named `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        self.inner.remove(name)
    }

    /// The distinct field names.
    pub fn names(&self) -> Vec<&HeaderName> {
        self.inner.names()
    }

    /// Number of fields; with this variant, also the number of names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the container has no fields.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// A view of the container as plain [`Headers`].
    pub fn as_headers(&self) -> &Headers {
        &self.inner
    }

    /// Unwraps into plain [`Headers`].
    pub fn into_headers(self) -> Headers {
        self.inner
    }
}

/// CSV-quotes `value` if it contains a comma or quote.
fn escape_csv(value: &str) -> Cow<'_, str> {
    if !value.contains(',') && !value.contains('"') {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        if c == '"' {
            escaped.push('"');
        }
        escaped.push(c);
    }
    escaped.push('"');
    Cow::Owned(escaped)
}

fn unescape_csv(value: &str) -> Cow<'_, str> {
    if value.len() < 2 || !value.starts_with('"') || !value.ends_with('"') {
        return Cow::Borrowed(value);
    }
    let inner = &value[1..value.len() - 1];
    Cow::Owned(inner.replace("\"\"", "\""))
}

/// Splits on commas that are outside CSV quotes.
fn split_csv(combined: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, b) in combined.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                parts.push(&combined[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    parts.push(&combined[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_repeated_adds() {
        let mut headers = CombinedHeaders::new();
        headers.add("Accept", "text/html").unwrap();
        headers.add("Accept", "application/json").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("accept").unwrap(), "text/html,application/json");
        assert_eq!(headers.get_all("Accept"), vec!["text/html", "application/json"]);
    }

    #[test]
    fn escapes_embedded_commas() {
        let mut headers = CombinedHeaders::new();
        headers.add("Cookie-Like", "a=1, b=2").unwrap();
        headers.add("Cookie-Like", "plain").unwrap();
        assert_eq!(headers.get("Cookie-Like").unwrap(), "\"a=1, b=2\",plain");
        assert_eq!(headers.get_all("Cookie-Like"), vec!["a=1, b=2", "plain"]);
    }

    #[test]
    fn escapes_embedded_quotes() {
        let mut headers = CombinedHeaders::new();
        headers.add("X", "say \"hi\"").unwrap();
        assert_eq!(headers.get_all("X"), vec!["say \"hi\""]);
    }

    #[test]
    fn set_overwrites_merge() {
        let mut headers = CombinedHeaders::new();
        headers.add("X", "a").unwrap();
        headers.add("X", "b").unwrap();
        headers.set("X", "c").unwrap();
        assert_eq!(headers.get_all("X"), vec!["c"]);
    }
}
