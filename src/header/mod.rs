//! Header containers.
//!
//! [`Headers`] is an ordered multimap from field name to values: lookup is
//! case-insensitive, iteration yields entries in the order they were added
//! (across all names, not grouped), and serialization keeps the casing each
//! name was inserted with. A container is constructed with a [`Validation`]
//! policy that decides whether the name and value grammars run on every
//! insertion.
//!
//! [`CombinedHeaders`] is the RFC 7230 §3.2.2 variant that folds repeated
//! fields into one comma-separated value.

use std::slice;
use std::time::SystemTime;

use crate::error::{Error, Result};

pub use self::combined::CombinedHeaders;
pub use self::name::HeaderName;
pub use self::value::{HeaderValue, IntoHeaderValue};

pub(crate) use self::name::{is_token_byte, is_valid_name};
pub(crate) use self::value::is_valid_value;

mod combined;
mod name;
mod value;

/// Names of the fields the codec itself inspects or writes.
pub mod names {
    /// `Accept-Encoding`
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    /// `Connection`
    pub const CONNECTION: &str = "Connection";
    /// `Content-Encoding`
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    /// `Content-Length`
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// `Date`
    pub const DATE: &str = "Date";
    /// `Expect`
    pub const EXPECT: &str = "Expect";
    /// `Trailer`
    pub const TRAILER: &str = "Trailer";
    /// `Transfer-Encoding`
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    /// `Upgrade`
    pub const UPGRADE: &str = "Upgrade";
}

/// Insertion-time validation policy for a [`Headers`] container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validation {
    /// Run the name and value grammars on every insertion.
    Strict,
    /// Accept anything. Used when a peer's traffic must be observed as-is.
    Permissive,
    /// `Strict`, and additionally reject the names forbidden in trailing
    /// headers: `Content-Length`, `Transfer-Encoding`, `Trailer`.
    Trailer,
}

const FORBIDDEN_TRAILER_NAMES: [&str; 3] =
    [names::CONTENT_LENGTH, names::TRANSFER_ENCODING, names::TRAILER];

/// An ordered, case-insensitive multimap of header fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValue)>,
    validation: Validation,
}

impl Headers {
    /// The immutable empty container, the default set of trailing headers.
    pub const EMPTY: Headers = Headers {
        entries: Vec::new(),
        validation: Validation::Trailer,
    };

    /// Creates an empty, strict-validating container.
    pub fn new() -> Headers {
        Headers::with_validation(Validation::Strict)
    }

    /// Creates an empty container with the given policy.
    pub fn with_validation(validation: Validation) -> Headers {
        Headers {
            entries: Vec::new(),
            validation,
        }
    }

    /// The policy this container was constructed with.
    pub fn validation(&self) -> Validation {
        self.validation
    }

    fn check(&self, name: &str, value: &HeaderValue) -> Result<()> {
        match self.validation {
            Validation::Permissive => return Ok(()),
            Validation::Strict => (),
            Validation::Trailer => {
                for forbidden in &FORBIDDEN_TRAILER_NAMES {
                    if name.eq_ignore_ascii_case(forbidden) {
                        return Err(Error::new_invalid_header());
                    }
                }
            }
        }
        if !is_valid_name(name) || !is_valid_value(value.as_bytes()) {
            return Err(Error::new_invalid_header());
        }
        Ok(())
    }

    /// Appends a field, keeping any existing fields with the same name.
    pub fn add<V: IntoHeaderValue>(&mut self, name: &str, value: V) -> Result<()> {
        let value = value.into_header_value();
        self.check(name, &value)?;
        let name = match self.validation {
            Validation::Permissive => HeaderName::from_unchecked(name),
            _ => HeaderName::parse(name)?,
        };
        self.entries.push((name, value));
        Ok(())
    }

    /// Replaces every field named `name` with the single given value.
    pub fn set<V: IntoHeaderValue>(&mut self, name: &str, value: V) -> Result<()> {
        let value = value.into_header_value();
        self.check(name, &value)?;
        self.remove(name);
        let name = match self.validation {
            Validation::Permissive => HeaderName::from_unchecked(name),
            _ => HeaderName::parse(name)?,
        };
        self.entries.push((name, value));
        Ok(())
    }

    /// Appends one field per value, all under the same name.
    pub fn add_all<V, I>(&mut self, name: &str, values: I) -> Result<()>
    where
        V: IntoHeaderValue,
        I: IntoIterator<Item = V>,
    {
        for value in values {
            self.add(name, value)?;
        }
        Ok(())
    }

    /// Replaces every field named `name` with one field per given value.
    pub fn set_all<V, I>(&mut self, name: &str, values: I) -> Result<()>
    where
        V: IntoHeaderValue,
        I: IntoIterator<Item = V>,
    {
        self.remove(name);
        self.add_all(name, values)
    }

    /// Sets a date field, rendered as IMF-fixdate at insertion time.
    pub fn set_date(&mut self, name: &str, when: SystemTime) -> Result<()> {
        self.set(name, when)
    }

    /// Removes every field named `name`. Returns whether any was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| *n != *name);
        before != self.entries.len()
    }

    /// Removes every field.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The first value of the field named `name`.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == *name)
            .map(|(_, v)| v)
    }

    /// Every value of the field named `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl DoubleEndedIterator<Item = &'a HeaderValue> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| *n == *name)
            .map(|(_, v)| v)
    }

    /// Whether any field is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether a field named `name` has exactly the value `value`.
    pub fn contains_value(&self, name: &str, value: &str, ignore_case: bool) -> bool {
        self.get_all(name).any(|v| {
            if ignore_case {
                v.eq_ignore_case(value)
            } else {
                *v == *value
            }
        })
    }

    /// Whether a field named `name` lists `token` in a comma-separated
    /// value, comparing after trimming optional whitespace.
    pub fn contains_token(&self, name: &str, token: &str, ignore_case: bool) -> bool {
        self.get_all(name)
            .filter_map(HeaderValue::to_str)
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .any(|t| {
                if ignore_case {
                    t.eq_ignore_ascii_case(token)
                } else {
                    t == token
                }
            })
    }

    /// The first value of `name` parsed as a non-negative decimal integer.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name)?.to_str()?.trim().parse().ok()
    }

    /// The first value of `name` parsed as an IMF-fixdate (or legacy
    /// RFC 850 / asctime) timestamp.
    pub fn get_date(&self, name: &str) -> Option<SystemTime> {
        httpdate::parse_http_date(self.get(name)?.to_str()?).ok()
    }

    /// The distinct field names, first-seen order, original casing.
    pub fn names(&self) -> Vec<&HeaderName> {
        let mut seen: Vec<&HeaderName> = Vec::new();
        for (name, _) in &self.entries {
            if !seen.iter().any(|n| **n == *name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Iterates every entry in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    /// Number of entries (not distinct names).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn last_value_mut(&mut self) -> Option<&mut HeaderValue> {
        self.entries.last_mut().map(|(_, v)| v)
    }

    pub(crate) fn get_value_mut(&mut self, name: &str) -> Option<&mut HeaderValue> {
        self.entries
            .iter_mut()
            .find(|(n, _)| *n == *name)
            .map(|(_, v)| v)
    }
}

impl Default for Headers {
    fn default() -> Headers {
        Headers::new()
    }
}

/// Iterator over `(&HeaderName, &HeaderValue)` entries.
#[derive(Debug)]
pub struct Iter<'a> {
    inner: slice::Iter<'a, (HeaderName, HeaderValue)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a HeaderName, &'a HeaderValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(n, v)| (n, v))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a HeaderName, &'a HeaderValue);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
