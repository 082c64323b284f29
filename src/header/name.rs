use std::borrow::Cow;
use std::fmt;

use crate::error::Error;

/// A validated header field name.
///
/// Names keep the casing they were created with; comparison and lookup are
/// case-insensitive per RFC 7230.
#[derive(Clone, Debug)]
pub struct HeaderName {
    inner: Cow<'static, str>,
}

/// Whether `b` may appear in a header name (or any HTTP token).
///
/// Printable ASCII minus the separators `=`, `,`, `;` and `:`. Everything at
/// or below SP (including CR, LF, HT, VT, FF, NUL) and everything past `~`
/// (DEL, non-ASCII) is out.
pub(crate) fn is_token_byte(b: u8) -> bool {
    b > 0x20 && b < 0x7f && !matches!(b, b'=' | b',' | b';' | b':')
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_byte)
}

impl HeaderName {
    /// Wraps a static string, panicking if it is not a valid token.
    ///
    /// Intended for named constants; use [`HeaderName::parse`] for input.
    pub fn from_static(name: &'static str) -> HeaderName {
        assert!(is_valid_name(name), "invalid header name: {:?}", name);
        HeaderName {
            inner: Cow::Borrowed(name),
        }
    }

    /// Validates and owns `name`.
    pub fn parse(name: &str) -> Result<HeaderName, Error> {
        if !is_valid_name(name) {
            return Err(Error::new_invalid_header());
        }
        Ok(HeaderName {
            inner: Cow::Owned(name.to_owned()),
        })
    }

    /// Wraps `name` without running the grammar, for permissive containers.
    pub(crate) fn from_unchecked(name: &str) -> HeaderName {
        HeaderName {
            inner: Cow::Owned(name.to_owned()),
        }
    }

    /// The name with its original casing.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &HeaderName) -> bool {
        self.inner.eq_ignore_ascii_case(&other.inner)
    }
}

impl Eq for HeaderName {}

impl PartialEq<str> for HeaderName {
    fn eq(&self, other: &str) -> bool {
        self.inner.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for HeaderName {
    fn eq(&self, other: &&str) -> bool {
        self.inner.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for HeaderName {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}
